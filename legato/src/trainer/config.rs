//! Configuration for a trainer.

use crate::errors::{LegatoError, Result};
use crate::features::FeatureConfig;
use crate::sentence::Task;

/// The optimization algorithm driving training.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Algorithm {
    /// Batch L-BFGS over the full corpus.
    Lbfgs,
    /// Online stochastic gradient descent with learning-rate calibration.
    Sgd,
}

impl std::str::FromStr for Algorithm {
    type Err = LegatoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lbfgs" => Ok(Self::Lbfgs),
            "sgd" => Ok(Self::Sgd),
            _ => Err(LegatoError::config(
                "trainer",
                Some(s.to_string()),
                "expected one of lbfgs, sgd",
            )),
        }
    }
}

/// Configuration for a trainer.
pub struct TrainerConfig {
    pub(crate) task: Task,
    pub(crate) features: FeatureConfig,
    pub(crate) algorithm: Algorithm,
    pub(crate) sigma: f64,
    pub(crate) niterations: u64,
    pub(crate) period: usize,
    pub(crate) eta: f64,
    pub(crate) delta: f64,
    pub(crate) cutoff_words: u64,
    pub(crate) cutoff_attribs: u64,
    pub(crate) cutoff_default: u64,
    pub(crate) seed: u64,
}

impl TrainerConfig {
    /// Creates a configuration with the default settings for `task`.
    pub fn new(task: Task) -> Self {
        Self {
            task,
            features: FeatureConfig::default(),
            algorithm: Algorithm::Lbfgs,
            sigma: 0.707,
            niterations: 500,
            period: 10,
            eta: 0.1,
            delta: 1e-5,
            cutoff_words: 1,
            cutoff_attribs: 1,
            cutoff_default: 1,
            seed: 42,
        }
    }

    /// Changes the set of active feature generators.
    pub fn features(mut self, features: FeatureConfig) -> Self {
        self.features = features;
        self
    }

    /// Changes the optimization algorithm. Defaults to L-BFGS.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Changes the regularization parameter sigma.
    ///
    /// Defaults to 0.707.
    ///
    /// # Panics
    ///
    /// The value must be positive.
    pub fn sigma(mut self, sigma: f64) -> Self {
        assert!(sigma > 0.0);
        self.sigma = sigma;
        self
    }

    /// Changes the maximum number of iterations: L-BFGS iterations or SGD
    /// epochs.
    ///
    /// Defaults to 500.
    ///
    /// # Panics
    ///
    /// The value must be positive.
    pub fn niterations(mut self, n: u64) -> Self {
        assert!(n >= 1);
        self.niterations = n;
        self
    }

    /// Changes the number of epochs the SGD convergence test looks back
    /// over.
    ///
    /// Defaults to 10.
    ///
    /// # Panics
    ///
    /// The value must be positive.
    pub fn period(mut self, period: usize) -> Self {
        assert!(period >= 1);
        self.period = period;
        self
    }

    /// Changes the learning rate the SGD calibration starts from.
    ///
    /// Defaults to 0.1.
    ///
    /// # Panics
    ///
    /// The value must be positive.
    pub fn eta(mut self, eta: f64) -> Self {
        assert!(eta > 0.0);
        self.eta = eta;
        self
    }

    /// Changes the relative-improvement convergence tolerance.
    ///
    /// Defaults to 1e-5.
    pub fn delta(mut self, delta: f64) -> Self {
        self.delta = delta;
        self
    }

    /// Changes the frequency cutoff applied to word features; features seen
    /// fewer times are pruned.
    ///
    /// Defaults to 1, which prunes nothing.
    pub fn cutoff_words(mut self, freq: u64) -> Self {
        self.cutoff_words = freq;
        self
    }

    /// Changes the aggregate frequency cutoff applied to whole attributes.
    ///
    /// Defaults to 1, which prunes nothing.
    pub fn cutoff_attribs(mut self, freq: u64) -> Self {
        self.cutoff_attribs = freq;
        self
    }

    /// Changes the frequency cutoff applied to features of every non-word
    /// type.
    ///
    /// Defaults to 1, which prunes nothing.
    pub fn cutoff_default(mut self, freq: u64) -> Self {
        self.cutoff_default = freq;
        self
    }

    /// Changes the seed of the shuffling used by SGD.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}
