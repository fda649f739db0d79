//! Module for training models.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::fs::File;
//! use std::io::BufReader;
//!
//! use legato::io::conll::ConllReader;
//! use legato::trainer::{Trainer, TrainerConfig};
//! use legato::Task;
//!
//! let config = TrainerConfig::new(Task::Pos).sigma(1.0).niterations(100);
//! let trainer = Trainer::new(config)?;
//!
//! let file = BufReader::new(File::open("corpus.conll")?);
//! let mut reader = ConllReader::new("corpus.conll", file);
//!
//! let model = trainer.train(&mut reader)?;
//! model.save("model", "# train")?;
//! # Ok(())
//! # }
//! ```

mod config;
pub(crate) mod forward_backward;
mod lbfgs;
mod sgd;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub use crate::trainer::config::{Algorithm, TrainerConfig};

use crate::errors::{LegatoError, Result};
use crate::features::{FeatureRegistry, TYPE_W};
use crate::io::Reader;
use crate::model::attributes::{AttributeIndex, Context};
use crate::model::info::ModelInfo;
use crate::model::lexicon::Lexicon;
use crate::model::tagset::TagSet;
use crate::model::Model;
use crate::sentence::Sentence;
use crate::trainer::forward_backward::{gold_score, FwdBwd};
use crate::trainer::lbfgs::LbfgsConfig;

/// Trainer of linear-chain CRF taggers.
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    /// Creates a new [`Trainer`] using the specified configuration.
    ///
    /// # Errors
    ///
    /// [`LegatoError::Config`] is returned when the label-bigram generator
    /// is disabled: a linear chain cannot be trained without it.
    pub fn new(config: TrainerConfig) -> Result<Self> {
        if !config.features.use_trans {
            return Err(LegatoError::config(
                "use_trans",
                None,
                "the label-bigram generator is required for training",
            ));
        }
        Ok(Self { config })
    }

    /// Trains a model from the sentences of `reader`, which is rewound for
    /// each of the three extraction passes.
    ///
    /// # Errors
    ///
    /// [`LegatoError`] is returned when the corpus is empty, a sentence's
    /// label column does not match its length, or reading fails.
    pub fn train<R>(self, reader: &mut R) -> Result<Model>
    where
        R: Reader,
    {
        let task = self.config.task;
        let mut lexicon = Lexicon::new();
        let mut tags = TagSet::new();
        let mut sent = Sentence::new();
        let mut max_size = 0;
        let mut nsents = 0usize;

        info!("beginning pass 1");
        while reader.next(&mut sent)? {
            let labels = task.labels(&sent);
            if labels.len() != sent.len() {
                return Err(LegatoError::invalid_value(
                    "label column length does not match the number of words",
                ));
            }
            for i in 0..sent.len() {
                lexicon.add(&sent.words[i]);
                tags.add(&labels[i]);
            }
            max_size = max_size.max(sent.len());
            nsents += 1;
        }
        if nsents == 0 {
            return Err(LegatoError::invalid_value("training corpus is empty"));
        }
        lexicon.sort_by_freq();
        tags.sort_by_freq();
        let ntags = tags.len();

        let registry = FeatureRegistry::new(task, &self.config.features);
        let mut attributes = AttributeIndex::new();

        info!("beginning pass 2");
        reader.reset()?;
        while reader.next(&mut sent)? {
            registry.extract(&mut attributes, &tags, &sent, task.labels(&sent));
        }
        attributes.freeze();
        attributes.apply_feature_cutoff(
            TYPE_W,
            self.config.cutoff_words,
            self.config.cutoff_default,
        );
        if self.config.cutoff_attribs > 1 {
            attributes.apply_attribute_cutoff(self.config.cutoff_attribs);
        }
        attributes.compact();

        info!("beginning pass 3");
        reader.reset()?;
        let mut instances = Vec::with_capacity(nsents);
        while reader.next(&mut sent)? {
            instances.push(registry.build_instance(&attributes, &tags, &sent, task.labels(&sent)));
        }

        let num_features = attributes.assign_weights();
        let mut weights = vec![0.0; num_features];
        let mut fb = FwdBwd::new(ntags, max_size);
        let inv_sigma_sq = 1.0 / (self.config.sigma * self.config.sigma);
        info!(
            "extracted {} attributes and {} features over {} labels",
            attributes.num_attributes(),
            num_features,
            ntags - 2,
        );

        match self.config.algorithm {
            Algorithm::Lbfgs => {
                let lbfgs_config = LbfgsConfig {
                    max_iterations: self.config.niterations,
                    ..LbfgsConfig::default()
                };
                lbfgs::optimize(
                    &mut weights,
                    |w, g| evaluate(&instances, &mut attributes, &mut fb, w, g, inv_sigma_sq),
                    &lbfgs_config,
                );
            }
            Algorithm::Sgd => {
                let lambda =
                    1.0 / (instances.len() as f64 * self.config.sigma * self.config.sigma);
                let mut order: Vec<usize> = (0..instances.len()).collect();
                let mut rng = StdRng::seed_from_u64(self.config.seed);
                let t0 = sgd::calibrate(
                    &instances,
                    &mut order,
                    &attributes,
                    &mut fb,
                    &mut weights,
                    lambda,
                    inv_sigma_sq,
                    self.config.eta,
                    &mut rng,
                );
                sgd::sgd_iterate(
                    &instances,
                    &mut order,
                    &attributes,
                    &mut fb,
                    &mut weights,
                    instances.len(),
                    t0,
                    lambda,
                    inv_sigma_sq,
                    self.config.niterations,
                    self.config.period,
                    self.config.delta,
                    false,
                    &mut rng,
                );
            }
        }

        let info = ModelInfo {
            nattributes: attributes.num_attributes(),
            nfeatures: num_features as u64,
            max_size: max_size as u64,
        };
        Ok(Model {
            lexicon,
            tags,
            attributes,
            info,
            weights,
        })
    }
}

/// One batch evaluation: zeroes the expectations, sweeps every sentence
/// through the forward–backward engine, fills the gradient, and returns the
/// regularized negative log-likelihood.
pub(crate) fn evaluate(
    instances: &[Vec<Context>],
    attributes: &mut AttributeIndex,
    fb: &mut FwdBwd,
    weights: &[f64],
    grad: &mut [f64],
    inv_sigma_sq: f64,
) -> f64 {
    attributes.reset_expectations();
    fb.log_z = 0.0;
    for contexts in instances {
        fb.reset(contexts.len());
        fb.compute_psis(contexts, attributes, weights, 1.0);
        fb.forward(contexts.len());
        fb.backward(contexts.len());
        fb.compute_expectations(contexts, attributes);
    }
    attributes.accumulate_gradient(grad, weights, inv_sigma_sq);

    let mut llhood = 0.0;
    for contexts in instances {
        llhood += gold_score(contexts, attributes, weights, 1.0);
    }
    -llhood + fb.log_z + attributes.sum_lambda_sq(weights) * inv_sigma_sq * 0.5
}
