//! Stochastic gradient descent with exponential weight decay.
//!
//! L2 shrinkage of the whole weight vector is deferred into a single scalar
//! `d`: the effective weight is `d * w[k]`, updates are scaled by `1/d`, and
//! one multiply at the end of each epoch folds the decay back in.

use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::common::NONE;
use crate::model::attributes::{AttributeIndex, Context};
use crate::trainer::forward_backward::{gold_score, FwdBwd};

const CALIBRATION_SAMPLES: usize = 1000;
const CALIBRATION_TRIALS: usize = 20;
const CALIBRATION_CANDIDATES: i32 = 10;
const CALIBRATION_RATE: f64 = 2.0;

/// The loss of one instance under the current decayed weights, without
/// updating anything.
pub(crate) fn score(
    contexts: &[Context],
    attributes: &AttributeIndex,
    fb: &mut FwdBwd,
    weights: &[f64],
    decay: f64,
) -> f64 {
    fb.log_z = 0.0;
    fb.reset(contexts.len());
    fb.compute_psis(contexts, attributes, weights, decay);
    fb.forward(contexts.len());
    -(gold_score(contexts, attributes, weights, decay) - fb.log_z)
}

/// Processes one instance: computes its loss, the state and transition
/// marginals, and applies the stochastic update with the given gain.
fn score_instance(
    contexts: &[Context],
    attributes: &AttributeIndex,
    fb: &mut FwdBwd,
    weights: &mut [f64],
    decay: f64,
    gain: f64,
) -> f64 {
    fb.log_z = 0.0;
    fb.reset(contexts.len());
    let score = gold_score(contexts, attributes, weights, decay);
    fb.compute_psis(contexts, attributes, weights, decay);
    fb.forward(contexts.len());
    fb.backward(contexts.len());
    fb.compute_marginals(contexts.len());
    update_weights(contexts, attributes, fb, weights, gain);
    -score + fb.log_z
}

/// The per-instance update. State features move toward the gold labels and
/// away from the state marginals; transition features get their positive
/// update here and their marginal decrement through the cached label-bigram
/// entry.
fn update_weights(
    contexts: &[Context],
    attributes: &AttributeIndex,
    fb: &FwdBwd,
    weights: &mut [f64],
    gain: f64,
) {
    for (i, context) in contexts.iter().enumerate() {
        for &fref in context.features() {
            let feature = attributes.feature(fref);
            let slot = feature.slot as usize;
            if feature.pair.prev == NONE {
                if feature.pair.curr == context.pair.curr {
                    weights[slot] += gain;
                }
                weights[slot] -= fb.state_marginal(i, usize::from(feature.pair.curr)) * gain;
            } else if feature.pair == context.pair {
                weights[slot] += gain;
            }
        }
    }

    for feature in attributes.trans_features() {
        if feature.freq > 0 {
            let pair = feature.pair;
            weights[feature.slot as usize] -=
                fb.trans_marginal(usize::from(pair.prev), usize::from(pair.curr)) * gain;
        }
    }
}

/// Runs SGD epochs over the first `nsamples` instances of `order`.
///
/// In calibration mode a single pass is made without shuffling and without
/// tracking best weights. Otherwise the order is reshuffled per epoch, the
/// best epoch's weights are kept and restored at the end, and the loop stops
/// early once the relative improvement over the last `period` epochs falls
/// below `delta`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn sgd_iterate(
    instances: &[Vec<Context>],
    order: &mut [usize],
    attributes: &AttributeIndex,
    fb: &mut FwdBwd,
    weights: &mut [f64],
    nsamples: usize,
    t0: f64,
    lambda: f64,
    inv_sigma_sq: f64,
    nepochs: u64,
    period: usize,
    delta: f64,
    calibration: bool,
    rng: &mut StdRng,
) -> f64 {
    let mut decay = 1.0;
    let mut t = 0u64;
    let mut loss = 0.0;
    let mut best_loss = f64::MAX;
    let mut best_weights = vec![];
    let mut previous = vec![0.0; period.max(1)];

    weights.iter_mut().for_each(|w| *w = 0.0);

    for epoch in 1..=nepochs {
        if !calibration {
            info!("Epoch {epoch}");
            order.shuffle(rng);
        }

        loss = 0.0;
        let mut eta = 0.0;
        for &idx in order[..nsamples].iter() {
            eta = 1.0 / (lambda * (t0 + t as f64));
            decay *= 1.0 - eta * lambda;
            let gain = eta / decay;
            loss += score_instance(&instances[idx], attributes, fb, weights, decay, gain);
            t += 1;
        }

        if !loss.is_finite() {
            warn!("non-finite loss in epoch {epoch}");
        }

        for w in weights.iter_mut() {
            *w *= decay;
        }
        decay = 1.0;
        let norm = attributes.sum_lambda_sq(weights) * inv_sigma_sq * 0.5;
        loss += norm;

        if !calibration {
            if loss.is_finite() && loss < best_loss {
                best_loss = loss;
                best_weights = weights.to_vec();
            }

            let improvement = if period < epoch as usize {
                (previous[(epoch as usize - 1) % period] - loss) / loss
            } else {
                delta
            };
            previous[(epoch as usize - 1) % period] = loss;

            info!("  Loss: {loss}");
            if period < epoch as usize {
                info!("  Improvement ratio: {improvement}");
            }
            info!("  Feature L2 norm: {}", norm.sqrt());
            info!("  Learning rate (eta): {eta}");
            info!("  Total feature updates: {t}");

            if improvement < delta {
                break;
            }
        }
    }

    if !calibration && !best_weights.is_empty() {
        weights.copy_from_slice(&best_weights);
        return best_loss;
    }
    loss
}

/// Probes learning rates with one-epoch runs over a subsample, doubling
/// while the loss keeps improving on the initial loss and halving from the
/// starting rate afterwards. Returns `t0 = 1/(lambda * eta*)` for the best
/// rate found.
pub(crate) fn calibrate(
    instances: &[Vec<Context>],
    order: &mut [usize],
    attributes: &AttributeIndex,
    fb: &mut FwdBwd,
    weights: &mut [f64],
    lambda: f64,
    inv_sigma_sq: f64,
    initial_eta: f64,
    rng: &mut StdRng,
) -> f64 {
    let nsamples = CALIBRATION_SAMPLES.min(instances.len());
    let mut ntrials = 1;
    let mut ncandidates = CALIBRATION_CANDIDATES;
    let mut best_eta = initial_eta;
    let mut eta = initial_eta;
    let mut best_loss = f64::MAX;
    let mut dec = false;

    order.shuffle(rng);
    weights.iter_mut().for_each(|w| *w = 0.0);

    let mut initial_loss = 0.0;
    for &idx in order[..nsamples].iter() {
        initial_loss += score(&instances[idx], attributes, fb, weights, 1.0);
    }
    initial_loss += attributes.sum_lambda_sq(weights) * inv_sigma_sq * 0.5;
    info!("Initial loss: {initial_loss}");

    while ncandidates > 0 || !dec {
        info!("Trial {ntrials}, eta = {eta}");
        let loss = sgd_iterate(
            instances,
            order,
            attributes,
            fb,
            weights,
            nsamples,
            1.0 / (lambda * eta),
            lambda,
            inv_sigma_sq,
            1,
            1,
            0.0,
            true,
            rng,
        );

        let check = loss.is_finite() && loss < initial_loss;
        if check {
            ncandidates -= 1;
            info!("Loss: {loss}");
        } else {
            info!("Loss: {loss} (worse)");
        }

        if loss.is_finite() && loss < best_loss {
            best_loss = loss;
            best_eta = eta;
        }

        if dec {
            eta /= CALIBRATION_RATE;
        } else if check && ncandidates >= 0 {
            eta *= CALIBRATION_RATE;
        } else {
            dec = true;
            ncandidates = CALIBRATION_CANDIDATES;
            eta = initial_eta / CALIBRATION_RATE;
        }

        ntrials += 1;
        if ntrials >= CALIBRATION_TRIALS {
            break;
        }
    }

    info!("Best learning rate: {best_eta}");
    1.0 / (lambda * best_eta)
}
