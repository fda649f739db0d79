//! Scaled forward–backward computation over one sentence.

use crate::common::{FIRST_REAL_TAG, NONE};
use crate::model::attributes::{matches_gold, AttributeIndex, Context};

/// Reusable buffers for the forward–backward recurrences, sized once for the
/// longest training sentence and reset per sentence.
///
/// The engine never fails; callers may inspect `log_z` for non-finite values.
pub(crate) struct FwdBwd {
    ntags: usize,
    psis: Vec<Vec<Vec<f64>>>,
    alphas: Vec<Vec<f64>>,
    betas: Vec<Vec<f64>>,
    state_marginals: Vec<Vec<f64>>,
    trans_marginals: Vec<Vec<f64>>,
    scale: Vec<f64>,
    /// Accumulated log partition function; callers zero it when starting a
    /// new accumulation.
    pub(crate) log_z: f64,
}

impl FwdBwd {
    pub(crate) fn new(ntags: usize, max_size: usize) -> Self {
        Self {
            ntags,
            psis: (0..max_size)
                .map(|_| vec![vec![0.0; ntags]; ntags])
                .collect(),
            alphas: vec![vec![0.0; ntags]; max_size],
            betas: vec![vec![0.0; ntags]; max_size],
            state_marginals: vec![vec![0.0; ntags]; max_size],
            trans_marginals: vec![vec![0.0; ntags]; ntags],
            scale: vec![1.0; max_size],
            log_z: 0.0,
        }
    }

    /// Zeroes the first `size` rows of every per-position buffer and the
    /// whole transition-marginal table; rows past `size` are left as they
    /// are.
    pub(crate) fn reset(&mut self, size: usize) {
        for s in self.scale[..size].iter_mut() {
            *s = 1.0;
        }
        for row in &mut self.trans_marginals {
            row.iter_mut().for_each(|v| *v = 0.0);
        }
        for i in 0..size {
            self.alphas[i].iter_mut().for_each(|v| *v = 0.0);
            self.betas[i].iter_mut().for_each(|v| *v = 0.0);
            self.state_marginals[i].iter_mut().for_each(|v| *v = 0.0);
            for row in &mut self.psis[i] {
                row.iter_mut().for_each(|v| *v = 0.0);
            }
        }
    }

    /// Fills `psis[i]` for every position of the sentence: the summed
    /// weights of the active features, exponentiated. A state feature is
    /// broadcast to every previous label, the boundary label included, so
    /// the first position picks it up through its sentinel row.
    pub(crate) fn compute_psis(
        &mut self,
        contexts: &[Context],
        attributes: &AttributeIndex,
        weights: &[f64],
        decay: f64,
    ) {
        for (i, context) in contexts.iter().enumerate() {
            let psi = &mut self.psis[i];
            for &fref in context.features() {
                let feature = attributes.feature(fref);
                let lambda = weights[feature.slot as usize];
                let pair = feature.pair;
                psi[usize::from(pair.prev)][usize::from(pair.curr)] += lambda;
                if pair.prev == NONE {
                    for prev in 1..self.ntags {
                        psi[prev][usize::from(pair.curr)] += lambda;
                    }
                }
            }
            for row in psi.iter_mut() {
                for v in row.iter_mut() {
                    *v = (*v * decay).exp();
                }
            }
        }
    }

    /// Scaled forward recurrence; adds the sentence's log partition function
    /// to `log_z`.
    pub(crate) fn forward(&mut self, len: usize) {
        let first = usize::from(FIRST_REAL_TAG);
        let sentinel = 1;

        let mut sum = 0.0;
        for curr in first..self.ntags {
            let val = self.psis[0][sentinel][curr];
            self.alphas[0][curr] = val;
            sum += val;
        }
        // A zero column sum can only come from underflow; substituting 1.0
        // skips scaling at this position instead of dividing by zero.
        if sum == 0.0 {
            sum = 1.0;
        }
        self.scale[0] = 1.0 / sum;
        scale_row(&mut self.alphas[0], self.scale[0]);

        for i in 1..len {
            let mut sum = 0.0;
            for curr in first..self.ntags {
                let mut acc = 0.0;
                for prev in first..self.ntags {
                    acc += self.alphas[i - 1][prev] * self.psis[i][prev][curr];
                }
                self.alphas[i][curr] = acc;
                sum += acc;
            }
            if sum == 0.0 {
                sum = 1.0;
            }
            self.scale[i] = 1.0 / sum;
            scale_row(&mut self.alphas[i], self.scale[i]);
        }

        let mut sum_log_scale = 0.0;
        for &s in &self.scale[..len] {
            sum_log_scale += s.ln();
        }
        self.log_z += -sum_log_scale;
    }

    /// Unscaled forward pass into scratch storage, returning the log
    /// partition function directly. Kept as a cross-check of the scaled
    /// recurrence.
    pub(crate) fn forward_noscale(&self, len: usize) -> f64 {
        let first = usize::from(FIRST_REAL_TAG);
        let sentinel = 1;
        let mut alphas = vec![vec![0.0; self.ntags]; len];

        for curr in first..self.ntags {
            alphas[0][curr] = self.psis[0][sentinel][curr];
        }
        for i in 1..len {
            for curr in first..self.ntags {
                for prev in first..self.ntags {
                    alphas[i][curr] += alphas[i - 1][prev] * self.psis[i][prev][curr];
                }
            }
        }
        alphas[len - 1][first..].iter().sum::<f64>().ln()
    }

    /// Scaled backward recurrence; must follow [`FwdBwd::forward`], whose
    /// scale factors it reuses.
    pub(crate) fn backward(&mut self, len: usize) {
        let first = usize::from(FIRST_REAL_TAG);

        for curr in first..self.ntags {
            self.betas[len - 1][curr] = 1.0;
        }
        scale_row(&mut self.betas[len - 1], self.scale[len - 1]);

        for i in (0..len - 1).rev() {
            for curr in first..self.ntags {
                let mut acc = 0.0;
                for next in first..self.ntags {
                    acc += self.betas[i + 1][next] * self.psis[i + 1][curr][next];
                }
                self.betas[i][curr] = acc;
            }
            scale_row(&mut self.betas[i], self.scale[i]);
        }
    }

    /// Adds this sentence's contribution to every active feature's
    /// expectation accumulator.
    pub(crate) fn compute_expectations(&self, contexts: &[Context], attributes: &mut AttributeIndex) {
        for (i, context) in contexts.iter().enumerate() {
            let inv_scale = 1.0 / self.scale[i];
            for &fref in context.features() {
                let pair = attributes.feature(fref).pair;
                let delta = if pair.prev == NONE {
                    let alpha = self.alphas[i][usize::from(pair.curr)];
                    let beta = self.betas[i][usize::from(pair.curr)];
                    alpha * beta * inv_scale
                } else {
                    let alpha = if i > 0 {
                        self.alphas[i - 1][usize::from(pair.prev)]
                    } else {
                        1.0
                    };
                    let psi = self.psis[i][usize::from(pair.prev)][usize::from(pair.curr)];
                    alpha * psi * self.betas[i][usize::from(pair.curr)]
                };
                attributes.feature_mut(fref).expectation += delta;
            }
        }
    }

    /// Accumulates the per-position state marginals and the shared
    /// transition marginals used by the stochastic updates.
    pub(crate) fn compute_marginals(&mut self, len: usize) {
        let first = usize::from(FIRST_REAL_TAG);
        for i in 0..len {
            let inv_scale = 1.0 / self.scale[i];
            for curr in first..self.ntags {
                self.state_marginals[i][curr] +=
                    self.alphas[i][curr] * self.betas[i][curr] * inv_scale;
            }
            if i > 0 {
                for prev in first..self.ntags {
                    for curr in first..self.ntags {
                        self.trans_marginals[prev][curr] += self.alphas[i - 1][prev]
                            * self.psis[i][prev][curr]
                            * self.betas[i][curr];
                    }
                }
            }
        }
    }

    #[inline(always)]
    pub(crate) fn state_marginal(&self, i: usize, curr: usize) -> f64 {
        self.state_marginals[i][curr]
    }

    #[inline(always)]
    pub(crate) fn trans_marginal(&self, prev: usize, curr: usize) -> f64 {
        self.trans_marginals[prev][curr]
    }
}

#[inline(always)]
fn scale_row(row: &mut [f64], scale: f64) {
    for v in row.iter_mut() {
        *v *= scale;
    }
}

/// Sum of the decayed weights of the features firing on the gold path of the
/// sentence.
pub(crate) fn gold_score(
    contexts: &[Context],
    attributes: &AttributeIndex,
    weights: &[f64],
    decay: f64,
) -> f64 {
    let mut score = 0.0;
    for context in contexts {
        for &fref in context.features() {
            let feature = attributes.feature(fref);
            if matches_gold(feature, context.pair) {
                score += weights[feature.slot as usize] * decay;
            }
        }
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{TagPair, SENTINEL};
    use crate::features::{TYPE_TRANS, TYPE_W};

    /// Builds an index and instance for a sentence of `words` labeled with
    /// `tags` (label ids), wiring the word and label-bigram predicates.
    fn build(words: &[&str], tags: &[u16], ntags: u16) -> (AttributeIndex, Vec<Context>) {
        let mut index = AttributeIndex::new();
        // Observe every (word, label) combination so each position fires at
        // least one state feature for each label.
        for &word in words {
            for curr in FIRST_REAL_TAG..ntags {
                index.observe(TYPE_W, word, TagPair::new(SENTINEL, curr), true, false);
            }
        }
        for prev in FIRST_REAL_TAG..ntags {
            for curr in FIRST_REAL_TAG..ntags {
                index.observe(TYPE_TRANS, "", TagPair::new(prev, curr), false, true);
            }
        }
        for curr in FIRST_REAL_TAG..ntags {
            index.observe(TYPE_TRANS, "", TagPair::new(SENTINEL, curr), false, true);
        }
        index.freeze();
        index.compact();
        index.assign_weights();

        let contexts = words
            .iter()
            .enumerate()
            .map(|(j, word)| {
                let prev = if j == 0 { SENTINEL } else { tags[j - 1] };
                let mut context = Context::new(TagPair::new(prev, tags[j]));
                index.fill_context(TYPE_W, word, &mut context);
                index.fill_context(TYPE_TRANS, "", &mut context);
                context
            })
            .collect();
        (index, contexts)
    }

    /// Deterministic weights in [-1, 1].
    fn pseudo_weights(n: usize) -> Vec<f64> {
        let mut state = 0x2545_f491u64;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) - 1.0
            })
            .collect()
    }

    #[test]
    fn test_scaled_log_z_matches_noscale() {
        let words = ["a", "b", "c"];
        let tags = [2u16, 3, 2];
        let (index, contexts) = build(&words, &tags, 4);
        let weights = pseudo_weights(index.num_features() as usize);

        let mut fb = FwdBwd::new(4, words.len());
        fb.reset(words.len());
        fb.compute_psis(&contexts, &index, &weights, 1.0);
        fb.log_z = 0.0;
        fb.forward(words.len());

        let noscale = fb.forward_noscale(words.len());
        assert!(
            (fb.log_z - noscale).abs() <= 1e-6 * noscale.abs().max(1.0),
            "scaled {} vs noscale {}",
            fb.log_z,
            noscale,
        );
    }

    #[test]
    fn test_marginal_sums() {
        let words = ["a", "b", "c", "d"];
        let tags = [2u16, 3, 3, 2];
        let (index, contexts) = build(&words, &tags, 4);
        let weights = pseudo_weights(index.num_features() as usize);

        let mut fb = FwdBwd::new(4, words.len());
        fb.reset(words.len());
        fb.compute_psis(&contexts, &index, &weights, 1.0);
        fb.log_z = 0.0;
        fb.forward(words.len());
        fb.backward(words.len());
        fb.compute_marginals(words.len());

        for i in 0..words.len() {
            let sum: f64 = (2..4).map(|c| fb.state_marginal(i, c)).sum();
            assert!((sum - 1.0).abs() <= 1e-6, "position {i}: {sum}");
        }
        let total: f64 = (2..4)
            .flat_map(|p| (2..4).map(move |c| (p, c)))
            .map(|(p, c)| fb.trans_marginal(p, c))
            .sum();
        assert!(
            (total - (words.len() - 1) as f64).abs() <= 1e-6,
            "transition marginal total {total}",
        );
    }

    #[test]
    fn test_uniform_weights_give_uniform_marginals() {
        let words = ["a", "b"];
        let tags = [2u16, 2];
        let (index, contexts) = build(&words, &tags, 4);
        let weights = vec![0.0; index.num_features() as usize];

        let mut fb = FwdBwd::new(4, words.len());
        fb.reset(words.len());
        fb.compute_psis(&contexts, &index, &weights, 1.0);
        fb.log_z = 0.0;
        fb.forward(words.len());
        fb.backward(words.len());
        fb.compute_marginals(words.len());

        // Two real labels, all-zero weights: every marginal is 1/2 and
        // log Z = n * log 2.
        for i in 0..words.len() {
            for c in 2..4 {
                assert!((fb.state_marginal(i, c) - 0.5).abs() <= 1e-9);
            }
        }
        let expected = (words.len() as f64) * 2.0f64.ln();
        assert!((fb.log_z - expected).abs() <= 1e-9);
    }
}
