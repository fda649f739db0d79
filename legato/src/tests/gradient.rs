//! Finite-difference check of the analytic gradient.

use crate::common::FIRST_REAL_TAG;
use crate::features::{FeatureConfig, FeatureRegistry};
use crate::model::attributes::{AttributeIndex, Context};
use crate::model::tagset::TagSet;
use crate::sentence::{Sentence, Task};
use crate::trainer::evaluate;
use crate::trainer::forward_backward::FwdBwd;

fn sentence(words: &[&str], labels: &[&str]) -> Sentence {
    let mut sent = Sentence::new();
    sent.words = words.iter().map(|w| w.to_string()).collect();
    sent.pos = labels.iter().map(|l| l.to_string()).collect();
    sent
}

/// Runs the three extraction passes by hand over a fixed pair of sentences.
fn extract() -> (TagSet, AttributeIndex, Vec<Vec<Context>>, usize) {
    let corpus = [
        sentence(&["dogs", "bark", "loudly"], &["N", "V", "R"]),
        sentence(&["cats", "run"], &["N", "V"]),
    ];

    let mut tags = TagSet::new();
    for sent in &corpus {
        for label in &sent.pos {
            tags.add(label);
        }
    }
    tags.sort_by_freq();

    let config = FeatureConfig {
        use_next_words: false,
        use_word_bigrams: false,
        ..FeatureConfig::default()
    };
    let registry = FeatureRegistry::new(Task::Pos, &config);

    let mut attributes = AttributeIndex::new();
    for sent in &corpus {
        registry.extract(&mut attributes, &tags, sent, &sent.pos);
    }
    attributes.freeze();
    attributes.compact();

    let instances = corpus
        .iter()
        .map(|sent| registry.build_instance(&attributes, &tags, sent, &sent.pos))
        .collect();
    let max_size = corpus.iter().map(|s| s.len()).max().unwrap();
    (tags, attributes, instances, max_size)
}

#[test]
fn test_finite_differences_match_gradient() {
    let (tags, mut attributes, instances, max_size) = extract();
    let n = attributes.assign_weights();
    let ntags = tags.len();
    assert!(usize::from(FIRST_REAL_TAG) < ntags);

    let mut fb = FwdBwd::new(ntags, max_size);
    let inv_sigma_sq = 1.0 / (0.707f64 * 0.707);

    // Deterministic non-zero starting point.
    let mut weights: Vec<f64> = (0..n).map(|i| ((i * 7 + 3) % 11) as f64 / 11.0 - 0.5).collect();
    let mut grad = vec![0.0; n];
    let base = evaluate(
        &instances,
        &mut attributes,
        &mut fb,
        &weights,
        &mut grad,
        inv_sigma_sq,
    );
    assert!(base.is_finite());

    let h = 1e-4;
    let mut scratch = vec![0.0; n];
    for k in 0..n {
        let saved = weights[k];
        weights[k] = saved + h;
        let plus = evaluate(
            &instances,
            &mut attributes,
            &mut fb,
            &weights,
            &mut scratch,
            inv_sigma_sq,
        );
        weights[k] = saved;

        let estimate = (plus - base) / h;
        assert!(
            (estimate - grad[k]).abs() < 1e-2,
            "weight {k}: estimated {estimate}, analytic {}",
            grad[k],
        );
    }
}

#[test]
fn test_lbfgs_objective_decreases_over_evaluations() {
    let (tags, mut attributes, instances, max_size) = extract();
    let n = attributes.assign_weights();
    let mut fb = FwdBwd::new(tags.len(), max_size);
    let inv_sigma_sq = 1.0;

    let weights = vec![0.0; n];
    let mut grad = vec![0.0; n];
    let at_zero = evaluate(
        &instances,
        &mut attributes,
        &mut fb,
        &weights,
        &mut grad,
        inv_sigma_sq,
    );

    // One explicit gradient step lowers the objective.
    let step = 0.1;
    let stepped: Vec<f64> = weights
        .iter()
        .zip(&grad)
        .map(|(w, g)| w - step * g)
        .collect();
    let mut scratch = vec![0.0; n];
    let after = evaluate(
        &instances,
        &mut attributes,
        &mut fb,
        &stepped,
        &mut scratch,
        inv_sigma_sq,
    );
    assert!(after < at_zero, "after {after} vs before {at_zero}");
}
