//! End-to-end training and tagging scenarios.

use std::io::Cursor;

use crate::io::conll::ConllReader;
use crate::model::Model;
use crate::sentence::Sentence;
use crate::tagger::Tagger;
use crate::trainer::{evaluate, Algorithm, Trainer, TrainerConfig};
use crate::trainer::forward_backward::FwdBwd;
use crate::features::{FeatureConfig, FeatureRegistry};
use crate::Task;

/// Only the current-word and label-bigram generators.
fn words_only() -> FeatureConfig {
    FeatureConfig {
        use_words: true,
        use_prev_words: false,
        use_next_words: false,
        use_word_bigrams: false,
        use_pos: false,
        use_prev_pos: false,
        use_next_pos: false,
        use_pos_bigrams: false,
        use_shape: false,
        use_trans: true,
    }
}

/// Current word, previous word, and label bigrams.
fn words_and_prev() -> FeatureConfig {
    FeatureConfig {
        use_prev_words: true,
        ..words_only()
    }
}

fn train(corpus: &str, config: TrainerConfig) -> Model {
    let mut reader = ConllReader::new("corpus", Cursor::new(corpus.to_string()));
    Trainer::new(config).unwrap().train(&mut reader).unwrap()
}

fn tag_words(model: &Model, words: &[&str]) -> Vec<String> {
    let tagger = Tagger::new(model, Task::Pos);
    let mut state = tagger.new_state();
    let mut sent = Sentence::new();
    sent.words = words.iter().map(|w| w.to_string()).collect();
    tagger.tag(&mut state, &mut sent);
    sent.pos
}

/// The objective of a trained model over the corpus it was trained on.
fn objective(model: &mut Model, corpus: &str, sigma: f64) -> f64 {
    let mut reader = ConllReader::new("corpus", Cursor::new(corpus.to_string()));
    let registry = FeatureRegistry::new(Task::Pos, &words_and_prev());
    let mut instances = vec![];
    let mut sent = Sentence::new();
    let mut max_size = 0;
    while crate::io::Reader::next(&mut reader, &mut sent).unwrap() {
        max_size = max_size.max(sent.len());
        instances.push(registry.build_instance(
            &model.attributes,
            &model.tags,
            &sent,
            &sent.pos,
        ));
    }
    let mut fb = FwdBwd::new(model.tags.len(), max_size);
    let mut grad = vec![0.0; model.weights.len()];
    let weights = model.weights.clone();
    evaluate(
        &instances,
        &mut model.attributes,
        &mut fb,
        &weights,
        &mut grad,
        1.0 / (sigma * sigma),
    )
}

const TOY_CORPUS: &str = "\
x A
y B
";

const POS_CORPUS: &str = "\
dogs N
bark V

cats N
run V
";

#[test]
fn test_two_label_toy_lbfgs() {
    let config = TrainerConfig::new(Task::Pos)
        .features(words_only())
        .sigma(1.0)
        .niterations(50);
    let model = train(TOY_CORPUS, config);

    assert_eq!(model.tags.len(), 4);
    assert_eq!(tag_words(&model, &["x", "y"]), ["A", "B"]);

    // The reversed sentence still decodes to a full sequence of real labels.
    let reversed = tag_words(&model, &["y", "x"]);
    assert_eq!(reversed.len(), 2);
    for label in &reversed {
        assert!(label == "A" || label == "B");
    }
}

#[test]
fn test_pos_tiny_lbfgs() {
    let config = TrainerConfig::new(Task::Pos)
        .features(words_and_prev())
        .sigma(1.0)
        .niterations(200);
    let model = train(POS_CORPUS, config);

    assert_eq!(tag_words(&model, &["dogs", "bark"]), ["N", "V"]);
    assert_eq!(tag_words(&model, &["cats", "bark"]), ["N", "V"]);
    // The label bigram fires in every training sentence while each word
    // feature fires once, so the learned N -> V transition outweighs the
    // word evidence on a reversed sentence.
    assert_eq!(tag_words(&model, &["bark", "cats"]), ["N", "V"]);
}

#[test]
fn test_frequency_cutoff_prunes_rare_features() {
    let mut corpus = String::new();
    for _ in 0..10 {
        corpus.push_str(POS_CORPUS);
        corpus.push('\n');
    }
    corpus.push_str("dogs V\n\n");

    let config = TrainerConfig::new(Task::Pos)
        .features(words_and_prev())
        .sigma(1.0)
        .niterations(100)
        .cutoff_words(2);
    let model = train(&corpus, config);

    // The single dogs/V observation fell below the cutoff.
    assert_eq!(tag_words(&model, &["dogs"]), ["N"]);
}

#[test]
fn test_sgd_matches_lbfgs_objective() {
    let sigma = 1.0;
    let lbfgs_config = TrainerConfig::new(Task::Pos)
        .features(words_and_prev())
        .sigma(sigma)
        .niterations(300);
    let mut lbfgs_model = train(POS_CORPUS, lbfgs_config);

    let sgd_config = TrainerConfig::new(Task::Pos)
        .features(words_and_prev())
        .algorithm(Algorithm::Sgd)
        .sigma(sigma)
        .niterations(1000)
        .delta(1e-9);
    let mut sgd_model = train(POS_CORPUS, sgd_config);

    let lbfgs_obj = objective(&mut lbfgs_model, POS_CORPUS, sigma);
    let sgd_obj = objective(&mut sgd_model, POS_CORPUS, sigma);
    assert!(lbfgs_obj.is_finite() && sgd_obj.is_finite());
    assert!(
        (sgd_obj - lbfgs_obj) / lbfgs_obj.abs() < 0.01,
        "sgd {sgd_obj} vs lbfgs {lbfgs_obj}",
    );

    // Both optimizers agree on the predictions.
    assert_eq!(tag_words(&sgd_model, &["dogs", "bark"]), ["N", "V"]);
    assert_eq!(tag_words(&sgd_model, &["cats", "run"]), ["N", "V"]);
}

#[test]
fn test_unseen_word_tie_breaks_to_lowest_id() {
    let config = TrainerConfig::new(Task::Pos)
        .features(words_only())
        .sigma(1.0)
        .niterations(100);
    let mut model = train(POS_CORPUS, config);

    // Zero every weight: all label sequences score the same and the decoder
    // must fall back to the lowest real label id.
    model.weights.iter_mut().for_each(|w| *w = 0.0);
    assert_eq!(tag_words(&model, &["z"]), [model.tags.str(2).to_string()]);
}

#[test]
fn test_model_round_trip_preserves_predictions() {
    let config = TrainerConfig::new(Task::Pos)
        .features(words_and_prev())
        .sigma(1.0)
        .niterations(100);
    let model = train(POS_CORPUS, config);

    let mut lexicon = vec![];
    let mut tags = vec![];
    let mut attributes = vec![];
    let mut features = vec![];
    let mut info = vec![];
    model
        .write(
            &mut lexicon,
            &mut tags,
            &mut attributes,
            &mut features,
            &mut info,
            "# test",
        )
        .unwrap();

    let reloaded = Model::read(
        lexicon.as_slice(),
        tags.as_slice(),
        attributes.as_slice(),
        features.as_slice(),
        info.as_slice(),
    )
    .unwrap();

    assert_eq!(reloaded.info().nfeatures, model.info().nfeatures);
    assert_eq!(reloaded.info().max_size, model.info().max_size);
    for words in [&["dogs", "bark"][..], &["bark", "cats"][..], &["cats"][..]] {
        assert_eq!(tag_words(&reloaded, words), tag_words(&model, words));
    }
}

#[test]
fn test_empty_corpus_is_an_error() {
    let mut reader = ConllReader::new("corpus", Cursor::new(String::new()));
    let config = TrainerConfig::new(Task::Pos);
    assert!(Trainer::new(config).unwrap().train(&mut reader).is_err());
}

#[test]
fn test_chunk_task_uses_pos_column() {
    let corpus = "\
dogs N B-NP
bark V B-VP

cats N B-NP
run V B-VP
";
    let mut reader = ConllReader::new("corpus", Cursor::new(corpus.to_string()));
    let config = TrainerConfig::new(Task::Chunk).sigma(1.0).niterations(100);
    let model = Trainer::new(config).unwrap().train(&mut reader).unwrap();

    let tagger = Tagger::new(&model, Task::Chunk);
    let mut state = tagger.new_state();
    let mut sent = Sentence::new();
    sent.words = vec!["dogs".to_string(), "bark".to_string()];
    sent.pos = vec!["N".to_string(), "V".to_string()];
    tagger.tag(&mut state, &mut sent);
    assert_eq!(sent.chunks, ["B-NP", "B-VP"]);
}
