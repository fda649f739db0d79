//! Viterbi tagging with a trained model.

mod lattice;

use crate::common::{Tag, TagPair};
use crate::features::FeatureRegistry;
use crate::model::attributes::Context;
use crate::model::Model;
use crate::sentence::{Sentence, Task};
use crate::tagger::lattice::Lattice;

/// Tagger over a trained model.
pub struct Tagger<'a> {
    model: &'a Model,
    registry: FeatureRegistry,
    task: Task,
}

/// Reusable per-sentence tagging state: the position score matrix and the
/// Viterbi lattice.
pub struct State {
    dist: Vec<Vec<f64>>,
    lattice: Lattice,
    context: Context,
    path: Vec<Tag>,
}

impl State {
    fn new(ntags: usize) -> Self {
        Self {
            dist: vec![vec![0.0; ntags]; ntags],
            lattice: Lattice::new(ntags),
            context: Context::new(TagPair::default()),
            path: vec![],
        }
    }

    fn reset(&mut self) {
        self.lattice.reset();
        self.next_word();
    }

    fn next_word(&mut self) {
        for row in &mut self.dist {
            row.iter_mut().for_each(|v| *v = 0.0);
        }
    }
}

impl<'a> Tagger<'a> {
    /// Creates a new instance.
    ///
    /// # Arguments
    ///
    ///  * `model` - Model to be used.
    ///  * `task` - Task whose column receives the predictions.
    pub fn new(model: &'a Model, task: Task) -> Self {
        let registry = FeatureRegistry::new(task, &crate::features::FeatureConfig::default());
        Self {
            model,
            registry,
            task,
        }
    }

    /// Creates a tagging state sized for this model.
    pub fn new_state(&self) -> State {
        State::new(self.model.num_tags())
    }

    /// Tags one sentence, writing the predicted labels into the task's
    /// column of `sent`.
    pub fn tag(&self, state: &mut State, sent: &mut Sentence) {
        state.reset();
        let len = sent.len();
        if len == 0 {
            return;
        }

        for i in 0..len {
            state.next_word();
            state.context.clear();
            self.registry
                .fill_position(&self.model.attributes, sent, i, &mut state.context);
            for &fref in state.context.features() {
                let feature = self.model.attributes.feature(fref);
                let pair = feature.pair;
                state.dist[usize::from(pair.prev)][usize::from(pair.curr)] +=
                    self.model.weights[feature.slot as usize];
            }
            state.lattice.viterbi(&state.dist);
        }

        state.lattice.best(len, &mut state.path);
        let labels = self.task.labels_mut(sent);
        labels.clear();
        labels.extend(
            state
                .path
                .iter()
                .map(|&tag| self.model.tags.str(tag).to_string()),
        );
    }
}
