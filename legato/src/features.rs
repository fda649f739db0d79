//! Feature type catalogue and predicate generators.

use crate::common::{TagPair, SENTINEL};
use crate::model::attributes::{AttributeIndex, Context};
use crate::model::tagset::TagSet;
use crate::sentence::{Sentence, Task};

pub(crate) struct FeatureTypeDef {
    pub(crate) name: &'static str,
    #[allow(dead_code)]
    pub(crate) desc: &'static str,
}

pub(crate) const TYPE_W: u16 = 0;
pub(crate) const TYPE_PW: u16 = 1;
pub(crate) const TYPE_PPW: u16 = 2;
pub(crate) const TYPE_NW: u16 = 3;
pub(crate) const TYPE_NNW: u16 = 4;
pub(crate) const TYPE_PW_W: u16 = 5;
pub(crate) const TYPE_W_NW: u16 = 6;
pub(crate) const TYPE_P: u16 = 7;
pub(crate) const TYPE_PP: u16 = 8;
pub(crate) const TYPE_PPP: u16 = 9;
pub(crate) const TYPE_NP: u16 = 10;
pub(crate) const TYPE_NNP: u16 = 11;
pub(crate) const TYPE_PP_P: u16 = 12;
pub(crate) const TYPE_P_NP: u16 = 13;
pub(crate) const TYPE_S: u16 = 14;
pub(crate) const TYPE_PS: u16 = 15;
pub(crate) const TYPE_NS: u16 = 16;
pub(crate) const TYPE_TRANS: u16 = 17;

pub(crate) const TYPE_DEFS: [FeatureTypeDef; 18] = [
    FeatureTypeDef { name: "w", desc: "word" },
    FeatureTypeDef { name: "pw", desc: "prev word" },
    FeatureTypeDef { name: "ppw", desc: "prev prev word" },
    FeatureTypeDef { name: "nw", desc: "next word" },
    FeatureTypeDef { name: "nnw", desc: "next next word" },
    FeatureTypeDef { name: "pw_w", desc: "prev word + curr word" },
    FeatureTypeDef { name: "w_nw", desc: "curr word + next word" },
    FeatureTypeDef { name: "p", desc: "pos" },
    FeatureTypeDef { name: "pp", desc: "prev pos" },
    FeatureTypeDef { name: "ppp", desc: "prev prev pos" },
    FeatureTypeDef { name: "np", desc: "next pos" },
    FeatureTypeDef { name: "nnp", desc: "next next pos" },
    FeatureTypeDef { name: "pp_p", desc: "prev pos + curr pos" },
    FeatureTypeDef { name: "p_np", desc: "curr pos + next pos" },
    FeatureTypeDef { name: "s", desc: "shape" },
    FeatureTypeDef { name: "ps", desc: "prev shape" },
    FeatureTypeDef { name: "ns", desc: "next shape" },
    FeatureTypeDef { name: "trans", desc: "label bigram" },
];

pub(crate) const NUM_TYPES: usize = TYPE_DEFS.len();

#[inline(always)]
pub(crate) fn type_name(ty: u16) -> &'static str {
    TYPE_DEFS[usize::from(ty)].name
}

pub(crate) fn type_index(name: &str) -> Option<u16> {
    TYPE_DEFS
        .iter()
        .position(|def| def.name == name)
        .map(|i| i as u16)
}

/// Switches selecting which predicate generators are active.
///
/// POS predicates only apply to the chunk and NER tasks, and shape predicates
/// only to NER; a switch enables its group for the tasks that use it.
#[derive(Clone, Copy, Debug)]
pub struct FeatureConfig {
    /// Current-word predicate.
    pub use_words: bool,
    /// Words one and two positions back.
    pub use_prev_words: bool,
    /// Words one and two positions ahead.
    pub use_next_words: bool,
    /// Adjacent word-pair predicates.
    pub use_word_bigrams: bool,
    /// Current-POS predicate.
    pub use_pos: bool,
    /// POS one and two positions back.
    pub use_prev_pos: bool,
    /// POS one and two positions ahead.
    pub use_next_pos: bool,
    /// Adjacent POS-pair predicates.
    pub use_pos_bigrams: bool,
    /// Orthographic shape predicates.
    pub use_shape: bool,
    /// The pure label-bigram predicate. Must stay enabled for linear-chain
    /// training.
    pub use_trans: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            use_words: true,
            use_prev_words: true,
            use_next_words: true,
            use_word_bigrams: true,
            use_pos: true,
            use_prev_pos: true,
            use_next_pos: true,
            use_pos_bigrams: true,
            use_shape: true,
            use_trans: true,
        }
    }
}

/// Collapses a token into its orthographic shape: runs of lowercase become
/// `a`, uppercase `A`, digits `0`, and punctuation falls into a handful of
/// classes.
pub(crate) fn shape(word: &str) -> String {
    let mut buf = String::new();
    for c in word.chars() {
        let class = if c.is_lowercase() {
            'a'
        } else if c.is_uppercase() {
            'A'
        } else {
            match c {
                '0'..='9' => '0',
                '-' | ':' => '-',
                '.' | '?' | '!' => '.',
                ',' | ';' => ',',
                _ => c,
            }
        };
        if buf.chars().last() != Some(class) {
            buf.push(class);
        }
    }
    buf
}

enum GenKind {
    Word { offset: isize },
    WordBigram { offset: isize },
    Pos { offset: isize },
    PosBigram { offset: isize },
    Shape { offset: isize },
    Trans,
}

struct RegEntry {
    ty: u16,
    kind: GenKind,
    include_state: bool,
    include_trans: bool,
}

/// The set of active generators, in registration order. The order is fixed,
/// so feature lists at a position are stable across runs.
pub(crate) struct FeatureRegistry {
    entries: Vec<RegEntry>,
}

impl FeatureRegistry {
    pub(crate) fn new(task: Task, config: &FeatureConfig) -> Self {
        let pos_feats = matches!(task, Task::Chunk | Task::Ner);
        let shape_feats = matches!(task, Task::Ner);

        let mut registry = Self { entries: vec![] };
        let c = config;

        registry.reg(TYPE_W, GenKind::Word { offset: 0 }, c.use_words);
        registry.reg(TYPE_PW, GenKind::Word { offset: -1 }, c.use_prev_words);
        registry.reg(TYPE_PPW, GenKind::Word { offset: -2 }, c.use_prev_words);
        registry.reg(TYPE_NW, GenKind::Word { offset: 1 }, c.use_next_words);
        registry.reg(TYPE_NNW, GenKind::Word { offset: 2 }, c.use_next_words);
        registry.reg(
            TYPE_PW_W,
            GenKind::WordBigram { offset: -1 },
            c.use_word_bigrams,
        );
        registry.reg(
            TYPE_W_NW,
            GenKind::WordBigram { offset: 0 },
            c.use_word_bigrams,
        );

        registry.reg(TYPE_P, GenKind::Pos { offset: 0 }, pos_feats && c.use_pos);
        registry.reg(
            TYPE_PP,
            GenKind::Pos { offset: -1 },
            pos_feats && c.use_prev_pos,
        );
        registry.reg(
            TYPE_PPP,
            GenKind::Pos { offset: -2 },
            pos_feats && c.use_prev_pos,
        );
        registry.reg(
            TYPE_NP,
            GenKind::Pos { offset: 1 },
            pos_feats && c.use_next_pos,
        );
        registry.reg(
            TYPE_NNP,
            GenKind::Pos { offset: 2 },
            pos_feats && c.use_next_pos,
        );
        registry.reg(
            TYPE_PP_P,
            GenKind::PosBigram { offset: -1 },
            pos_feats && c.use_pos_bigrams,
        );
        registry.reg(
            TYPE_P_NP,
            GenKind::PosBigram { offset: 0 },
            pos_feats && c.use_pos_bigrams,
        );

        registry.reg(TYPE_S, GenKind::Shape { offset: 0 }, shape_feats && c.use_shape);
        registry.reg(
            TYPE_PS,
            GenKind::Shape { offset: -1 },
            shape_feats && c.use_shape,
        );
        registry.reg(
            TYPE_NS,
            GenKind::Shape { offset: 1 },
            shape_feats && c.use_shape,
        );

        registry.reg(TYPE_TRANS, GenKind::Trans, c.use_trans);
        registry
    }

    fn reg(&mut self, ty: u16, kind: GenKind, enabled: bool) {
        if !enabled {
            return;
        }
        // Transition features strictly join adjacent positions: only the
        // label-bigram generator may claim them.
        let include_trans = matches!(kind, GenKind::Trans);
        self.entries.push(RegEntry {
            ty,
            kind,
            include_state: !include_trans,
            include_trans,
        });
    }

    fn value(kind: &GenKind, sent: &Sentence, j: usize) -> Option<String> {
        fn at(column: &[String], j: usize, offset: isize) -> Option<&String> {
            let k = j as isize + offset;
            if k < 0 {
                return None;
            }
            column.get(k as usize)
        }

        match kind {
            GenKind::Word { offset } => at(&sent.words, j, *offset).cloned(),
            GenKind::WordBigram { offset } => {
                let first = at(&sent.words, j, *offset)?;
                let second = at(&sent.words, j, *offset + 1)?;
                Some(format!("{first} {second}"))
            }
            GenKind::Pos { offset } => at(&sent.pos, j, *offset).cloned(),
            GenKind::PosBigram { offset } => {
                let first = at(&sent.pos, j, *offset)?;
                let second = at(&sent.pos, j, *offset + 1)?;
                Some(format!("{first} {second}"))
            }
            GenKind::Shape { offset } => at(&sent.words, j, *offset).map(|w| shape(w)),
            GenKind::Trans => Some(String::new()),
        }
    }

    /// Extraction mode: counts every predicate firing in `sent` against the
    /// gold label pair of its position.
    pub(crate) fn extract(
        &self,
        attributes: &mut AttributeIndex,
        tags: &TagSet,
        sent: &Sentence,
        labels: &[String],
    ) {
        for j in 0..sent.len() {
            let pair = gold_pair(tags, labels, j);
            for entry in &self.entries {
                if let Some(value) = Self::value(&entry.kind, sent, j) {
                    attributes.observe(
                        entry.ty,
                        &value,
                        pair,
                        entry.include_state,
                        entry.include_trans,
                    );
                }
            }
        }
    }

    /// Instance mode: collects the active features of every position of
    /// `sent` into one context per position.
    pub(crate) fn build_instance(
        &self,
        attributes: &AttributeIndex,
        tags: &TagSet,
        sent: &Sentence,
        labels: &[String],
    ) -> Vec<Context> {
        (0..sent.len())
            .map(|j| {
                let mut context = Context::new(gold_pair(tags, labels, j));
                self.fill_position(attributes, sent, j, &mut context);
                context
            })
            .collect()
    }

    /// Collects the features firing at position `j` into `context`; used at
    /// tag time, where no gold labels exist.
    pub(crate) fn fill_position(
        &self,
        attributes: &AttributeIndex,
        sent: &Sentence,
        j: usize,
        context: &mut Context,
    ) {
        for entry in &self.entries {
            if let Some(value) = Self::value(&entry.kind, sent, j) {
                attributes.fill_context(entry.ty, &value, context);
            }
        }
    }
}

/// The gold label pair at position `j`: the boundary label stands in for the
/// previous label at the first position.
pub(crate) fn gold_pair(tags: &TagSet, labels: &[String], j: usize) -> TagPair {
    if j == 0 {
        TagPair::new(SENTINEL, tags.canonize(&labels[0]))
    } else {
        TagPair::new(tags.canonize(&labels[j - 1]), tags.canonize(&labels[j]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_lookup() {
        assert_eq!(type_index("w"), Some(TYPE_W));
        assert_eq!(type_index("trans"), Some(TYPE_TRANS));
        assert_eq!(type_index("gaz"), None);
        assert_eq!(type_name(TYPE_PW_W), "pw_w");
    }

    #[test]
    fn test_shape() {
        assert_eq!(shape("Vinken"), "Aa");
        assert_eq!(shape("61-year-old"), "0-a-a");
        assert_eq!(shape("U.S."), "A.A.");
        assert_eq!(shape("1987"), "0");
    }

    #[test]
    fn test_offsets_skip_out_of_range() {
        let mut sent = Sentence::new();
        sent.words = vec!["dogs".to_string(), "bark".to_string()];
        assert_eq!(
            FeatureRegistry::value(&GenKind::Word { offset: -1 }, &sent, 0),
            None
        );
        assert_eq!(
            FeatureRegistry::value(&GenKind::Word { offset: 1 }, &sent, 1),
            None
        );
        assert_eq!(
            FeatureRegistry::value(&GenKind::WordBigram { offset: 0 }, &sent, 0).as_deref(),
            Some("dogs bark")
        );
    }

    #[test]
    fn test_only_trans_owns_transitions() {
        let registry = FeatureRegistry::new(Task::Ner, &FeatureConfig::default());
        for entry in &registry.entries {
            if entry.include_trans {
                assert!(matches!(entry.kind, GenKind::Trans));
                assert_eq!(entry.ty, TYPE_TRANS);
            }
        }
    }
}
