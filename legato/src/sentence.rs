//! Sentences as parallel columns of token annotations.

use crate::errors::{LegatoError, Result};

/// A sentence: parallel columns of equal length.
///
/// `words` is always filled; the other columns are filled only when the input
/// dialect provides them or when a tagger writes its predictions back.
#[derive(Default, Clone, Debug)]
pub struct Sentence {
    /// Surface tokens.
    pub words: Vec<String>,
    /// Part-of-speech column.
    pub pos: Vec<String>,
    /// Chunk column.
    pub chunks: Vec<String>,
    /// Named-entity column.
    pub entities: Vec<String>,
}

impl Sentence {
    /// Creates an empty sentence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tokens.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Checks if the sentence has no tokens.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Clears all columns, keeping their capacity.
    pub fn clear(&mut self) {
        self.words.clear();
        self.pos.clear();
        self.chunks.clear();
        self.entities.clear();
    }

    /// Resolves a format-string specifier (`w`, `p`, `c`, `n`) to a column.
    pub(crate) fn column(&self, spec: char) -> Result<&Vec<String>> {
        match spec {
            'w' => Ok(&self.words),
            'p' => Ok(&self.pos),
            'c' => Ok(&self.chunks),
            'n' => Ok(&self.entities),
            _ => Err(LegatoError::invalid_value(format!(
                "unrecognised column specifier %{spec}"
            ))),
        }
    }

    /// Mutable variant of [`Sentence::column`].
    pub(crate) fn column_mut(&mut self, spec: char) -> Result<&mut Vec<String>> {
        match spec {
            'w' => Ok(&mut self.words),
            'p' => Ok(&mut self.pos),
            'c' => Ok(&mut self.chunks),
            'n' => Ok(&mut self.entities),
            _ => Err(LegatoError::invalid_value(format!(
                "unrecognised column specifier %{spec}"
            ))),
        }
    }
}

/// The tagging task, which selects the gold/predicted column and the default
/// set of feature generators.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Task {
    /// Part-of-speech tagging over the `pos` column.
    Pos,
    /// Phrase chunking over the `chunks` column, with POS features.
    Chunk,
    /// Named-entity tagging over the `entities` column, with POS and shape
    /// features.
    Ner,
}

impl Task {
    /// The column holding the labels of this task.
    pub(crate) fn labels<'a>(&self, sent: &'a Sentence) -> &'a [String] {
        match self {
            Self::Pos => &sent.pos,
            Self::Chunk => &sent.chunks,
            Self::Ner => &sent.entities,
        }
    }

    /// Mutable variant of [`Task::labels`], used to write predictions back.
    pub(crate) fn labels_mut<'a>(&self, sent: &'a mut Sentence) -> &'a mut Vec<String> {
        match self {
            Self::Pos => &mut sent.pos,
            Self::Chunk => &mut sent.chunks,
            Self::Ner => &mut sent.entities,
        }
    }
}

impl std::str::FromStr for Task {
    type Err = LegatoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pos" => Ok(Self::Pos),
            "chunk" => Ok(Self::Chunk),
            "ner" => Ok(Self::Ner),
            _ => Err(LegatoError::config(
                "task",
                Some(s.to_string()),
                "expected one of pos, chunk, ner",
            )),
        }
    }
}
