//! Word symbol table.

use std::io::{BufRead, Write};

use hashbrown::HashMap;

use crate::common::{NONE_STR, SENTINEL, SENTINEL_STR};
use crate::errors::{LegatoError, Result};
use crate::io;

/// Word id. Ids `0` and `1` are reserved for the same two sentinels as label
/// ids.
pub type Word = u32;

struct LexEntry {
    value: String,
    freq: u64,
}

/// Symbol table interning word strings into dense ids with frequencies.
///
/// Append-only during training; immutable after save. The two reserved
/// entries are never persisted: the loader re-creates them, so file entries
/// always start at id 2.
pub struct Lexicon {
    index: HashMap<String, Word>,
    entries: Vec<LexEntry>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexicon {
    /// Creates a table holding only the two reserved entries.
    pub fn new() -> Self {
        let mut lexicon = Self {
            index: HashMap::new(),
            entries: vec![],
        };
        lexicon.push(NONE_STR.to_string(), 0);
        lexicon.push(SENTINEL_STR.to_string(), 0);
        lexicon
    }

    fn push(&mut self, value: String, freq: u64) -> Word {
        let id = self.entries.len() as Word;
        self.index.insert(value.clone(), id);
        self.entries.push(LexEntry { value, freq });
        id
    }

    /// Records one occurrence of `raw`, interning it on first sight.
    pub fn add(&mut self, raw: &str) -> Word {
        if let Some(&id) = self.index.get(raw) {
            self.entries[id as usize].freq += 1;
            id
        } else {
            self.push(raw.to_string(), 1)
        }
    }

    /// Returns the id of `raw`, or [`SENTINEL`] when it was never seen.
    pub fn canonize(&self, raw: &str) -> Word {
        self.index.get(raw).copied().unwrap_or(Word::from(SENTINEL))
    }

    /// Returns the string of an id.
    pub fn str(&self, word: Word) -> &str {
        &self.entries[word as usize].value
    }

    /// Returns the recorded frequency of an id.
    pub fn freq(&self, word: Word) -> u64 {
        self.entries[word as usize].freq
    }

    /// Returns the number of entries, reserved ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the table holds only the reserved entries.
    pub fn is_empty(&self) -> bool {
        self.entries.len() == 2
    }

    /// Re-sorts the non-reserved entries by descending frequency and
    /// renumbers ids, so that the most frequent items get the lowest ids.
    /// The sort is stable, keeping first-seen order among equal frequencies.
    pub fn sort_by_freq(&mut self) {
        self.entries[2..].sort_by_key(|e| std::cmp::Reverse(e.freq));
        self.index.clear();
        for (id, entry) in self.entries.iter().enumerate() {
            self.index.insert(entry.value.clone(), id as Word);
        }
    }

    /// Writes the table as `<word> <freq>` lines under the preface. Entries
    /// must already be sorted by [`Lexicon::sort_by_freq`].
    pub fn write<W>(&self, wtr: &mut W, preface: &str) -> Result<()>
    where
        W: Write,
    {
        io::write_preface(wtr, preface)?;
        for entry in &self.entries[2..] {
            writeln!(wtr, "{} {}", entry.value, entry.freq)?;
        }
        Ok(())
    }

    /// Reads a table written by [`Lexicon::write`].
    ///
    /// # Errors
    ///
    /// [`LegatoError::Io`] is returned when a line cannot be parsed; the
    /// error carries `uri` and the 1-based line number.
    pub fn read<R>(uri: &str, rdr: &mut R) -> Result<Self>
    where
        R: BufRead,
    {
        let mut lexicon = Self::new();
        let mut nlines = 0;
        io::read_preface(uri, rdr, &mut nlines)?;

        let mut buf = String::new();
        while io::read_data_line(uri, rdr, &mut nlines, &mut buf)? {
            let mut spl = buf.split_whitespace();
            let (word, freq) = match (spl.next(), spl.next(), spl.next()) {
                (Some(word), Some(freq), None) => (word, freq),
                _ => {
                    return Err(LegatoError::io_at(
                        uri,
                        nlines,
                        "expected a word and a frequency",
                    ))
                }
            };
            let freq = freq.parse::<u64>().map_err(|_| {
                LegatoError::io_at(uri, nlines, "could not parse frequency")
            })?;
            lexicon.push(word.to_string(), freq);
        }
        Ok(lexicon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{NONE, SENTINEL};

    #[test]
    fn test_reserved_entries() {
        let lexicon = Lexicon::new();
        assert_eq!(lexicon.str(Word::from(NONE)), NONE_STR);
        assert_eq!(lexicon.str(Word::from(SENTINEL)), SENTINEL_STR);
        assert_eq!(lexicon.len(), 2);
    }

    #[test]
    fn test_add_and_canonize() {
        let mut lexicon = Lexicon::new();
        let dogs = lexicon.add("dogs");
        lexicon.add("dogs");
        lexicon.add("bark");
        assert_eq!(lexicon.canonize("dogs"), dogs);
        assert_eq!(lexicon.freq(dogs), 2);
        assert_eq!(lexicon.canonize("cats"), Word::from(SENTINEL));
    }

    #[test]
    fn test_sort_by_freq() {
        let mut lexicon = Lexicon::new();
        lexicon.add("rare");
        for _ in 0..3 {
            lexicon.add("common");
        }
        lexicon.sort_by_freq();
        assert_eq!(lexicon.canonize("common"), 2);
        assert_eq!(lexicon.canonize("rare"), 3);
    }

    #[test]
    fn test_round_trip() {
        let mut lexicon = Lexicon::new();
        for _ in 0..3 {
            lexicon.add("dogs");
        }
        lexicon.add("bark");
        lexicon.sort_by_freq();

        let mut data = vec![];
        lexicon.write(&mut data, "# test").unwrap();

        let reloaded = Lexicon::read("lexicon", &mut data.as_slice()).unwrap();
        assert_eq!(reloaded.canonize("dogs"), 2);
        assert_eq!(reloaded.freq(2), 3);
        assert_eq!(reloaded.canonize("bark"), 3);

        let mut data2 = vec![];
        reloaded.write(&mut data2, "# test").unwrap();
        assert_eq!(data, data2);
    }

    #[test]
    fn test_truncated_file() {
        let data = b"# test\ndogs 3\nbark";
        let e = Lexicon::read("lexicon", &mut &data[..]);
        assert!(e.is_err());
    }
}
