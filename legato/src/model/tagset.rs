//! Label symbol table.

use std::io::{BufRead, Write};

use hashbrown::HashMap;

use crate::common::{Tag, FIRST_REAL_TAG, NONE_STR, SENTINEL, SENTINEL_STR};
use crate::errors::{LegatoError, Result};
use crate::io;

struct TagEntry {
    value: String,
    freq: u64,
}

/// Symbol table interning label strings into dense ids with frequencies.
///
/// Ids `0` and `1` are the reserved `__NONE__` and `__SENTINEL__` entries;
/// real labels start at [`FIRST_REAL_TAG`]. The table never invents labels:
/// an unseen string canonizes to [`SENTINEL`].
pub struct TagSet {
    index: HashMap<String, Tag>,
    entries: Vec<TagEntry>,
}

impl Default for TagSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TagSet {
    /// Creates a table holding only the two reserved entries.
    pub fn new() -> Self {
        let mut tags = Self {
            index: HashMap::new(),
            entries: vec![],
        };
        tags.push(NONE_STR.to_string(), 0);
        tags.push(SENTINEL_STR.to_string(), 0);
        tags
    }

    fn push(&mut self, value: String, freq: u64) -> Tag {
        let id = self.entries.len() as Tag;
        self.index.insert(value.clone(), id);
        self.entries.push(TagEntry { value, freq });
        id
    }

    /// Records one occurrence of `raw`, interning it on first sight.
    pub fn add(&mut self, raw: &str) -> Tag {
        if let Some(&id) = self.index.get(raw) {
            self.entries[id as usize].freq += 1;
            id
        } else {
            self.push(raw.to_string(), 1)
        }
    }

    /// Returns the id of `raw`, or [`SENTINEL`] when it was never seen.
    pub fn canonize(&self, raw: &str) -> Tag {
        self.index.get(raw).copied().unwrap_or(SENTINEL)
    }

    /// Returns the string of an id.
    pub fn str(&self, tag: Tag) -> &str {
        &self.entries[usize::from(tag)].value
    }

    /// Returns the number of labels, reserved ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the table holds only the reserved entries.
    pub fn is_empty(&self) -> bool {
        self.entries.len() == usize::from(FIRST_REAL_TAG)
    }

    /// Iterates over the ids of real labels.
    pub fn real_tags(&self) -> impl Iterator<Item = Tag> {
        FIRST_REAL_TAG..self.entries.len() as Tag
    }

    /// Re-sorts the real labels by descending frequency and renumbers ids;
    /// the reserved entries keep ids 0 and 1. Stable among equal frequencies.
    pub fn sort_by_freq(&mut self) {
        self.entries[usize::from(FIRST_REAL_TAG)..].sort_by_key(|e| std::cmp::Reverse(e.freq));
        self.index.clear();
        for (id, entry) in self.entries.iter().enumerate() {
            self.index.insert(entry.value.clone(), id as Tag);
        }
    }

    /// Writes the table as `<label> <freq>` lines under the preface. Entries
    /// must already be sorted by [`TagSet::sort_by_freq`].
    pub fn write<W>(&self, wtr: &mut W, preface: &str) -> Result<()>
    where
        W: Write,
    {
        io::write_preface(wtr, preface)?;
        for entry in &self.entries[usize::from(FIRST_REAL_TAG)..] {
            writeln!(wtr, "{} {}", entry.value, entry.freq)?;
        }
        Ok(())
    }

    /// Reads a table written by [`TagSet::write`].
    ///
    /// # Errors
    ///
    /// [`LegatoError::Io`] is returned when a line cannot be parsed; the
    /// error carries `uri` and the 1-based line number.
    pub fn read<R>(uri: &str, rdr: &mut R) -> Result<Self>
    where
        R: BufRead,
    {
        let mut tags = Self::new();
        let mut nlines = 0;
        io::read_preface(uri, rdr, &mut nlines)?;

        let mut buf = String::new();
        while io::read_data_line(uri, rdr, &mut nlines, &mut buf)? {
            let mut spl = buf.split_whitespace();
            let (label, freq) = match (spl.next(), spl.next(), spl.next()) {
                (Some(label), Some(freq), None) => (label, freq),
                _ => {
                    return Err(LegatoError::io_at(
                        uri,
                        nlines,
                        "expected a label and a frequency",
                    ))
                }
            };
            let freq = freq.parse::<u64>().map_err(|_| {
                LegatoError::io_at(uri, nlines, "could not parse frequency")
            })?;
            if tags.entries.len() > usize::from(Tag::MAX) {
                return Err(LegatoError::io_at(uri, nlines, "too many labels"));
            }
            tags.push(label.to_string(), freq);
        }
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NONE;

    #[test]
    fn test_reserved_entries() {
        let tags = TagSet::new();
        assert_eq!(tags.str(NONE), NONE_STR);
        assert_eq!(tags.str(SENTINEL), SENTINEL_STR);
        assert_eq!(tags.len(), 2);
        assert_eq!(tags.real_tags().count(), 0);
    }

    #[test]
    fn test_unknown_label_is_sentinel() {
        let mut tags = TagSet::new();
        tags.add("N");
        assert_eq!(tags.canonize("N"), 2);
        assert_eq!(tags.canonize("V"), SENTINEL);
    }

    #[test]
    fn test_round_trip_after_sort() {
        let mut tags = TagSet::new();
        tags.add("V");
        for _ in 0..2 {
            tags.add("N");
        }
        tags.sort_by_freq();
        assert_eq!(tags.canonize("N"), 2);
        assert_eq!(tags.canonize("V"), 3);

        let mut data = vec![];
        tags.write(&mut data, "# test").unwrap();

        let reloaded = TagSet::read("tags", &mut data.as_slice()).unwrap();
        assert_eq!(reloaded.canonize("N"), 2);
        assert_eq!(reloaded.canonize("V"), 3);
        assert_eq!(reloaded.len(), 4);

        let mut data2 = vec![];
        reloaded.write(&mut data2, "# test").unwrap();
        assert_eq!(data, data2);
    }
}
