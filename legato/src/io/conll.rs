//! Reader for the CoNLL column dialect.
//!
//! One token per line with whitespace-separated columns in the order
//! word, POS, chunk, entity; a blank line ends a sentence.

use std::io::{BufRead, Seek, SeekFrom};

use crate::errors::{LegatoError, Result};
use crate::io::Reader;
use crate::sentence::Sentence;

const COLUMNS: [char; 4] = ['w', 'p', 'c', 'n'];

/// Reader over CoNLL-formatted input.
pub struct ConllReader<R> {
    uri: String,
    rdr: R,
    nlines: u64,
    buf: String,
}

impl<R> ConllReader<R>
where
    R: BufRead + Seek,
{
    /// Creates a new reader.
    ///
    /// # Arguments
    ///
    ///  * `uri` - Name of the source, used in error messages.
    ///  * `rdr` - The underlying input.
    pub fn new<S>(uri: S, rdr: R) -> Self
    where
        S: Into<String>,
    {
        Self {
            uri: uri.into(),
            rdr,
            nlines: 0,
            buf: String::new(),
        }
    }

    fn next_line(&mut self) -> Result<bool> {
        self.buf.clear();
        let num_bytes = self
            .rdr
            .read_line(&mut self.buf)
            .map_err(|e| LegatoError::io_at(self.uri.as_str(), self.nlines + 1, e.to_string()))?;
        if num_bytes == 0 {
            return Ok(false);
        }
        self.nlines += 1;
        while self.buf.ends_with('\n') || self.buf.ends_with('\r') {
            self.buf.pop();
        }
        Ok(true)
    }
}

impl<R> Reader for ConllReader<R>
where
    R: BufRead + Seek,
{
    fn next(&mut self, sent: &mut Sentence) -> Result<bool> {
        sent.clear();
        while self.next_line()? {
            if self.buf.is_empty() {
                if sent.is_empty() {
                    continue;
                }
                return Ok(true);
            }
            let mut index = 0;
            for field in self.buf.split_whitespace() {
                if index >= COLUMNS.len() {
                    return Err(LegatoError::io_at(
                        &self.uri,
                        self.nlines,
                        "too many columns in CoNLL line",
                    ));
                }
                sent.column_mut(COLUMNS[index])?.push(field.to_string());
                index += 1;
            }
        }
        Ok(!sent.is_empty())
    }

    fn reset(&mut self) -> Result<()> {
        self.rdr
            .seek(SeekFrom::Start(0))
            .map_err(|_| LegatoError::io(self.uri.as_str(), "input could not be rewound"))?;
        self.nlines = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CORPUS: &str = "\
dogs N B-NP O
bark V B-VP O

cats N B-NP O
run V B-VP O
";

    #[test]
    fn test_read_sentences() {
        let mut rdr = ConllReader::new("corpus", Cursor::new(CORPUS));
        let mut sent = Sentence::new();

        assert!(rdr.next(&mut sent).unwrap());
        assert_eq!(sent.words, ["dogs", "bark"]);
        assert_eq!(sent.pos, ["N", "V"]);
        assert_eq!(sent.chunks, ["B-NP", "B-VP"]);
        assert_eq!(sent.entities, ["O", "O"]);

        assert!(rdr.next(&mut sent).unwrap());
        assert_eq!(sent.words, ["cats", "run"]);

        assert!(!rdr.next(&mut sent).unwrap());
    }

    #[test]
    fn test_reset() {
        let mut rdr = ConllReader::new("corpus", Cursor::new(CORPUS));
        let mut sent = Sentence::new();
        while rdr.next(&mut sent).unwrap() {}
        rdr.reset().unwrap();
        assert!(rdr.next(&mut sent).unwrap());
        assert_eq!(sent.words, ["dogs", "bark"]);
    }

    #[test]
    fn test_missing_final_blank_line() {
        let mut rdr = ConllReader::new("corpus", Cursor::new("dogs N B-NP O\n"));
        let mut sent = Sentence::new();
        assert!(rdr.next(&mut sent).unwrap());
        assert_eq!(sent.words, ["dogs"]);
        assert!(!rdr.next(&mut sent).unwrap());
    }
}
