//! Reader and writer driven by a format string.
//!
//! A format string such as `"%w|%p \n"` lists the columns of each token and
//! the separators between them: here a token is `word|pos`, tokens are
//! separated by a space, and a sentence ends with a newline. `%%` escapes a
//! literal per-cent sign.

use std::io::{BufRead, Seek, SeekFrom, Write};

use crate::errors::{LegatoError, Result};
use crate::io::{Reader, Writer};
use crate::sentence::Sentence;

/// A parsed format string.
#[derive(Clone, Debug)]
pub struct Format {
    fields: Vec<char>,
    separators: Vec<char>,
    word_sep: char,
    sent_pre: String,
    sent_post: String,
}

impl Format {
    /// Parses a format string.
    ///
    /// # Errors
    ///
    /// [`LegatoError::InvalidValue`] is returned when the format string has
    /// no field, lacks a separator, or uses an unrecognised specifier.
    pub fn parse(format: &str) -> Result<Self> {
        let chars: Vec<char> = format.chars().collect();
        let mut pos = 0;

        let sent_pre = Self::parse_literal(&chars, &mut pos);
        if pos == chars.len() {
            return Err(LegatoError::invalid_value(
                "format string must contain at least one field",
            ));
        }

        let mut fields = vec![];
        let mut separators = vec![];
        while pos < chars.len() && chars[pos] == '%' {
            let spec = *chars.get(pos + 1).ok_or_else(|| {
                LegatoError::invalid_value("unexpected end of format string after %")
            })?;
            if spec == '%' {
                break;
            }
            if !matches!(spec, 'w' | 'p' | 'c' | 'n') {
                return Err(LegatoError::invalid_value(format!(
                    "unrecognised format string specifier %{spec}"
                )));
            }
            fields.push(spec);
            let sep = *chars.get(pos + 2).ok_or_else(|| {
                LegatoError::invalid_value(format!("format string is missing separator after %{spec}"))
            })?;
            if sep == '%' {
                if chars.get(pos + 3) != Some(&'%') {
                    return Err(LegatoError::invalid_value("missing separator after %"));
                }
                pos += 1;
            }
            separators.push(sep);
            pos += 3;
        }

        let word_sep = *separators.last().unwrap();
        separators.pop();

        if pos == chars.len() {
            return Err(LegatoError::invalid_value(
                "sentence separator is missing in format string",
            ));
        }
        let sent_post = Self::parse_literal(&chars, &mut pos);

        Ok(Self {
            fields,
            separators,
            word_sep,
            sent_pre,
            sent_post,
        })
    }

    fn parse_literal(chars: &[char], pos: &mut usize) -> String {
        let mut out = String::new();
        while *pos < chars.len() {
            if chars[*pos] == '%' {
                if chars.get(*pos + 1) == Some(&'%') {
                    *pos += 1;
                } else {
                    break;
                }
            }
            out.push(chars[*pos]);
            *pos += 1;
        }
        out
    }
}

/// Reader over format-string input, one sentence per line.
pub struct FormatReader<R> {
    uri: String,
    rdr: R,
    format: Format,
    nlines: u64,
    buf: String,
    seen_data: bool,
}

impl<R> FormatReader<R>
where
    R: BufRead + Seek,
{
    /// Creates a new reader over `rdr` with the given parsed format.
    pub fn new<S>(uri: S, rdr: R, format: Format) -> Self
    where
        S: Into<String>,
    {
        Self {
            uri: uri.into(),
            rdr,
            format,
            nlines: 0,
            buf: String::new(),
            seen_data: false,
        }
    }
}

impl<R> Reader for FormatReader<R>
where
    R: BufRead + Seek,
{
    fn next(&mut self, sent: &mut Sentence) -> Result<bool> {
        sent.clear();
        loop {
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
            // An optional preface may precede the first sentence.
            if !self.seen_data && self.buf.starts_with('#') {
                continue;
            }
            if !self.buf.is_empty() {
                self.seen_data = true;
                break;
            }
        }

        let line = self.buf.strip_prefix(&self.format.sent_pre).unwrap_or(&self.buf);
        let mut field = String::new();
        let mut index = 0;
        for c in line.chars() {
            if c == self.format.word_sep {
                if index + 1 != self.format.fields.len() {
                    return Err(LegatoError::io_at(
                        self.uri.as_str(),
                        self.nlines,
                        "token has too few fields for the input format",
                    ));
                }
                sent.column_mut(self.format.fields[index])?.push(field.clone());
                field.clear();
                index = 0;
            } else if index < self.format.separators.len() && c == self.format.separators[index] {
                sent.column_mut(self.format.fields[index])?.push(field.clone());
                field.clear();
                index += 1;
            } else {
                field.push(c);
            }
        }
        if !field.is_empty() {
            sent.column_mut(self.format.fields[index])?.push(field);
        }
        Ok(true)
    }

    fn reset(&mut self) -> Result<()> {
        self.rdr
            .seek(SeekFrom::Start(0))
            .map_err(|_| LegatoError::io(self.uri.as_str(), "input could not be rewound"))?;
        self.nlines = 0;
        self.seen_data = false;
        Ok(())
    }
}

/// Writer emitting one sentence per line under a format string.
pub struct FormatWriter<W> {
    wtr: W,
    format: Format,
}

impl<W> FormatWriter<W>
where
    W: Write,
{
    /// Creates a new writer into `wtr` with the given parsed format.
    pub fn new(wtr: W, format: Format) -> Self {
        Self { wtr, format }
    }
}

impl<W> Writer for FormatWriter<W>
where
    W: Write,
{
    fn write_preface(&mut self, preface: &str) -> Result<()> {
        writeln!(self.wtr, "{preface}")?;
        Ok(())
    }

    fn next(&mut self, sent: &Sentence) -> Result<()> {
        if sent.is_empty() {
            return Ok(());
        }
        write!(self.wtr, "{}", self.format.sent_pre)?;
        for i in 0..sent.len() {
            for (j, &spec) in self.format.fields.iter().enumerate() {
                write!(self.wtr, "{}", sent.column(spec)?[i])?;
                if j < self.format.separators.len() {
                    write!(self.wtr, "{}", self.format.separators[j])?;
                }
            }
            if i + 1 < sent.len() {
                write!(self.wtr, "{}", self.format.word_sep)?;
            }
        }
        write!(self.wtr, "{}", self.format.sent_post)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_word_pos() {
        let format = Format::parse("%w|%p \n").unwrap();
        assert_eq!(format.fields, ['w', 'p']);
        assert_eq!(format.separators, ['|']);
        assert_eq!(format.word_sep, ' ');
        assert_eq!(format.sent_post, "\n");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Format::parse("no fields").is_err());
        assert!(Format::parse("%w").is_err());
        assert!(Format::parse("%x \n").is_err());
        assert!(Format::parse("%w|%p ").is_err());
    }

    #[test]
    fn test_read_word_pos() {
        let format = Format::parse("%w|%p \n").unwrap();
        let mut rdr = FormatReader::new("input", Cursor::new("dogs|N bark|V\n"), format);
        let mut sent = Sentence::new();
        assert!(rdr.next(&mut sent).unwrap());
        assert_eq!(sent.words, ["dogs", "bark"]);
        assert_eq!(sent.pos, ["N", "V"]);
        assert!(!rdr.next(&mut sent).unwrap());
    }

    #[test]
    fn test_read_words_only() {
        let format = Format::parse("%w \n").unwrap();
        let mut rdr = FormatReader::new("input", Cursor::new("dogs bark loudly\n"), format);
        let mut sent = Sentence::new();
        assert!(rdr.next(&mut sent).unwrap());
        assert_eq!(sent.words, ["dogs", "bark", "loudly"]);
        assert!(sent.pos.is_empty());
    }

    #[test]
    fn test_write_round_trip() {
        let mut sent = Sentence::new();
        sent.words = vec!["dogs".to_string(), "bark".to_string()];
        sent.pos = vec!["N".to_string(), "V".to_string()];

        let mut out = vec![];
        let mut wtr = FormatWriter::new(&mut out, Format::parse("%w|%p \n").unwrap());
        wtr.next(&sent).unwrap();
        assert_eq!(std::str::from_utf8(&out).unwrap(), "dogs|N bark|V\n");
    }
}
