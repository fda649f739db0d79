//! Sentence readers and writers.

pub mod conll;
pub mod format;

use std::io::{BufRead, Write};

use crate::errors::{LegatoError, Result};
use crate::sentence::Sentence;

/// A source of sentences that can be rewound for multi-pass training.
pub trait Reader {
    /// Fills `sent` with the next sentence, returning `false` at end of
    /// input. `sent` is cleared first.
    fn next(&mut self, sent: &mut Sentence) -> Result<bool>;

    /// Rewinds the source to its beginning.
    fn reset(&mut self) -> Result<()>;
}

/// A sink of tagged sentences.
pub trait Writer {
    /// Writes the preface once, at the top of the output.
    fn write_preface(&mut self, preface: &str) -> Result<()>;

    /// Writes one tagged sentence.
    fn next(&mut self, sent: &Sentence) -> Result<()>;
}

/// Builds the preface block recorded at the top of model files and tagged
/// output: each line is prefixed with `# `.
pub fn create_preface(name: &str, args: &[String]) -> String {
    let mut preface = String::from("# ");
    preface.push_str(name);
    for arg in args {
        preface.push(' ');
        preface.push_str(arg);
    }
    preface
}

/// Consumes the preface block at the top of `rdr`: every leading line
/// starting with `#`. Returns the preface without trailing newline and
/// advances `nlines` past it.
pub(crate) fn read_preface<R>(uri: &str, rdr: &mut R, nlines: &mut u64) -> Result<String>
where
    R: BufRead,
{
    let mut preface = String::new();
    loop {
        let buf = rdr
            .fill_buf()
            .map_err(|e| LegatoError::io(uri, e.to_string()))?;
        if buf.first() != Some(&b'#') {
            break;
        }
        let mut line = String::new();
        rdr.read_line(&mut line)
            .map_err(|e| LegatoError::io(uri, e.to_string()))?;
        *nlines += 1;
        if !preface.is_empty() {
            preface.push('\n');
        }
        preface.push_str(line.trim_end_matches(&['\n', '\r'][..]));
    }
    Ok(preface)
}

/// Reads one data line into `buf`, returning `false` at end of input.
///
/// Every data line of a model file must end with a newline; a line truncated
/// at end of file is an error.
pub(crate) fn read_data_line<R>(
    uri: &str,
    rdr: &mut R,
    nlines: &mut u64,
    buf: &mut String,
) -> Result<bool>
where
    R: BufRead,
{
    buf.clear();
    let num_bytes = rdr
        .read_line(buf)
        .map_err(|e| LegatoError::io(uri, e.to_string()))?;
    if num_bytes == 0 {
        return Ok(false);
    }
    *nlines += 1;
    if !buf.ends_with('\n') {
        return Err(LegatoError::io_at(
            uri,
            *nlines,
            "expected newline at end of line",
        ));
    }
    buf.pop();
    if buf.ends_with('\r') {
        buf.pop();
    }
    Ok(true)
}

/// Writes the preface followed by a newline.
pub(crate) fn write_preface<W>(wtr: &mut W, preface: &str) -> Result<()>
where
    W: Write,
{
    writeln!(wtr, "{preface}")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_preface() {
        let data = b"# train --input x\n# second line\ndogs 3\n";
        let mut rdr = &data[..];
        let mut nlines = 0;
        let preface = read_preface("test", &mut rdr, &mut nlines).unwrap();
        assert_eq!(preface, "# train --input x\n# second line");
        assert_eq!(nlines, 2);

        let mut buf = String::new();
        assert!(read_data_line("test", &mut rdr, &mut nlines, &mut buf).unwrap());
        assert_eq!(buf, "dogs 3");
        assert_eq!(nlines, 3);
    }

    #[test]
    fn test_missing_trailing_newline() {
        let data = b"dogs 3";
        let mut rdr = &data[..];
        let mut nlines = 0;
        let mut buf = String::new();
        let e = read_data_line("test", &mut rdr, &mut nlines, &mut buf);
        assert!(e.is_err());
    }

    #[test]
    fn test_create_preface() {
        let args = vec!["--input".to_string(), "corpus".to_string()];
        assert_eq!(create_preface("train", &args), "# train --input corpus");
    }
}
