//! The `info` settings file of a model directory.

use std::io::{BufRead, Write};

use crate::errors::{LegatoError, Result};
use crate::io;

/// Model-wide settings persisted as `key = value` lines.
#[derive(Default, Clone, Copy, Debug)]
pub struct ModelInfo {
    /// Number of entries in the attribute index.
    pub nattributes: u64,
    /// Number of active features, which is also the weight-vector length.
    pub nfeatures: u64,
    /// Length of the longest training sentence; sizes the reusable buffers.
    pub max_size: u64,
}

impl ModelInfo {
    /// Writes the settings under the preface.
    pub fn write<W>(&self, wtr: &mut W, preface: &str) -> Result<()>
    where
        W: Write,
    {
        io::write_preface(wtr, preface)?;
        writeln!(wtr, "nattributes = {}", self.nattributes)?;
        writeln!(wtr, "nfeatures = {}", self.nfeatures)?;
        writeln!(wtr, "max_size = {}", self.max_size)?;
        Ok(())
    }

    /// Reads settings written by [`ModelInfo::write`].
    ///
    /// # Errors
    ///
    /// [`LegatoError::Io`] is returned on an unknown key or a malformed
    /// line, with the 1-based line number.
    pub fn read<R>(uri: &str, rdr: &mut R) -> Result<Self>
    where
        R: BufRead,
    {
        let mut info = Self::default();
        let mut seen = [false; 3];
        let mut nlines = 0;
        io::read_preface(uri, rdr, &mut nlines)?;

        let mut buf = String::new();
        while io::read_data_line(uri, rdr, &mut nlines, &mut buf)? {
            let (key, value) = buf
                .split_once('=')
                .ok_or_else(|| LegatoError::io_at(uri, nlines, "expected `key = value`"))?;
            let value = value.trim().parse::<u64>().map_err(|_| {
                LegatoError::io_at(uri, nlines, "could not parse setting value")
            })?;
            match key.trim() {
                "nattributes" => {
                    info.nattributes = value;
                    seen[0] = true;
                }
                "nfeatures" => {
                    info.nfeatures = value;
                    seen[1] = true;
                }
                "max_size" => {
                    info.max_size = value;
                    seen[2] = true;
                }
                key => {
                    return Err(LegatoError::io_at(
                        uri,
                        nlines,
                        format!("unknown setting {key}"),
                    ))
                }
            }
        }

        if seen != [true; 3] {
            return Err(LegatoError::io(uri, "missing settings in info file"));
        }
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let info = ModelInfo {
            nattributes: 12,
            nfeatures: 34,
            max_size: 56,
        };
        let mut data = vec![];
        info.write(&mut data, "# test").unwrap();

        let reloaded = ModelInfo::read("info", &mut data.as_slice()).unwrap();
        assert_eq!(reloaded.nattributes, 12);
        assert_eq!(reloaded.nfeatures, 34);
        assert_eq!(reloaded.max_size, 56);
    }

    #[test]
    fn test_unknown_key() {
        let data = b"# test\nnthreads = 4\n";
        assert!(ModelInfo::read("info", &mut &data[..]).is_err());
    }

    #[test]
    fn test_missing_key() {
        let data = b"# test\nnattributes = 1\nnfeatures = 2\n";
        assert!(ModelInfo::read("info", &mut &data[..]).is_err());
    }
}
