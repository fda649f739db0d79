//! Definition of errors.

use std::error::Error;
use std::fmt;

/// A specialized Result type for Legato.
pub type Result<T, E = LegatoError> = std::result::Result<T, E>;

/// The error type for Legato.
#[derive(Debug)]
pub enum LegatoError {
    /// The error variant for [`ConfigError`].
    Config(ConfigError),

    /// The error variant for [`IoError`].
    Io(IoError),

    /// The error variant for [`InvalidValueError`].
    InvalidValue(InvalidValueError),

    /// The error variant for [`InternalError`].
    Internal(InternalError),

    /// The error variant for [`std::io::Error`].
    StdIo(std::io::Error),
}

impl LegatoError {
    /// Creates a configuration error for the named option.
    pub fn config<S>(name: &'static str, value: Option<String>, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Config(ConfigError {
            name,
            value,
            msg: msg.into(),
        })
    }

    /// Creates an I/O error carrying the location of the file.
    pub fn io<S, U>(uri: U, msg: S) -> Self
    where
        S: Into<String>,
        U: Into<String>,
    {
        Self::Io(IoError {
            uri: uri.into(),
            line: None,
            msg: msg.into(),
        })
    }

    pub(crate) fn io_at<S, U>(uri: U, line: u64, msg: S) -> Self
    where
        S: Into<String>,
        U: Into<String>,
    {
        Self::Io(IoError {
            uri: uri.into(),
            line: Some(line),
            msg: msg.into(),
        })
    }

    pub(crate) fn invalid_value<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidValue(InvalidValueError { msg: msg.into() })
    }

    pub(crate) fn internal<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Internal(InternalError { msg: msg.into() })
    }
}

impl fmt::Display for LegatoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Config(e) => e.fmt(f),
            Self::Io(e) => e.fmt(f),
            Self::InvalidValue(e) => e.fmt(f),
            Self::Internal(e) => e.fmt(f),
            Self::StdIo(e) => e.fmt(f),
        }
    }
}

impl Error for LegatoError {}

/// Error used when an option is unknown, malformed, or missing.
#[derive(Debug)]
pub struct ConfigError {
    /// Name of the option.
    pub(crate) name: &'static str,

    /// Offending value, when one was supplied.
    pub(crate) value: Option<String>,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConfigError: {}: {}", self.name, self.msg)?;
        if let Some(value) = self.value.as_ref() {
            write!(f, ", {value}")?;
        }
        Ok(())
    }
}

impl Error for ConfigError {}

/// Error used when a file cannot be opened or a line of it cannot be parsed.
#[derive(Debug)]
pub struct IoError {
    /// Location of the file.
    pub(crate) uri: String,

    /// 1-based line counter, including preface lines.
    pub(crate) line: Option<u64>,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "IoError: {}: {}", self.uri, self.msg)?;
        if let Some(line) = self.line {
            write!(f, " (line {line})")?;
        }
        Ok(())
    }
}

impl Error for IoError {}

/// Error used when an input is internally inconsistent, such as a format
/// string without a separator.
#[derive(Debug)]
pub struct InvalidValueError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidValueError: {}", self.msg)
    }
}

impl Error for InvalidValueError {}

/// Error used when an invariant of the model is violated; these are fatal.
#[derive(Debug)]
pub struct InternalError {
    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InternalError: {}", self.msg)
    }
}

impl Error for InternalError {}

impl From<std::io::Error> for LegatoError {
    fn from(error: std::io::Error) -> Self {
        Self::StdIo(error)
    }
}
