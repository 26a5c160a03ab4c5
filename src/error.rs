//! Definition of errors reported by streams and devices.

use std::{borrow::Cow, io};
use thiserror::Error;

/// Different kinds of errors that can happen during stream operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    #[error("invalid input")]
    InvalidInput,

    #[error("invalid operation")]
    InvalidOperation,

    #[error("end of file")]
    EndOfFile,

    #[error("unknown I/O error")]
    UnknownIoError,

    #[error("out of range")]
    OutOfRange,

    #[error("out of memory")]
    OutOfMemory,

    #[error("unimplemented")]
    Unimplemented,

    #[error("unreachable")]
    Unreachable,

    #[error("sentry error")]
    SentryError,
}

/// An error with an optional description of what went wrong.
///
/// Errors that came from the operating system remember the original
/// [`io::ErrorKind`], which is how interrupted operations are recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}{}", suffix(.description))]
pub struct Error {
    kind: ErrorKind,
    description: Option<Cow<'static, str>>,
    os: Option<io::ErrorKind>,
}

impl Error {
    /// Create an error without description.
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            description: None,
            os: None,
        }
    }

    /// Create an error with description.
    ///
    /// # Arguments
    ///
    /// * `kind` - Kind of error.
    /// * `description` - Human readable description.
    pub fn with_description(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: Some(description.into()),
            os: None,
        }
    }

    /// Kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Kind of operating system error this error originated from, if any.
    pub fn os_kind(&self) -> Option<io::ErrorKind> {
        self.os
    }

    /// true if operation was interrupted before any progress and can be retried.
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.os == Some(io::ErrorKind::Interrupted)
    }

    /// true if this error signals end of input.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.kind == ErrorKind::EndOfFile
    }
}

fn suffix(description: &Option<Cow<'static, str>>) -> String {
    match description {
        Some(description) => format!(": {description}"),
        None => String::new(),
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Self {
        let os = error.kind();
        let kind = match os {
            io::ErrorKind::UnexpectedEof => ErrorKind::EndOfFile,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => ErrorKind::InvalidInput,
            io::ErrorKind::OutOfMemory => ErrorKind::OutOfMemory,
            io::ErrorKind::Unsupported => ErrorKind::Unimplemented,
            _ => ErrorKind::UnknownIoError,
        };

        Self {
            kind,
            description: Some(error.to_string().into()),
            os: Some(os),
        }
    }
}

impl From<Error> for io::Error {
    fn from(error: Error) -> Self {
        let kind = error.os.unwrap_or(match error.kind {
            ErrorKind::InvalidInput => io::ErrorKind::InvalidInput,
            ErrorKind::EndOfFile => io::ErrorKind::UnexpectedEof,
            ErrorKind::OutOfMemory => io::ErrorKind::OutOfMemory,
            ErrorKind::Unimplemented => io::ErrorKind::Unsupported,
            _ => io::ErrorKind::Other,
        });

        io::Error::new(kind, error)
    }
}
