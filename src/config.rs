//! Definition of stream configuration.

use crate::{BufferMode, DEFAULT_BUFFER_SIZE, DEFAULT_RETRY_ATTEMPTS, Error, ErrorKind};
use std::{fmt, str::FromStr};

/// Character encoding of text written to a stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
    Utf32Le,
    Utf32Be,
}

impl Encoding {
    /// Append text in this encoding to a vector.
    ///
    /// # Arguments
    ///
    /// * `text` - Text to encode.
    /// * `out` - Vector to append encoded bytes to.
    pub fn encode(self, text: &str, out: &mut Vec<u8>) {
        match self {
            Self::Utf8 => out.extend_from_slice(text.as_bytes()),
            Self::Utf16Le => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
            Self::Utf16Be => {
                for unit in text.encode_utf16() {
                    out.extend_from_slice(&unit.to_be_bytes());
                }
            }
            Self::Utf32Le => {
                for c in text.chars() {
                    out.extend_from_slice(&u32::from(c).to_le_bytes());
                }
            }
            Self::Utf32Be => {
                for c in text.chars() {
                    out.extend_from_slice(&u32::from(c).to_be_bytes());
                }
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Utf8 => "utf-8",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Utf32Le => "utf-32le",
            Self::Utf32Be => "utf-32be",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "utf-8" | "utf8" => Ok(Self::Utf8),
            "utf-16le" | "utf16le" => Ok(Self::Utf16Le),
            "utf-16be" | "utf16be" => Ok(Self::Utf16Be),
            "utf-32le" | "utf32le" => Ok(Self::Utf32Le),
            "utf-32be" | "utf32be" => Ok(Self::Utf32Be),
            _ => Err(Error::with_description(
                ErrorKind::InvalidInput,
                format!("unknown encoding {value:?}"),
            )),
        }
    }
}

/// Configuration of a [`crate::Stream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// When staged output is pushed to the device.
    pub write_mode: BufferMode,

    /// Size of write staging buffer in bytes.
    pub write_capacity: usize,

    /// Size of read staging buffer in bytes, 0 disables read ahead.
    pub read_capacity: usize,

    /// Number of retries for interrupted or stalled device operations.
    pub retry_attempts: usize,

    /// Encoding of text written with `write_str` and `write!`.
    pub encoding: Encoding,
}

impl StreamConfig {
    /// Configuration with every buffer disabled.
    pub fn unbuffered() -> Self {
        Self::default()
            .with_write_mode(BufferMode::None)
            .with_read_capacity(0)
    }

    pub fn with_write_mode(mut self, mode: BufferMode) -> Self {
        self.write_mode = mode;
        self
    }

    pub fn with_write_capacity(mut self, capacity: usize) -> Self {
        self.write_capacity = capacity;
        self
    }

    pub fn with_read_capacity(mut self, capacity: usize) -> Self {
        self.read_capacity = capacity;
        self
    }

    pub fn with_retry_attempts(mut self, attempts: usize) -> Self {
        self.retry_attempts = attempts;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            write_mode: BufferMode::Full,
            write_capacity: DEFAULT_BUFFER_SIZE,
            read_capacity: DEFAULT_BUFFER_SIZE,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            encoding: Encoding::Utf8,
        }
    }
}
