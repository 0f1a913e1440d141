//! Error types for htsprobe payload decoding

use thiserror::Error;

use crate::types::Format;

/// Result type alias for payload decoding
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// A payload did not parse as the binary container its ticket declared.
///
/// Decode errors never carry a partial summary: either the whole payload is
/// walked successfully or the caller gets one of these.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed alignment container ({format}): {source}")]
    MalformedAlignment {
        format: Format,
        #[source]
        source: ContainerError,
    },

    #[error("malformed variant container ({format}): {source}")]
    MalformedVariant {
        format: Format,
        #[source]
        source: ContainerError,
    },
}

impl DecodeError {
    /// The format the payload claimed to be
    pub fn format(&self) -> &Format {
        match self {
            DecodeError::MalformedAlignment { format, .. } => format,
            DecodeError::MalformedVariant { format, .. } => format,
        }
    }
}

/// Low-level reasons a container failed to parse
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("unexpected end of data at offset {offset} (needed {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("bad magic: expected {expected}")]
    BadMagic { expected: &'static str },

    #[error("BGZF inflate failed: {0}")]
    Inflate(#[from] std::io::Error),

    #[error("checksum mismatch in {what}")]
    Checksum { what: &'static str },

    #[error("{0}")]
    Invalid(String),
}
