//! Codec Error Types

use thiserror::Error;

/// Errors raised while encoding or decoding row-change tuples.
#[derive(Error, Debug)]
pub enum CodecError {
    /// A length prefix or field payload would run past the end of the buffer,
    /// or a field carries an unknown type tag.
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// A variable-length integer needs more than three bytes, or a value is
    /// too large to encode in three bytes.
    #[error("Invalid varint: {0}")]
    Varint(String),

    /// A field was requested as a type it does not carry.
    #[error("Invalid data type request: expected {expected}, found tag {found}")]
    TypeMismatch { expected: &'static str, found: u8 },
}

impl CodecError {
    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation(msg.into())
    }

    pub fn varint(msg: impl Into<String>) -> Self {
        Self::Varint(msg.into())
    }
}
