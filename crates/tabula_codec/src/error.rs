//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding, decoding or path navigation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value into an attribute tree.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode an attribute tree into a value.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// A top-level item must encode to a map.
    #[error("expected a map at the top level, found {found}")]
    NotAMap {
        /// Kind of value that was produced instead.
        found: &'static str,
    },

    /// A number attribute could not be parsed.
    #[error("invalid number: {value}")]
    InvalidNumber {
        /// The offending number text.
        value: String,
    },

    /// A path did not resolve to a container that can hold the target.
    #[error("path not found: {path}")]
    PathNotFound {
        /// Rendered path.
        path: String,
    },

    /// A path segment addressed the wrong kind of container.
    #[error("path {path} does not address a {expected}")]
    PathTypeMismatch {
        /// Rendered path.
        path: String,
        /// Container kind the segment required.
        expected: &'static str,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create a path not found error.
    pub fn path_not_found(path: impl ToString) -> Self {
        Self::PathNotFound {
            path: path.to_string(),
        }
    }
}
