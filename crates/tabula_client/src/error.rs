//! Error types for backend calls.

use std::fmt;
use tabula_codec::Attributes;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error codes reported by the backend for individual statements.
///
/// These appear in batch statement responses and transaction cancellation
/// reasons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// A condition in the statement did not hold.
    ConditionalCheckFailed,
    /// An insert targeted a key that already exists.
    DuplicateItem,
    /// The item collection grew past its size limit.
    ItemCollectionSizeLimitExceeded,
    /// Another transaction is operating on the same item.
    TransactionConflict,
    /// Provisioned throughput was exceeded.
    ProvisionedThroughputExceeded,
    /// The request was throttled.
    ThrottlingError,
    /// The account request limit was exceeded.
    RequestLimitExceeded,
    /// The backend failed internally.
    InternalServerError,
    /// The table does not exist.
    ResourceNotFound,
    /// The caller is not authorized.
    AccessDenied,
    /// The statement was rejected as invalid.
    ValidationError,
    /// Any other code, kept verbatim.
    Other(String),
}

impl ErrorCode {
    /// Parses a backend error code.
    ///
    /// Both the short form (`ConditionalCheckFailed`) and the exception form
    /// (`ConditionalCheckFailedException`) are accepted.
    pub fn from_code(code: &str) -> Self {
        let short = code.strip_suffix("Exception").unwrap_or(code);
        match short {
            "ConditionalCheckFailed" => Self::ConditionalCheckFailed,
            "DuplicateItem" => Self::DuplicateItem,
            "ItemCollectionSizeLimitExceeded" => Self::ItemCollectionSizeLimitExceeded,
            "TransactionConflict" => Self::TransactionConflict,
            "ProvisionedThroughputExceeded" => Self::ProvisionedThroughputExceeded,
            "ThrottlingError" | "Throttling" => Self::ThrottlingError,
            "RequestLimitExceeded" => Self::RequestLimitExceeded,
            "InternalServerError" => Self::InternalServerError,
            "ResourceNotFound" => Self::ResourceNotFound,
            "AccessDenied" => Self::AccessDenied,
            "ValidationError" | "Validation" => Self::ValidationError,
            _ => Self::Other(code.to_string()),
        }
    }

    /// Returns the short code string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ConditionalCheckFailed => "ConditionalCheckFailed",
            Self::DuplicateItem => "DuplicateItem",
            Self::ItemCollectionSizeLimitExceeded => "ItemCollectionSizeLimitExceeded",
            Self::TransactionConflict => "TransactionConflict",
            Self::ProvisionedThroughputExceeded => "ProvisionedThroughputExceeded",
            Self::ThrottlingError => "ThrottlingError",
            Self::RequestLimitExceeded => "RequestLimitExceeded",
            Self::InternalServerError => "InternalServerError",
            Self::ResourceNotFound => "ResourceNotFound",
            Self::AccessDenied => "AccessDenied",
            Self::ValidationError => "ValidationError",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one statement of a cancelled transaction failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationReason {
    /// Backend error code.
    pub code: ErrorCode,
    /// Backend message, if any.
    pub message: Option<String>,
    /// The item as stored when the statement failed, if returned.
    pub item: Option<Attributes>,
}

impl CancellationReason {
    /// Creates a reason with a code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            item: None,
        }
    }
}

/// Errors surfaced by a [`crate::TableClient`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// A conditional put/delete/statement failed its condition.
    #[error("conditional check failed: {message}")]
    ConditionalCheckFailed {
        /// Backend message.
        message: String,
    },

    /// An insert statement targeted an existing key.
    #[error("duplicate item: {message}")]
    DuplicateItem {
        /// Backend message.
        message: String,
    },

    /// The backend failed internally.
    #[error("internal server error: {message}")]
    InternalServerError {
        /// Backend message.
        message: String,
    },

    /// Provisioned throughput was exceeded.
    #[error("provisioned throughput exceeded: {message}")]
    ProvisionedThroughputExceeded {
        /// Backend message.
        message: String,
    },

    /// The account request limit was exceeded.
    #[error("request limit exceeded: {message}")]
    RequestLimitExceeded {
        /// Backend message.
        message: String,
    },

    /// The table does not exist.
    #[error("resource not found: {message}")]
    ResourceNotFound {
        /// Backend message.
        message: String,
    },

    /// The request was throttled.
    #[error("throttled: {message}")]
    Throttling {
        /// Backend message.
        message: String,
    },

    /// Another transaction is operating on the same item.
    #[error("transaction conflict: {message}")]
    TransactionConflict {
        /// Backend message.
        message: String,
    },

    /// A transaction was cancelled; one reason per submitted statement.
    #[error("transaction canceled ({} reasons)", .reasons.len())]
    TransactionCanceled {
        /// Positional reasons; `None` means that statement was not a cause.
        reasons: Vec<Option<CancellationReason>>,
    },

    /// Any other backend error.
    #[error("{code}: {message}")]
    Unknown {
        /// Backend error code.
        code: String,
        /// Backend message.
        message: String,
    },
}

impl ClientError {
    /// Creates a conditional check failed error.
    pub fn conditional_check_failed(message: impl Into<String>) -> Self {
        Self::ConditionalCheckFailed {
            message: message.into(),
        }
    }

    /// Creates a resource not found error.
    pub fn resource_not_found(message: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            message: message.into(),
        }
    }

    /// Creates a validation error, reported as an unknown backend error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Unknown {
            code: "ValidationException".into(),
            message: message.into(),
        }
    }

    /// Returns true if a transport layer could retry this error.
    ///
    /// The write engine never retries these itself.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::InternalServerError { .. }
                | ClientError::ProvisionedThroughputExceeded { .. }
                | ClientError::RequestLimitExceeded { .. }
                | ClientError::Throttling { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_codes() {
        assert_eq!(
            ErrorCode::from_code("ConditionalCheckFailed"),
            ErrorCode::ConditionalCheckFailed
        );
        assert_eq!(
            ErrorCode::from_code("DuplicateItemException"),
            ErrorCode::DuplicateItem
        );
        assert_eq!(
            ErrorCode::from_code("Mystery"),
            ErrorCode::Other("Mystery".into())
        );
        assert_eq!(ErrorCode::TransactionConflict.as_str(), "TransactionConflict");
    }

    #[test]
    fn retryable_errors() {
        assert!(ClientError::Throttling {
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!ClientError::conditional_check_failed("stale").is_retryable());
        assert!(!ClientError::validation("bad statement").is_retryable());
    }

    #[test]
    fn error_display() {
        let err = ClientError::TransactionCanceled {
            reasons: vec![None, None],
        };
        assert_eq!(err.to_string(), "transaction canceled (2 reasons)");
        let err = ClientError::validation("too long");
        assert_eq!(err.to_string(), "ValidationException: too long");
    }
}
