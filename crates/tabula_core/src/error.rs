//! Error types for Tabula core.

use crate::item::CompositePrimaryKey;
use tabula_client::{ClientError, ErrorCode};
use tabula_codec::CodecError;
use thiserror::Error;

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Errors that can occur in table operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// A conditional write found the stored item in an unexpected state.
    #[error("conditional check failed for ({partition_key}, {sort_key}): {message}")]
    ConditionalCheckFailed {
        /// Partition key of the item.
        partition_key: String,
        /// Sort key of the item.
        sort_key: String,
        /// Backend message.
        message: String,
    },

    /// An insert targeted a key that already exists.
    #[error("duplicate item ({partition_key}, {sort_key}): {message}")]
    DuplicateItem {
        /// Partition key of the item.
        partition_key: String,
        /// Sort key of the item.
        sort_key: String,
        /// Backend message.
        message: String,
    },

    /// The retry budget ran out while racing other writers.
    #[error("concurrency error: {message}")]
    ConcurrencyError {
        /// Description of the exhausted operation.
        message: String,
    },

    /// The backend cancelled a transaction.
    ///
    /// `reasons` is positional: reason `i` belongs to statement `i`, and
    /// `None` means that statement was not a cause.
    #[error("transaction canceled: {}", describe_reasons(.reasons))]
    TransactionCanceled {
        /// One reason per submitted statement.
        reasons: Vec<Option<TableError>>,
    },

    /// A transaction constraint entry did not hold.
    #[error("transaction constraint failed: {}", describe_reasons(.reasons))]
    ConstraintFailure {
        /// One reason per submitted statement.
        reasons: Vec<Option<TableError>>,
    },

    /// Too many entries for one transaction.
    #[error("item collection size limit exceeded: attempted {attempted}, max {max}")]
    ItemCollectionSizeLimitExceeded {
        /// Number of entries submitted.
        attempted: usize,
        /// Maximum allowed.
        max: usize,
    },

    /// Some items of a bulk write failed.
    #[error("{} bulk write item(s) failed", .errors.len())]
    BatchFailures {
        /// One error per failed item.
        errors: Vec<TableError>,
    },

    /// A stored row type tag is not in the registered set.
    #[error("unexpected row type: {provided}")]
    UnexpectedType {
        /// The stored tag.
        provided: String,
    },

    /// A stored row type tag does not match the requested type.
    #[error("row type mismatch: expected {expected}, found {provided}")]
    TypeMismatch {
        /// The requested tag.
        expected: String,
        /// The stored tag.
        provided: String,
    },

    /// The backend returned something this layer cannot interpret.
    #[error("unexpected response: {reason}")]
    UnexpectedResponse {
        /// Description of the problem.
        reason: String,
    },

    /// Another transaction touched the same item.
    #[error("transaction conflict: {message}")]
    TransactionConflict {
        /// Backend message.
        message: String,
    },

    /// The backend failed internally.
    #[error("internal server error: {message}")]
    InternalServerError {
        /// Backend message.
        message: String,
    },

    /// A statement could not be rendered.
    #[error("invalid statement: {message}")]
    InvalidStatement {
        /// Description of the problem.
        message: String,
    },

    /// A caller-supplied provider failed.
    #[error("provider error: {source}")]
    Provider {
        /// The provider's error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Backend call error.
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Attribute codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl TableError {
    /// Creates a conditional check failure for a key.
    pub fn conditional_check_failed(
        key: &CompositePrimaryKey,
        message: impl Into<String>,
    ) -> Self {
        Self::ConditionalCheckFailed {
            partition_key: key.partition_key.clone(),
            sort_key: key.sort_key.clone(),
            message: message.into(),
        }
    }

    /// Creates a duplicate item error for a key.
    pub fn duplicate_item(key: &CompositePrimaryKey, message: impl Into<String>) -> Self {
        Self::DuplicateItem {
            partition_key: key.partition_key.clone(),
            sort_key: key.sort_key.clone(),
            message: message.into(),
        }
    }

    /// Wraps an error raised by a caller-supplied provider.
    pub fn provider(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Provider {
            source: source.into(),
        }
    }

    /// Creates an unexpected response error.
    pub fn unexpected_response(reason: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            reason: reason.into(),
        }
    }

    /// Creates an invalid statement error.
    pub fn invalid_statement(message: impl Into<String>) -> Self {
        Self::InvalidStatement {
            message: message.into(),
        }
    }

    /// Maps a per-statement backend error code to a structured error.
    ///
    /// Used for batch statement responses and transaction cancellation
    /// reasons, where the failing item is known from its position.
    pub fn from_error_code(
        code: &ErrorCode,
        message: Option<String>,
        key: &CompositePrimaryKey,
    ) -> Self {
        let message = message.unwrap_or_default();
        match code {
            ErrorCode::ConditionalCheckFailed => Self::conditional_check_failed(key, message),
            ErrorCode::DuplicateItem => Self::duplicate_item(key, message),
            ErrorCode::TransactionConflict => Self::TransactionConflict { message },
            ErrorCode::InternalServerError => Self::InternalServerError { message },
            ErrorCode::ResourceNotFound => Self::Client(ClientError::ResourceNotFound { message }),
            ErrorCode::ProvisionedThroughputExceeded => {
                Self::Client(ClientError::ProvisionedThroughputExceeded { message })
            }
            ErrorCode::ThrottlingError => Self::Client(ClientError::Throttling { message }),
            ErrorCode::RequestLimitExceeded => {
                Self::Client(ClientError::RequestLimitExceeded { message })
            }
            other => Self::Client(ClientError::Unknown {
                code: other.to_string(),
                message,
            }),
        }
    }

    /// Maps an error from a single-item backend call on `key`.
    pub(crate) fn from_client(error: ClientError, key: &CompositePrimaryKey) -> Self {
        match error {
            ClientError::ConditionalCheckFailed { message } => {
                Self::conditional_check_failed(key, message)
            }
            ClientError::DuplicateItem { message } => Self::duplicate_item(key, message),
            ClientError::TransactionConflict { message } => Self::TransactionConflict { message },
            ClientError::InternalServerError { message } => Self::InternalServerError { message },
            other => Self::Client(other),
        }
    }

    /// Returns true for a lost optimistic-concurrency race.
    pub fn is_conditional_check_failed(&self) -> bool {
        matches!(self, Self::ConditionalCheckFailed { .. })
    }

    /// Returns true if retrying with freshly read items may succeed.
    pub(crate) fn is_write_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConditionalCheckFailed { .. } | Self::DuplicateItem { .. }
        )
    }
}

fn describe_reasons(reasons: &[Option<TableError>]) -> String {
    let causes: Vec<String> = reasons
        .iter()
        .enumerate()
        .filter_map(|(position, reason)| reason.as_ref().map(|r| format!("[{position}] {r}")))
        .collect();
    if causes.is_empty() {
        "no reasons given".to_string()
    } else {
        causes.join("; ")
    }
}
