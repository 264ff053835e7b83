//! Table configuration.

/// Configuration for a [`crate::CompositePrimaryKeyTable`].
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Name of the backing table.
    pub table_name: String,
    /// Double embedded single quotes when rendering string literals.
    pub escape_single_quote_in_partiql: bool,
    /// Use strongly consistent reads.
    pub consistent_read: bool,
    /// Retry bound for optimistic-concurrency conflicts.
    pub retry: RetryConfig,
    /// Most entries (writes plus constraints) in one transaction.
    pub max_transaction_size: usize,
    /// Most statements in one batch statement call.
    pub batch_chunk_size: usize,
    /// Most keys in one batch get call.
    pub batch_get_chunk_size: usize,
    /// Longest statement text the backend accepts, in characters.
    pub max_statement_length: usize,
}

impl TableConfig {
    /// Creates a configuration for a table with default limits.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            escape_single_quote_in_partiql: false,
            consistent_read: true,
            retry: RetryConfig::default(),
            max_transaction_size: 100,
            batch_chunk_size: 25,
            batch_get_chunk_size: 100,
            max_statement_length: 8192,
        }
    }

    /// Sets whether single quotes in string literals are escaped.
    pub fn with_escape_single_quote(mut self, escape: bool) -> Self {
        self.escape_single_quote_in_partiql = escape;
        self
    }

    /// Sets whether reads are strongly consistent.
    pub fn with_consistent_read(mut self, consistent: bool) -> Self {
        self.consistent_read = consistent;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the maximum transaction size.
    pub fn with_max_transaction_size(mut self, size: usize) -> Self {
        self.max_transaction_size = size;
        self
    }

    /// Sets the batch statement chunk size.
    pub fn with_batch_chunk_size(mut self, size: usize) -> Self {
        self.batch_chunk_size = size.max(1);
        self
    }

    /// Sets the batch get chunk size.
    pub fn with_batch_get_chunk_size(mut self, size: usize) -> Self {
        self.batch_get_chunk_size = size.max(1);
        self
    }

    /// Sets the longest statement sent through a batch call.
    pub fn with_max_statement_length(mut self, length: usize) -> Self {
        self.max_statement_length = length;
        self
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new("")
    }
}

/// Configuration for conflict retries.
///
/// Retries are immediate; there is no backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Creates a configuration with a single attempt.
    pub fn no_retry() -> Self {
        Self::new(1)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TableConfig::new("orders");
        assert_eq!(config.table_name, "orders");
        assert!(!config.escape_single_quote_in_partiql);
        assert!(config.consistent_read);
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.max_transaction_size, 100);
        assert_eq!(config.batch_chunk_size, 25);
        assert_eq!(config.batch_get_chunk_size, 100);
        assert_eq!(config.max_statement_length, 8192);
    }

    #[test]
    fn builder() {
        let config = TableConfig::new("orders")
            .with_escape_single_quote(true)
            .with_retry(RetryConfig::new(3))
            .with_batch_chunk_size(0);
        assert!(config.escape_single_quote_in_partiql);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.batch_chunk_size, 1);
    }

    #[test]
    fn no_retry_is_one_attempt() {
        assert_eq!(RetryConfig::no_retry().max_attempts, 1);
        assert_eq!(RetryConfig::new(0).max_attempts, 1);
    }
}
