//! Request and response types for backend calls.

use crate::error::ErrorCode;
use tabula_codec::{AttributeValue, Attributes};

/// A condition a single-item write must satisfy against the stored item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The named attribute is present.
    AttributeExists(String),
    /// The named attribute is absent (or the item does not exist).
    AttributeNotExists(String),
    /// The named attribute is present and equal to the value.
    Equals(String, AttributeValue),
    /// Every inner condition holds.
    And(Vec<Condition>),
}

impl Condition {
    /// Evaluates this condition against the stored item, if any.
    pub fn evaluate(&self, item: Option<&Attributes>) -> bool {
        match self {
            Condition::AttributeExists(name) => item.is_some_and(|i| i.contains_key(name)),
            Condition::AttributeNotExists(name) => !item.is_some_and(|i| i.contains_key(name)),
            Condition::Equals(name, expected) => item
                .and_then(|i| i.get(name))
                .is_some_and(|actual| values_equal(actual, expected)),
            Condition::And(conditions) => conditions.iter().all(|c| c.evaluate(item)),
        }
    }

    /// Renders this condition as a condition expression, for logging.
    pub fn to_expression(&self) -> String {
        match self {
            Condition::AttributeExists(name) => format!("attribute_exists({name})"),
            Condition::AttributeNotExists(name) => format!("attribute_not_exists({name})"),
            Condition::Equals(name, value) => format!("{name} = {value:?}"),
            Condition::And(conditions) => conditions
                .iter()
                .map(Condition::to_expression)
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }
}

/// Compares two attribute values, treating numbers numerically.
pub(crate) fn values_equal(left: &AttributeValue, right: &AttributeValue) -> bool {
    match (left, right) {
        (AttributeValue::N(a), AttributeValue::N(b)) => {
            a == b
                || matches!(
                    (a.parse::<f64>(), b.parse::<f64>()),
                    (Ok(x), Ok(y)) if x == y
                )
        }
        _ => left == right,
    }
}

/// Condition on the sort key of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyCondition {
    /// Sort key equals the value.
    Equals(String),
    /// Sort key is less than the value.
    LessThan(String),
    /// Sort key is less than or equal to the value.
    LessThanOrEqual(String),
    /// Sort key is greater than the value.
    GreaterThan(String),
    /// Sort key is greater than or equal to the value.
    GreaterThanOrEqual(String),
    /// Sort key is within the inclusive range.
    Between(String, String),
    /// Sort key starts with the prefix.
    BeginsWith(String),
}

impl SortKeyCondition {
    /// Returns true if `sort_key` satisfies this condition.
    pub fn matches(&self, sort_key: &str) -> bool {
        match self {
            SortKeyCondition::Equals(v) => sort_key == v,
            SortKeyCondition::LessThan(v) => sort_key < v.as_str(),
            SortKeyCondition::LessThanOrEqual(v) => sort_key <= v.as_str(),
            SortKeyCondition::GreaterThan(v) => sort_key > v.as_str(),
            SortKeyCondition::GreaterThanOrEqual(v) => sort_key >= v.as_str(),
            SortKeyCondition::Between(low, high) => {
                sort_key >= low.as_str() && sort_key <= high.as_str()
            }
            SortKeyCondition::BeginsWith(prefix) => sort_key.starts_with(prefix.as_str()),
        }
    }
}

/// Writes a whole item, optionally conditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutItemRequest {
    /// Target table.
    pub table_name: String,
    /// The full item, including key attributes.
    pub item: Attributes,
    /// Condition the stored item must satisfy.
    pub condition: Option<Condition>,
}

/// Reads one item by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetItemRequest {
    /// Target table.
    pub table_name: String,
    /// Key attributes.
    pub key: Attributes,
    /// Whether to use a strongly consistent read.
    pub consistent_read: bool,
}

/// Result of a [`GetItemRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetItemOutput {
    /// The item, if it exists.
    pub item: Option<Attributes>,
}

/// Deletes one item by key, optionally conditionally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteItemRequest {
    /// Target table.
    pub table_name: String,
    /// Key attributes.
    pub key: Attributes,
    /// Condition the stored item must satisfy.
    pub condition: Option<Condition>,
}

/// Reads the items of one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Target table.
    pub table_name: String,
    /// Partition key value to read.
    pub partition_key: String,
    /// Optional sort key condition.
    pub sort_key_condition: Option<SortKeyCondition>,
    /// Ascending sort key order when true.
    pub scan_index_forward: bool,
    /// Maximum number of items to return.
    pub limit: Option<usize>,
    /// Continue after this key.
    pub exclusive_start_key: Option<Attributes>,
    /// Whether to use a strongly consistent read.
    pub consistent_read: bool,
}

/// Result of a [`QueryRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    /// Matching items in sort key order.
    pub items: Vec<Attributes>,
    /// Key to continue from, if more items remain.
    pub last_evaluated_key: Option<Attributes>,
}

/// Reads many items by key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchGetItemRequest {
    /// Target table.
    pub table_name: String,
    /// Key attributes of each item.
    pub keys: Vec<Attributes>,
    /// Whether to use strongly consistent reads.
    pub consistent_read: bool,
}

/// Result of a [`BatchGetItemRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchGetItemOutput {
    /// Items that exist, in no particular order.
    pub items: Vec<Attributes>,
    /// Keys the backend did not get to; the caller should re-request them.
    pub unprocessed_keys: Vec<Attributes>,
}

/// One statement of a batch statement call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatementRequest {
    /// Statement text.
    pub statement: String,
    /// Whether reads are strongly consistent.
    pub consistent_read: bool,
}

impl BatchStatementRequest {
    /// Creates a request for a statement.
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            consistent_read: true,
        }
    }
}

/// Per-statement error in a batch statement response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatementError {
    /// Backend error code.
    pub code: ErrorCode,
    /// Backend message, if any.
    pub message: Option<String>,
}

/// Per-statement response of a batch statement call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStatementResponse {
    /// Set when this statement failed.
    pub error: Option<BatchStatementError>,
    /// Item read by a select statement.
    pub item: Option<Attributes>,
}

/// Executes one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteStatementRequest {
    /// Statement text.
    pub statement: String,
    /// Whether reads are strongly consistent.
    pub consistent_read: bool,
    /// Continuation token from a previous page.
    pub next_token: Option<String>,
    /// Maximum number of items to return.
    pub limit: Option<usize>,
}

impl ExecuteStatementRequest {
    /// Creates a request for a statement.
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            consistent_read: true,
            next_token: None,
            limit: None,
        }
    }
}

/// Result of an [`ExecuteStatementRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteStatementOutput {
    /// Items read by a select statement.
    pub items: Vec<Attributes>,
    /// Token for the next page, if more items remain.
    pub next_token: Option<String>,
}

/// Executes statements as one atomic transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteTransactionRequest {
    /// Statements in submission order.
    pub statements: Vec<String>,
    /// Idempotency token.
    pub client_request_token: Option<String>,
}
