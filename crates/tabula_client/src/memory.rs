//! In-memory reference backend.

use crate::client::TableClient;
use crate::error::{CancellationReason, ClientError, ClientResult, ErrorCode};
use crate::statement::{parse_statement, Statement, Term};
use crate::types::{
    BatchGetItemOutput, BatchGetItemRequest, BatchStatementError, BatchStatementRequest,
    BatchStatementResponse, DeleteItemRequest, ExecuteStatementOutput,
    ExecuteStatementRequest, ExecuteTransactionRequest, GetItemOutput, GetItemRequest,
    PutItemRequest, QueryOutput, QueryRequest,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use tabula_codec::{AttributeValue, Attributes};
use tracing::debug;

type Table = BTreeMap<(String, String), Attributes>;

/// Limits and key schema of an [`InMemoryClient`].
#[derive(Debug, Clone)]
pub struct InMemoryClientConfig {
    /// Name of the partition key attribute.
    pub partition_key_name: String,
    /// Name of the sort key attribute.
    pub sort_key_name: String,
    /// Longest statement text accepted, in characters.
    pub max_statement_length: usize,
    /// Most statements accepted in one transaction.
    pub max_transaction_size: usize,
    /// Most statements accepted in one batch statement call.
    pub max_batch_statements: usize,
    /// Most keys accepted in one batch get call.
    pub max_batch_get_keys: usize,
    /// Items per page of an `execute_statement` select.
    pub page_size: usize,
}

impl InMemoryClientConfig {
    /// Sets the longest statement text accepted.
    pub fn with_max_statement_length(mut self, length: usize) -> Self {
        self.max_statement_length = length;
        self
    }

    /// Sets the most statements accepted in one batch statement call.
    pub fn with_max_batch_statements(mut self, count: usize) -> Self {
        self.max_batch_statements = count;
        self
    }

    /// Sets the number of items per select page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl Default for InMemoryClientConfig {
    fn default() -> Self {
        Self {
            partition_key_name: "PK".into(),
            sort_key_name: "SK".into(),
            max_statement_length: 8192,
            max_transaction_size: 100,
            max_batch_statements: 25,
            max_batch_get_keys: 100,
            page_size: 100,
        }
    }
}

/// Number of calls made to each operation of an [`InMemoryClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `put_item` calls.
    pub put_item: u64,
    /// `get_item` calls.
    pub get_item: u64,
    /// `delete_item` calls.
    pub delete_item: u64,
    /// `query` calls.
    pub query: u64,
    /// `batch_get_item` calls.
    pub batch_get_item: u64,
    /// `batch_execute_statement` calls.
    pub batch_execute_statement: u64,
    /// `execute_statement` calls.
    pub execute_statement: u64,
    /// `execute_transaction` calls.
    pub execute_transaction: u64,
}

impl CallCounts {
    /// Total calls across all operations.
    pub fn total(&self) -> u64 {
        self.put_item
            + self.get_item
            + self.delete_item
            + self.query
            + self.batch_get_item
            + self.batch_execute_statement
            + self.execute_statement
            + self.execute_transaction
    }
}

/// A statement that failed against current state.
#[derive(Debug, Clone)]
struct StatementFailure {
    code: ErrorCode,
    message: String,
}

impl StatementFailure {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    fn conditional() -> Self {
        Self::new(
            ErrorCode::ConditionalCheckFailed,
            "The conditional request failed",
        )
    }

    fn into_client_error(self) -> ClientError {
        match self.code {
            ErrorCode::ConditionalCheckFailed => ClientError::ConditionalCheckFailed {
                message: self.message,
            },
            ErrorCode::DuplicateItem => ClientError::DuplicateItem {
                message: self.message,
            },
            ErrorCode::ResourceNotFound => ClientError::ResourceNotFound {
                message: self.message,
            },
            ErrorCode::ValidationError => ClientError::validation(self.message),
            code => ClientError::Unknown {
                code: code.to_string(),
                message: self.message,
            },
        }
    }
}

/// An in-memory backend that executes Tabula's statement subset.
///
/// Suitable for:
/// - Unit and integration tests
/// - Local development without a remote service
///
/// Tables must be created before use; calls against unknown tables fail
/// with `ResourceNotFound`. All state sits behind one lock, so every call is
/// atomic with respect to every other call.
///
/// # Example
///
/// ```rust
/// use tabula_client::InMemoryClient;
///
/// let client = InMemoryClient::new().with_table("accounts");
/// assert!(client.items("accounts").is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryClient {
    config: InMemoryClientConfig,
    tables: RwLock<HashMap<String, Table>>,
    counts: Mutex<CallCounts>,
}

impl InMemoryClient {
    /// Creates a backend with default limits and no tables.
    pub fn new() -> Self {
        Self::with_config(InMemoryClientConfig::default())
    }

    /// Creates a backend with the given limits and no tables.
    pub fn with_config(config: InMemoryClientConfig) -> Self {
        Self {
            config,
            tables: RwLock::new(HashMap::new()),
            counts: Mutex::new(CallCounts::default()),
        }
    }

    /// Adds an empty table.
    #[must_use]
    pub fn with_table(self, name: impl Into<String>) -> Self {
        self.create_table(name);
        self
    }

    /// Creates an empty table if it does not already exist.
    pub fn create_table(&self, name: impl Into<String>) {
        self.tables.write().entry(name.into()).or_default();
    }

    /// Returns the stored item at a key.
    pub fn item(&self, table: &str, partition_key: &str, sort_key: &str) -> Option<Attributes> {
        self.tables
            .read()
            .get(table)?
            .get(&(partition_key.to_string(), sort_key.to_string()))
            .cloned()
    }

    /// Returns every stored item of a table in key order.
    pub fn items(&self, table: &str) -> Vec<Attributes> {
        self.tables
            .read()
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the calls made so far.
    pub fn call_counts(&self) -> CallCounts {
        self.counts.lock().clone()
    }

    /// Resets all call counters to zero.
    pub fn reset_call_counts(&self) {
        *self.counts.lock() = CallCounts::default();
    }

    fn count(&self, f: impl FnOnce(&mut CallCounts)) {
        f(&mut self.counts.lock());
    }

    fn key_of(&self, item: &Attributes) -> ClientResult<(String, String)> {
        let part = |name: &str| {
            item.get(name)
                .and_then(AttributeValue::as_s)
                .map(str::to_string)
                .ok_or_else(|| {
                    ClientError::validation(format!("missing string key attribute {name}"))
                })
        };
        Ok((
            part(&self.config.partition_key_name)?,
            part(&self.config.sort_key_name)?,
        ))
    }

    fn key_attributes(&self, key: &(String, String)) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert(
            self.config.partition_key_name.clone(),
            AttributeValue::S(key.0.clone()),
        );
        attributes.insert(
            self.config.sort_key_name.clone(),
            AttributeValue::S(key.1.clone()),
        );
        attributes
    }

    /// Splits a WHERE clause into the full primary key and the remaining
    /// condition terms.
    fn split_predicate<'a>(
        &self,
        predicate: &'a [Term],
    ) -> Result<((String, String), Vec<&'a Term>), StatementFailure> {
        let mut partition = None;
        let mut sort = None;
        let mut conditions = Vec::new();
        for term in predicate {
            let pinned = term.equality_value().and_then(AttributeValue::as_s);
            match pinned {
                Some(v) if term.attribute == self.config.partition_key_name => {
                    partition = Some(v.to_string())
                }
                Some(v) if term.attribute == self.config.sort_key_name => {
                    sort = Some(v.to_string())
                }
                _ => conditions.push(term),
            }
        }
        match (partition, sort) {
            (Some(p), Some(s)) => Ok(((p, s), conditions)),
            _ => Err(StatementFailure::new(
                ErrorCode::ValidationError,
                "Where clause does not contain a mandatory equality on all key attributes",
            )),
        }
    }

    fn statement_key(&self, statement: &Statement) -> ClientResult<Option<(String, String)>> {
        match statement {
            Statement::Insert { item, .. } => self.key_of(item).map(Some),
            Statement::Select { .. } => Ok(None),
            other => self
                .split_predicate(other.predicate())
                .map(|(key, _)| Some(key))
                .map_err(StatementFailure::into_client_error),
        }
    }

    fn check_length(&self, statement: &str) -> ClientResult<()> {
        let length = statement.chars().count();
        if length > self.config.max_statement_length {
            return Err(ClientError::validation(format!(
                "Statement length {length} exceeds the maximum of {}",
                self.config.max_statement_length
            )));
        }
        Ok(())
    }

    /// Executes one statement against `tables`, returning selected items.
    fn apply(
        &self,
        tables: &mut HashMap<String, Table>,
        statement: &Statement,
    ) -> Result<Vec<Attributes>, StatementFailure> {
        let table = tables.get_mut(statement.table()).ok_or_else(|| {
            StatementFailure::new(
                ErrorCode::ResourceNotFound,
                format!("Requested resource not found: {}", statement.table()),
            )
        })?;

        match statement {
            Statement::Insert { item, .. } => {
                let key = self.key_of(item).map_err(|e| {
                    StatementFailure::new(ErrorCode::ValidationError, e.to_string())
                })?;
                if table.contains_key(&key) {
                    return Err(StatementFailure::new(
                        ErrorCode::DuplicateItem,
                        "Duplicate primary key exists in table",
                    ));
                }
                table.insert(key, item.clone());
                Ok(Vec::new())
            }
            Statement::Update {
                sets,
                removes,
                predicate,
                ..
            } => {
                let (key, conditions) = self.split_predicate(predicate)?;
                let existing = table
                    .get(&key)
                    .filter(|item| conditions.iter().all(|t| t.matches(item)))
                    .ok_or_else(StatementFailure::conditional)?;

                let touches_key = sets
                    .iter()
                    .map(|(path, _)| path)
                    .chain(removes.iter())
                    .any(|path| {
                        path.root() == self.config.partition_key_name
                            || path.root() == self.config.sort_key_name
                    });
                if touches_key {
                    return Err(StatementFailure::new(
                        ErrorCode::ValidationError,
                        "Cannot update attribute of the primary key",
                    ));
                }

                let mut updated = existing.clone();
                let invalid =
                    |e: tabula_codec::CodecError| StatementFailure::new(ErrorCode::ValidationError, e.to_string());
                for (path, value) in sets {
                    path.set(&mut updated, value.clone()).map_err(invalid)?;
                }
                // Later list indices first so earlier removals don't shift them.
                for path in removes.iter().rev() {
                    path.remove(&mut updated).map_err(invalid)?;
                }
                table.insert(key, updated);
                Ok(Vec::new())
            }
            Statement::Delete { predicate, .. } => {
                let (key, conditions) = self.split_predicate(predicate)?;
                if !conditions.is_empty() {
                    table
                        .get(&key)
                        .filter(|item| conditions.iter().all(|t| t.matches(item)))
                        .ok_or_else(StatementFailure::conditional)?;
                }
                table.remove(&key);
                Ok(Vec::new())
            }
            Statement::Exists { predicate, .. } => {
                let (key, conditions) = self.split_predicate(predicate)?;
                table
                    .get(&key)
                    .filter(|item| conditions.iter().all(|t| t.matches(item)))
                    .ok_or_else(StatementFailure::conditional)?;
                Ok(Vec::new())
            }
            Statement::Select {
                projection,
                predicate,
                ..
            } => Ok(table
                .values()
                .filter(|item| predicate.iter().all(|t| t.matches(item)))
                .map(|item| projection.apply(item))
                .collect()),
        }
    }
}

#[async_trait]
impl TableClient for InMemoryClient {
    async fn put_item(&self, request: PutItemRequest) -> ClientResult<()> {
        self.count(|c| c.put_item += 1);
        let key = self.key_of(&request.item)?;
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| ClientError::resource_not_found(request.table_name.clone()))?;

        if let Some(condition) = &request.condition {
            if !condition.evaluate(table.get(&key)) {
                return Err(ClientError::conditional_check_failed(format!(
                    "The conditional request failed: {}",
                    condition.to_expression()
                )));
            }
        }
        table.insert(key, request.item);
        Ok(())
    }

    async fn get_item(&self, request: GetItemRequest) -> ClientResult<GetItemOutput> {
        self.count(|c| c.get_item += 1);
        let key = self.key_of(&request.key)?;
        let tables = self.tables.read();
        let table = tables
            .get(&request.table_name)
            .ok_or_else(|| ClientError::resource_not_found(request.table_name.clone()))?;
        Ok(GetItemOutput {
            item: table.get(&key).cloned(),
        })
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> ClientResult<()> {
        self.count(|c| c.delete_item += 1);
        let key = self.key_of(&request.key)?;
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| ClientError::resource_not_found(request.table_name.clone()))?;

        if let Some(condition) = &request.condition {
            if !condition.evaluate(table.get(&key)) {
                return Err(ClientError::conditional_check_failed(format!(
                    "The conditional request failed: {}",
                    condition.to_expression()
                )));
            }
        }
        table.remove(&key);
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> ClientResult<QueryOutput> {
        self.count(|c| c.query += 1);
        let tables = self.tables.read();
        let table = tables
            .get(&request.table_name)
            .ok_or_else(|| ClientError::resource_not_found(request.table_name.clone()))?;

        let start_after = match &request.exclusive_start_key {
            Some(key) => Some(self.key_of(key)?.1),
            None => None,
        };

        let mut matching: Vec<(&(String, String), &Attributes)> = table
            .iter()
            .filter(|((pk, sk), _)| {
                pk == &request.partition_key
                    && request
                        .sort_key_condition
                        .as_ref()
                        .map_or(true, |c| c.matches(sk))
            })
            .collect();
        if !request.scan_index_forward {
            matching.reverse();
        }
        if let Some(start) = start_after {
            matching.retain(|((_, sk), _)| {
                if request.scan_index_forward {
                    sk > &start
                } else {
                    sk < &start
                }
            });
        }

        let limit = request.limit.unwrap_or(usize::MAX);
        let more = matching.len() > limit;
        matching.truncate(limit);
        let last_evaluated_key = if more {
            matching.last().map(|(key, _)| self.key_attributes(key))
        } else {
            None
        };

        Ok(QueryOutput {
            items: matching.into_iter().map(|(_, item)| item.clone()).collect(),
            last_evaluated_key,
        })
    }

    async fn batch_get_item(
        &self,
        request: BatchGetItemRequest,
    ) -> ClientResult<BatchGetItemOutput> {
        self.count(|c| c.batch_get_item += 1);
        if request.keys.len() > self.config.max_batch_get_keys {
            return Err(ClientError::validation(format!(
                "Too many items requested for the BatchGetItem call: {}",
                request.keys.len()
            )));
        }
        let tables = self.tables.read();
        let table = tables
            .get(&request.table_name)
            .ok_or_else(|| ClientError::resource_not_found(request.table_name.clone()))?;

        let mut items = Vec::new();
        for key in &request.keys {
            if let Some(item) = table.get(&self.key_of(key)?) {
                items.push(item.clone());
            }
        }
        Ok(BatchGetItemOutput {
            items,
            unprocessed_keys: Vec::new(),
        })
    }

    async fn batch_execute_statement(
        &self,
        statements: Vec<BatchStatementRequest>,
    ) -> ClientResult<Vec<BatchStatementResponse>> {
        self.count(|c| c.batch_execute_statement += 1);
        if statements.len() > self.config.max_batch_statements {
            return Err(ClientError::validation(format!(
                "Member must have length less than or equal to {}",
                self.config.max_batch_statements
            )));
        }
        for request in &statements {
            self.check_length(&request.statement)?;
        }

        let mut tables = self.tables.write();
        let responses = statements
            .iter()
            .map(|request| {
                let result = parse_statement(&request.statement)
                    .map_err(|e| StatementFailure::new(ErrorCode::ValidationError, e.to_string()))
                    .and_then(|statement| self.apply(&mut tables, &statement));
                match result {
                    Ok(items) => BatchStatementResponse {
                        error: None,
                        item: items.into_iter().next(),
                    },
                    Err(failure) => BatchStatementResponse {
                        error: Some(BatchStatementError {
                            code: failure.code,
                            message: Some(failure.message),
                        }),
                        item: None,
                    },
                }
            })
            .collect();
        Ok(responses)
    }

    async fn execute_statement(
        &self,
        request: ExecuteStatementRequest,
    ) -> ClientResult<ExecuteStatementOutput> {
        self.count(|c| c.execute_statement += 1);
        self.check_length(&request.statement)?;
        let statement = parse_statement(&request.statement)?;

        let items = {
            let mut tables = self.tables.write();
            self.apply(&mut tables, &statement)
                .map_err(StatementFailure::into_client_error)?
        };

        let offset = match &request.next_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| ClientError::validation("Invalid NextToken"))?,
            None => 0,
        };
        let page_size = request.limit.unwrap_or(self.config.page_size).max(1);
        let end = (offset + page_size).min(items.len());
        let next_token = (end < items.len()).then(|| end.to_string());
        let page = items.get(offset..end).map(<[_]>::to_vec).unwrap_or_default();

        Ok(ExecuteStatementOutput {
            items: page,
            next_token,
        })
    }

    async fn execute_transaction(&self, request: ExecuteTransactionRequest) -> ClientResult<()> {
        self.count(|c| c.execute_transaction += 1);
        if request.statements.len() > self.config.max_transaction_size {
            return Err(ClientError::validation(format!(
                "Member must have length less than or equal to {}",
                self.config.max_transaction_size
            )));
        }

        let mut parsed = Vec::with_capacity(request.statements.len());
        let mut keys = HashSet::new();
        for text in &request.statements {
            self.check_length(text)?;
            let statement = parse_statement(text)?;
            let key = self.statement_key(&statement)?.ok_or_else(|| {
                ClientError::validation("Transactions cannot mix reads with writes")
            })?;
            if !keys.insert((statement.table().to_string(), key)) {
                return Err(ClientError::validation(
                    "Transaction request cannot include multiple operations on one item",
                ));
            }
            parsed.push(statement);
        }

        let mut tables = self.tables.write();
        let mut working = tables.clone();
        let reasons: Vec<Option<CancellationReason>> = parsed
            .iter()
            .map(|statement| {
                self.apply(&mut working, statement)
                    .err()
                    .map(|failure| CancellationReason::new(failure.code, failure.message))
            })
            .collect();

        if reasons.iter().any(Option::is_some) {
            debug!(
                statements = parsed.len(),
                failed = reasons.iter().filter(|r| r.is_some()).count(),
                "in-memory transaction canceled"
            );
            return Err(ClientError::TransactionCanceled { reasons });
        }

        *tables = working;
        Ok(())
    }
}
