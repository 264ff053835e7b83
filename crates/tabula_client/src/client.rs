//! The backend client capability.

use crate::error::ClientResult;
use crate::types::{
    BatchGetItemOutput, BatchGetItemRequest, BatchStatementRequest, BatchStatementResponse,
    DeleteItemRequest, ExecuteStatementOutput, ExecuteStatementRequest,
    ExecuteTransactionRequest, GetItemOutput, GetItemRequest, PutItemRequest, QueryOutput,
    QueryRequest,
};
use async_trait::async_trait;
use std::sync::Arc;

/// A client for a wide-column key-value backend.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (an HTTP client, [`crate::InMemoryClient`] for testing,
/// wrappers that inject faults, etc.).
///
/// # Invariants
///
/// - `execute_transaction` applies all statements or none of them; on
///   cancellation it returns one reason per statement, in order
/// - `batch_execute_statement` returns one response per statement, in order,
///   and reports per-statement failures in the response, not as an `Err`
/// - Plain transport failures (throttling, timeouts) surface as `Err`; callers
///   above this trait do not retry them
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Writes a whole item.
    async fn put_item(&self, request: PutItemRequest) -> ClientResult<()>;

    /// Reads one item by key.
    async fn get_item(&self, request: GetItemRequest) -> ClientResult<GetItemOutput>;

    /// Deletes one item by key.
    async fn delete_item(&self, request: DeleteItemRequest) -> ClientResult<()>;

    /// Reads one page of a partition.
    async fn query(&self, request: QueryRequest) -> ClientResult<QueryOutput>;

    /// Reads many items by key.
    async fn batch_get_item(&self, request: BatchGetItemRequest)
        -> ClientResult<BatchGetItemOutput>;

    /// Executes independent statements in one call.
    async fn batch_execute_statement(
        &self,
        statements: Vec<BatchStatementRequest>,
    ) -> ClientResult<Vec<BatchStatementResponse>>;

    /// Executes one statement.
    async fn execute_statement(
        &self,
        request: ExecuteStatementRequest,
    ) -> ClientResult<ExecuteStatementOutput>;

    /// Executes statements as one atomic transaction.
    async fn execute_transaction(&self, request: ExecuteTransactionRequest) -> ClientResult<()>;
}

#[async_trait]
impl<C: TableClient + ?Sized> TableClient for Arc<C> {
    async fn put_item(&self, request: PutItemRequest) -> ClientResult<()> {
        (**self).put_item(request).await
    }

    async fn get_item(&self, request: GetItemRequest) -> ClientResult<GetItemOutput> {
        (**self).get_item(request).await
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> ClientResult<()> {
        (**self).delete_item(request).await
    }

    async fn query(&self, request: QueryRequest) -> ClientResult<QueryOutput> {
        (**self).query(request).await
    }

    async fn batch_get_item(
        &self,
        request: BatchGetItemRequest,
    ) -> ClientResult<BatchGetItemOutput> {
        (**self).batch_get_item(request).await
    }

    async fn batch_execute_statement(
        &self,
        statements: Vec<BatchStatementRequest>,
    ) -> ClientResult<Vec<BatchStatementResponse>> {
        (**self).batch_execute_statement(statements).await
    }

    async fn execute_statement(
        &self,
        request: ExecuteStatementRequest,
    ) -> ClientResult<ExecuteStatementOutput> {
        (**self).execute_statement(request).await
    }

    async fn execute_transaction(&self, request: ExecuteTransactionRequest) -> ClientResult<()> {
        (**self).execute_transaction(request).await
    }
}
