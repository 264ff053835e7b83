//! Simulated competing writers.
//!
//! [`SimulateConcurrencyClient`] wraps a client and, before each of its
//! first few write calls, rewrites one target row with a bumped row version.
//! Any conditional write prepared from the row read before then loses the
//! race, which exercises the retry paths deterministically.

use async_trait::async_trait;
use parking_lot::Mutex;
use tabula_client::{
    BatchGetItemOutput, BatchGetItemRequest, BatchStatementRequest, BatchStatementResponse,
    ClientResult, DeleteItemRequest, ExecuteStatementOutput, ExecuteStatementRequest,
    ExecuteTransactionRequest, GetItemOutput, GetItemRequest, PutItemRequest, QueryOutput,
    QueryRequest, TableClient,
};
use tabula_codec::AttributeValue;
use tabula_core::{CompositePrimaryKey, ROW_VERSION};

/// A client that interferes with the first `interference_budget` writes.
pub struct SimulateConcurrencyClient<C> {
    inner: C,
    table_name: String,
    target: CompositePrimaryKey,
    remaining: Mutex<u32>,
    interferences: Mutex<u32>,
}

impl<C: TableClient> SimulateConcurrencyClient<C> {
    /// Wraps `inner`, bumping `target` in `table_name` before each of the
    /// first `interference_budget` writes.
    pub fn new(
        inner: C,
        table_name: impl Into<String>,
        target: CompositePrimaryKey,
        interference_budget: u32,
    ) -> Self {
        Self {
            inner,
            table_name: table_name.into(),
            target,
            remaining: Mutex::new(interference_budget),
            interferences: Mutex::new(0),
        }
    }

    /// Returns the wrapped client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// Returns how many times the target row was rewritten.
    pub fn interferences(&self) -> u32 {
        *self.interferences.lock()
    }

    /// Returns how many rewrites are still pending.
    pub fn remaining(&self) -> u32 {
        *self.remaining.lock()
    }

    async fn interfere(&self) -> ClientResult<()> {
        let take = {
            let mut remaining = self.remaining.lock();
            if *remaining == 0 {
                false
            } else {
                *remaining -= 1;
                true
            }
        };
        if !take {
            return Ok(());
        }

        let output = self
            .inner
            .get_item(GetItemRequest {
                table_name: self.table_name.clone(),
                key: self.target.to_attributes(),
                consistent_read: true,
            })
            .await?;
        let Some(mut item) = output.item else {
            return Ok(());
        };
        let version = match item.get(ROW_VERSION) {
            Some(AttributeValue::N(n)) => n.parse::<u64>().unwrap_or(0),
            _ => 0,
        };
        item.insert(
            ROW_VERSION.to_string(),
            AttributeValue::N((version + 1).to_string()),
        );
        self.inner
            .put_item(PutItemRequest {
                table_name: self.table_name.clone(),
                item,
                condition: None,
            })
            .await?;
        *self.interferences.lock() += 1;
        Ok(())
    }
}

#[async_trait]
impl<C: TableClient> TableClient for SimulateConcurrencyClient<C> {
    async fn put_item(&self, request: PutItemRequest) -> ClientResult<()> {
        self.interfere().await?;
        self.inner.put_item(request).await
    }

    async fn get_item(&self, request: GetItemRequest) -> ClientResult<GetItemOutput> {
        self.inner.get_item(request).await
    }

    async fn delete_item(&self, request: DeleteItemRequest) -> ClientResult<()> {
        self.interfere().await?;
        self.inner.delete_item(request).await
    }

    async fn query(&self, request: QueryRequest) -> ClientResult<QueryOutput> {
        self.inner.query(request).await
    }

    async fn batch_get_item(
        &self,
        request: BatchGetItemRequest,
    ) -> ClientResult<BatchGetItemOutput> {
        self.inner.batch_get_item(request).await
    }

    async fn batch_execute_statement(
        &self,
        statements: Vec<BatchStatementRequest>,
    ) -> ClientResult<Vec<BatchStatementResponse>> {
        self.interfere().await?;
        self.inner.batch_execute_statement(statements).await
    }

    async fn execute_statement(
        &self,
        request: ExecuteStatementRequest,
    ) -> ClientResult<ExecuteStatementOutput> {
        self.inner.execute_statement(request).await
    }

    async fn execute_transaction(&self, request: ExecuteTransactionRequest) -> ClientResult<()> {
        self.interfere().await?;
        self.inner.execute_transaction(request).await
    }
}
