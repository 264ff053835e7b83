//! Reads: point gets, batch gets, partition queries and selects.

use crate::error::{TableError, TableResult};
use crate::item::{CompositePrimaryKey, RowType, TypedItem};
use crate::registry::TypeRegistry;
use crate::table::CompositePrimaryKeyTable;
use std::collections::{BTreeSet, HashMap};
use tabula_client::{
    BatchGetItemRequest, ExecuteStatementRequest, GetItemRequest, QueryRequest, SortKeyCondition,
    TableClient,
};
use tabula_codec::{Attributes, CodecError};
use tracing::{debug, warn};

/// Options for a partition query.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Restricts the sort keys returned.
    pub sort_key_condition: Option<SortKeyCondition>,
    /// Maximum number of items per page.
    pub limit: Option<usize>,
    /// Descending sort key order when true.
    pub scan_backward: bool,
    /// Continuation token from a previous page.
    pub exclusive_start: Option<String>,
}

impl QueryOptions {
    /// Creates options reading the whole partition in ascending order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the sort keys returned.
    pub fn with_sort_key_condition(mut self, condition: SortKeyCondition) -> Self {
        self.sort_key_condition = Some(condition);
        self
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Reads in descending sort key order.
    pub fn scan_backward(mut self) -> Self {
        self.scan_backward = true;
        self
    }

    /// Continues after a previous page.
    pub fn with_exclusive_start(mut self, token: impl Into<String>) -> Self {
        self.exclusive_start = Some(token.into());
        self
    }
}

impl<C: TableClient> CompositePrimaryKeyTable<C> {
    /// Reads one item.
    pub async fn get_item<T: RowType>(
        &self,
        key: &CompositePrimaryKey,
    ) -> TableResult<Option<TypedItem<T>>> {
        let output = self
            .client
            .get_item(GetItemRequest {
                table_name: self.config.table_name.clone(),
                key: key.to_attributes(),
                consistent_read: self.config.consistent_read,
            })
            .await?;
        output
            .item
            .map(|attributes| TypedItem::decode(&self.decoder, attributes))
            .transpose()
    }

    /// Reads many items of one row type. Missing keys are absent from the
    /// result.
    pub async fn get_items<T: RowType>(
        &self,
        keys: &[CompositePrimaryKey],
    ) -> TableResult<HashMap<CompositePrimaryKey, TypedItem<T>>> {
        let mut items = HashMap::new();
        for attributes in self.batch_get_raw(keys).await? {
            let item = TypedItem::<T>::decode(&self.decoder, attributes)?;
            items.insert(item.key().clone(), item);
        }
        Ok(items)
    }

    /// Reads many items of any registered row type.
    pub async fn get_polymorphic_items<R: 'static>(
        &self,
        keys: &[CompositePrimaryKey],
        registry: &TypeRegistry<R>,
    ) -> TableResult<HashMap<CompositePrimaryKey, R>> {
        let mut items = HashMap::new();
        for attributes in self.batch_get_raw(keys).await? {
            let key = CompositePrimaryKey::from_attributes(&attributes)?;
            items.insert(key, registry.decode(&self.decoder, attributes)?);
        }
        Ok(items)
    }

    /// Reads one page of a partition.
    ///
    /// Returns the page and a continuation token when more items remain.
    pub async fn query<T: RowType>(
        &self,
        partition_key: &str,
        options: &QueryOptions,
    ) -> TableResult<(Vec<TypedItem<T>>, Option<String>)> {
        let (page, token) = self.query_raw(partition_key, options).await?;
        let items = page
            .into_iter()
            .map(|attributes| TypedItem::decode(&self.decoder, attributes))
            .collect::<TableResult<_>>()?;
        Ok((items, token))
    }

    /// Reads one page of a partition holding several row types.
    pub async fn polymorphic_query<R: 'static>(
        &self,
        partition_key: &str,
        options: &QueryOptions,
        registry: &TypeRegistry<R>,
    ) -> TableResult<(Vec<R>, Option<String>)> {
        let (page, token) = self.query_raw(partition_key, options).await?;
        let items = page
            .into_iter()
            .map(|attributes| registry.decode(&self.decoder, attributes))
            .collect::<TableResult<_>>()?;
        Ok((items, token))
    }

    /// Reads every matching item of a partition, following continuation
    /// tokens until none is returned.
    pub async fn query_all<T: RowType>(
        &self,
        partition_key: &str,
        sort_key_condition: Option<SortKeyCondition>,
    ) -> TableResult<Vec<TypedItem<T>>> {
        let mut options = QueryOptions {
            sort_key_condition,
            ..QueryOptions::default()
        };
        let mut all = Vec::new();
        loop {
            let (page, token) = self.query::<T>(partition_key, &options).await?;
            all.extend(page);
            match token {
                Some(token) => options.exclusive_start = Some(token),
                None => return Ok(all),
            }
        }
    }

    /// Selects every item in the given partitions, optionally narrowed by an
    /// extra `WHERE` clause, following the backend's page tokens.
    pub async fn execute_select<T: RowType>(
        &self,
        partition_keys: &[String],
        additional_where: Option<&str>,
    ) -> TableResult<Vec<TypedItem<T>>> {
        self.select_raw(partition_keys, additional_where)
            .await?
            .into_iter()
            .map(|attributes| TypedItem::decode(&self.decoder, attributes))
            .collect()
    }

    /// Like [`CompositePrimaryKeyTable::execute_select`], decoding through a
    /// registry.
    pub async fn polymorphic_execute_select<R: 'static>(
        &self,
        partition_keys: &[String],
        additional_where: Option<&str>,
        registry: &TypeRegistry<R>,
    ) -> TableResult<Vec<R>> {
        self.select_raw(partition_keys, additional_where)
            .await?
            .into_iter()
            .map(|attributes| registry.decode(&self.decoder, attributes))
            .collect()
    }

    /// Batch-gets raw items, chunked, re-requesting unprocessed keys.
    async fn batch_get_raw(&self, keys: &[CompositePrimaryKey]) -> TableResult<Vec<Attributes>> {
        let unique: BTreeSet<&CompositePrimaryKey> = keys.iter().collect();
        let unique: Vec<&CompositePrimaryKey> = unique.into_iter().collect();
        let mut items = Vec::new();

        for chunk in unique.chunks(self.config.batch_get_chunk_size.max(1)) {
            let mut pending: Vec<Attributes> = chunk.iter().map(|k| k.to_attributes()).collect();
            let mut attempts = 0;
            while !pending.is_empty() {
                attempts += 1;
                if attempts > self.config.retry.max_attempts {
                    warn!(
                        unprocessed = pending.len(),
                        attempts = attempts - 1,
                        "batch get left keys unprocessed"
                    );
                    return Err(TableError::unexpected_response(format!(
                        "{} keys still unprocessed after {} attempts",
                        pending.len(),
                        attempts - 1
                    )));
                }
                let output = self
                    .client
                    .batch_get_item(BatchGetItemRequest {
                        table_name: self.config.table_name.clone(),
                        keys: pending,
                        consistent_read: self.config.consistent_read,
                    })
                    .await?;
                items.extend(output.items);
                pending = output.unprocessed_keys;
                if !pending.is_empty() {
                    debug!(unprocessed = pending.len(), attempt = attempts, "retrying batch get");
                }
            }
        }
        Ok(items)
    }

    async fn query_raw(
        &self,
        partition_key: &str,
        options: &QueryOptions,
    ) -> TableResult<(Vec<Attributes>, Option<String>)> {
        let exclusive_start_key = match &options.exclusive_start {
            Some(token) => Some(decode_token(token)?.to_attributes()),
            None => None,
        };
        let output = self
            .client
            .query(QueryRequest {
                table_name: self.config.table_name.clone(),
                partition_key: partition_key.to_string(),
                sort_key_condition: options.sort_key_condition.clone(),
                scan_index_forward: !options.scan_backward,
                limit: options.limit,
                exclusive_start_key,
                consistent_read: self.config.consistent_read,
            })
            .await?;
        let token = match output.last_evaluated_key {
            Some(key) => Some(encode_token(&CompositePrimaryKey::from_attributes(&key)?)?),
            None => None,
        };
        Ok((output.items, token))
    }

    async fn select_raw(
        &self,
        partition_keys: &[String],
        additional_where: Option<&str>,
    ) -> TableResult<Vec<Attributes>> {
        if partition_keys.is_empty() {
            return Ok(Vec::new());
        }
        let statement = self
            .statements()
            .select(&[], partition_keys, additional_where);
        let mut items = Vec::new();
        let mut next_token = None;
        loop {
            let mut request = ExecuteStatementRequest::new(statement.clone());
            request.consistent_read = self.config.consistent_read;
            request.next_token = next_token;
            let output = self.client.execute_statement(request).await?;
            items.extend(output.items);
            match output.next_token {
                Some(token) => next_token = Some(token),
                None => return Ok(items),
            }
        }
    }
}

fn encode_token(key: &CompositePrimaryKey) -> TableResult<String> {
    serde_json::to_string(key)
        .map_err(|e| CodecError::encoding_failed(format!("pagination token: {e}")).into())
}

fn decode_token(token: &str) -> TableResult<CompositePrimaryKey> {
    serde_json::from_str(token)
        .map_err(|e| CodecError::decoding_failed(format!("pagination token: {e}")).into())
}
