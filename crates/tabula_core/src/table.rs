//! The table handle shared by every engine.

use crate::config::TableConfig;
use crate::error::{TableError, TableResult};
use crate::item::{format_date, CompositePrimaryKey, RowType, TypedItem, CREATE_DATE, ROW_VERSION};
use crate::statement::StatementBuilder;
use tabula_client::{Condition, DeleteItemRequest, PutItemRequest, TableClient};
use tabula_codec::{AttributeDecoder, AttributeEncoder, AttributeValue, Attributes};

/// A typed view of one table with a composite primary key.
///
/// The table owns its client and codec instances; nothing is shared
/// globally. All operations are stateless across calls, so one table can
/// serve concurrent callers working on different keys.
///
/// Operations are grouped by engine:
/// - single-item writes, such as [`CompositePrimaryKeyTable::update_item`]
/// - reads and queries, such as [`CompositePrimaryKeyTable::query`]
/// - transactions, such as [`CompositePrimaryKeyTable::transact_write`]
/// - bulk writes, such as [`CompositePrimaryKeyTable::bulk_write`]
/// - retrying helpers, such as
///   [`CompositePrimaryKeyTable::retrying_update_item`]
#[derive(Debug)]
pub struct CompositePrimaryKeyTable<C> {
    pub(crate) client: C,
    pub(crate) config: TableConfig,
    pub(crate) encoder: AttributeEncoder,
    pub(crate) decoder: AttributeDecoder,
}

impl<C: TableClient> CompositePrimaryKeyTable<C> {
    /// Creates a table with the default codec.
    pub fn new(client: C, config: TableConfig) -> Self {
        Self::with_codec(client, config, AttributeEncoder::new(), AttributeDecoder::new())
    }

    /// Creates a table with explicit codec instances.
    pub fn with_codec(
        client: C,
        config: TableConfig,
        encoder: AttributeEncoder,
        decoder: AttributeDecoder,
    ) -> Self {
        Self {
            client,
            config,
            encoder,
            decoder,
        }
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the configuration.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }

    /// Returns the encoder.
    pub fn encoder(&self) -> &AttributeEncoder {
        &self.encoder
    }

    /// Returns the decoder.
    pub fn decoder(&self) -> &AttributeDecoder {
        &self.decoder
    }

    pub(crate) fn statements(&self) -> StatementBuilder {
        StatementBuilder::new(
            &self.config.table_name,
            self.config.escape_single_quote_in_partiql,
        )
    }

    /// Executes one prepared single-item write.
    pub(crate) async fn execute_single(&self, write: SingleWrite) -> TableResult<()> {
        match write {
            SingleWrite::Put {
                key,
                item,
                condition,
            } => self
                .client
                .put_item(PutItemRequest {
                    table_name: self.config.table_name.clone(),
                    item,
                    condition,
                })
                .await
                .map_err(|e| TableError::from_client(e, &key)),
            SingleWrite::Delete { key, condition } => self
                .client
                .delete_item(DeleteItemRequest {
                    table_name: self.config.table_name.clone(),
                    key: key.to_attributes(),
                    condition,
                })
                .await
                .map_err(|e| TableError::from_client(e, &key)),
        }
    }
}

/// A single-item write expressed as a structured request.
#[derive(Debug, Clone)]
pub(crate) enum SingleWrite {
    Put {
        key: CompositePrimaryKey,
        item: Attributes,
        condition: Option<Condition>,
    },
    Delete {
        key: CompositePrimaryKey,
        condition: Option<Condition>,
    },
}

impl SingleWrite {
    pub(crate) fn insert<T: RowType>(
        encoder: &AttributeEncoder,
        item: &TypedItem<T>,
    ) -> TableResult<Self> {
        Ok(SingleWrite::Put {
            key: item.key().clone(),
            item: item.encode(encoder)?,
            condition: Some(not_exists()),
        })
    }

    pub(crate) fn update<T: RowType>(
        encoder: &AttributeEncoder,
        new: &TypedItem<T>,
        existing: &TypedItem<T>,
    ) -> TableResult<Self> {
        if new.key() != existing.key() {
            return Err(TableError::invalid_statement(format!(
                "cannot update {} from an item at {}",
                new.key(),
                existing.key()
            )));
        }
        Ok(SingleWrite::Put {
            key: new.key().clone(),
            item: new.encode(encoder)?,
            condition: Some(unchanged(existing)),
        })
    }

    pub(crate) fn clobber<T: RowType>(
        encoder: &AttributeEncoder,
        item: &TypedItem<T>,
    ) -> TableResult<Self> {
        Ok(SingleWrite::Put {
            key: item.key().clone(),
            item: item.encode(encoder)?,
            condition: None,
        })
    }

    pub(crate) fn delete_item<T>(existing: &TypedItem<T>) -> Self {
        SingleWrite::Delete {
            key: existing.key().clone(),
            condition: Some(unchanged(existing)),
        }
    }

    pub(crate) fn delete_at_key(key: &CompositePrimaryKey) -> Self {
        SingleWrite::Delete {
            key: key.clone(),
            condition: None,
        }
    }
}

/// Neither key attribute is present.
fn not_exists() -> Condition {
    Condition::And(vec![
        Condition::AttributeNotExists(crate::item::PARTITION_KEY.into()),
        Condition::AttributeNotExists(crate::item::SORT_KEY.into()),
    ])
}

/// The stored row still has `existing`'s version and create date.
fn unchanged<T>(existing: &TypedItem<T>) -> Condition {
    Condition::And(vec![
        Condition::Equals(
            ROW_VERSION.into(),
            AttributeValue::from(existing.row_version()),
        ),
        Condition::Equals(
            CREATE_DATE.into(),
            format_date(&existing.create_date()).into(),
        ),
    ])
}
