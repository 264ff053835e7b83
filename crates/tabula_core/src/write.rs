//! Single-item conditional writes.
//!
//! Every write here is one backend call. A conditional write that loses a
//! race fails with [`TableError::ConditionalCheckFailed`]; transport errors
//! pass through untouched. Nothing in this module retries.

use crate::error::TableResult;
use crate::item::{CompositePrimaryKey, RowType, TypedItem};
use crate::table::{CompositePrimaryKeyTable, SingleWrite};
use tabula_client::TableClient;
use tracing::debug;

impl<C: TableClient> CompositePrimaryKeyTable<C> {
    /// Inserts a new item; fails if the key is already taken.
    pub async fn insert_item<T: RowType>(&self, item: &TypedItem<T>) -> TableResult<()> {
        debug!(key = %item.key(), row_type = T::ROW_TYPE, "insert item");
        self.execute_single(SingleWrite::insert(&self.encoder, item)?)
            .await
    }

    /// Replaces `existing` with `new`.
    ///
    /// Succeeds only while the stored row still carries `existing`'s version
    /// and create date. `new` should come from
    /// [`TypedItem::create_updated_item`] on `existing`.
    pub async fn update_item<T: RowType>(
        &self,
        new: &TypedItem<T>,
        existing: &TypedItem<T>,
    ) -> TableResult<()> {
        debug!(
            key = %new.key(),
            from_version = existing.row_version(),
            to_version = new.row_version(),
            "update item"
        );
        self.execute_single(SingleWrite::update(&self.encoder, new, existing)?)
            .await
    }

    /// Writes an item unconditionally, replacing whatever is stored.
    pub async fn clobber_item<T: RowType>(&self, item: &TypedItem<T>) -> TableResult<()> {
        self.execute_single(SingleWrite::clobber(&self.encoder, item)?)
            .await
    }

    /// Deletes `existing` if it is still stored unchanged.
    pub async fn delete_item<T: RowType>(&self, existing: &TypedItem<T>) -> TableResult<()> {
        debug!(key = %existing.key(), version = existing.row_version(), "delete item");
        self.execute_single(SingleWrite::delete_item(existing)).await
    }

    /// Deletes whatever is stored at `key`. Deleting a missing key succeeds.
    pub async fn delete_item_at_key(&self, key: &CompositePrimaryKey) -> TableResult<()> {
        self.execute_single(SingleWrite::delete_at_key(key)).await
    }
}

#[cfg(test)]
mod tests {
    use crate::config::TableConfig;
    use crate::error::TableError;
    use crate::item::{CompositePrimaryKey, RowType, TypedItem};
    use crate::table::CompositePrimaryKeyTable;
    use serde::{Deserialize, Serialize};
    use tabula_client::{ClientError, InMemoryClient};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
    }

    impl RowType for Counter {
        const ROW_TYPE: &'static str = "Counter";
    }

    fn table() -> CompositePrimaryKeyTable<InMemoryClient> {
        CompositePrimaryKeyTable::new(
            InMemoryClient::new().with_table("t"),
            TableConfig::new("t"),
        )
    }

    fn key() -> CompositePrimaryKey {
        CompositePrimaryKey::new("p", "s")
    }

    #[tokio::test]
    async fn insert_twice_fails_and_keeps_first() {
        let table = table();
        let first = TypedItem::new(key(), Counter { count: 1 });
        table.insert_item(&first).await.unwrap();

        let second = TypedItem::new(key(), Counter { count: 2 });
        let result = table.insert_item(&second).await;
        assert!(matches!(result, Err(TableError::ConditionalCheckFailed { .. })));

        let stored: TypedItem<Counter> = table.get_item(&key()).await.unwrap().unwrap();
        assert_eq!(stored.row_value().count, 1);
    }

    #[tokio::test]
    async fn update_requires_current_version() {
        let table = table();
        let v1 = TypedItem::new(key(), Counter { count: 1 });
        table.insert_item(&v1).await.unwrap();

        let v2 = v1.create_updated_item(Counter { count: 2 });
        table.update_item(&v2, &v1).await.unwrap();

        let stale = v1.create_updated_item(Counter { count: 3 });
        let result = table.update_item(&stale, &v1).await;
        assert!(matches!(result, Err(TableError::ConditionalCheckFailed { .. })));

        let stored: TypedItem<Counter> = table.get_item(&key()).await.unwrap().unwrap();
        assert_eq!(stored.row_version(), 2);
    }

    #[tokio::test]
    async fn update_detects_recreated_row() {
        let table = table();
        let original = TypedItem::new(key(), Counter { count: 1 });
        table.insert_item(&original).await.unwrap();
        table.delete_item(&original).await.unwrap();

        let recreated = TypedItem::new_at(
            key(),
            Counter { count: 10 },
            original.create_date() + chrono::Duration::seconds(1),
        );
        table.insert_item(&recreated).await.unwrap();

        let result = table
            .update_item(&original.create_updated_item(Counter { count: 2 }), &original)
            .await;
        assert!(matches!(result, Err(TableError::ConditionalCheckFailed { .. })));
    }

    #[tokio::test]
    async fn update_rejects_mismatched_keys() {
        let table = table();
        let a = TypedItem::new(key(), Counter { count: 1 });
        let b = TypedItem::new(CompositePrimaryKey::new("p", "other"), Counter { count: 1 });
        let result = table.update_item(&b, &a).await;
        assert!(matches!(result, Err(TableError::InvalidStatement { .. })));
    }

    #[tokio::test]
    async fn stale_delete_fails() {
        let table = table();
        let v1 = TypedItem::new(key(), Counter { count: 1 });
        table.insert_item(&v1).await.unwrap();
        let v2 = v1.create_updated_item(Counter { count: 2 });
        table.update_item(&v2, &v1).await.unwrap();

        assert!(matches!(
            table.delete_item(&v1).await,
            Err(TableError::ConditionalCheckFailed { .. })
        ));
        table.delete_item(&v2).await.unwrap();
        assert!(table.get_item::<Counter>(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn clobber_and_delete_at_key_are_unconditional() {
        let table = table();
        let v1 = TypedItem::new(key(), Counter { count: 1 });
        table.clobber_item(&v1).await.unwrap();
        table.clobber_item(&v1).await.unwrap();

        table.delete_item_at_key(&key()).await.unwrap();
        table.delete_item_at_key(&key()).await.unwrap();
        assert!(table.get_item::<Counter>(&key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transport_errors_pass_through() {
        let table = CompositePrimaryKeyTable::new(InMemoryClient::new(), TableConfig::new("t"));
        let result = table
            .insert_item(&TypedItem::new(key(), Counter { count: 1 }))
            .await;
        assert!(matches!(
            result,
            Err(TableError::Client(ClientError::ResourceNotFound { .. }))
        ));
    }
}
