//! Fetch-compute-write helpers that retry lost concurrency races.
//!
//! Every attempt re-reads current state, asks the caller's provider for the
//! next state and submits a conditional write. Only lost races are retried,
//! up to `TableConfig::retry.max_attempts` attempts:
//!
//! - a provider error propagates at once
//! - a failed transaction constraint propagates at once as
//!   [`TableError::ConstraintFailure`]
//! - transport errors propagate at once
//! - running out of attempts fails with [`TableError::ConcurrencyError`]
//!
//! Nothing is shared between calls, so concurrent calls on different keys
//! do not interact.

use crate::error::{TableError, TableResult};
use crate::item::{CompositePrimaryKey, RowType, TypedItem};
use crate::table::CompositePrimaryKeyTable;
use crate::transaction::{PolymorphicTransactionConstraintEntry, WriteEntry};
use std::collections::HashSet;
use std::future::Future;
use tabula_client::TableClient;
use tracing::{debug, warn};

impl<C: TableClient> CompositePrimaryKeyTable<C> {
    /// Updates the item at `key` with the value `provider` derives from the
    /// current item, retrying lost races.
    ///
    /// Fails with [`TableError::ConditionalCheckFailed`] without retrying if
    /// no item is stored at `key`. Returns the written item.
    pub async fn retrying_update_item<T, U, UF>(
        &self,
        key: &CompositePrimaryKey,
        provider: U,
    ) -> TableResult<TypedItem<T>>
    where
        T: RowType,
        U: Fn(TypedItem<T>) -> UF,
        UF: Future<Output = TableResult<T>>,
    {
        self.retrying_upsert_item(key, || missing_item::<T>(key), provider)
            .await
    }

    /// Inserts the value from `new_provider` if nothing is stored at `key`,
    /// otherwise updates with the value `updated_provider` derives from the
    /// current item. Lost races in either branch are retried.
    pub async fn retrying_upsert_item<T, N, NF, U, UF>(
        &self,
        key: &CompositePrimaryKey,
        new_provider: N,
        updated_provider: U,
    ) -> TableResult<TypedItem<T>>
    where
        T: RowType,
        N: Fn() -> NF,
        NF: Future<Output = TableResult<T>>,
        U: Fn(TypedItem<T>) -> UF,
        UF: Future<Output = TableResult<T>>,
    {
        let max_attempts = self.config.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let result = match self.get_item::<T>(key).await? {
                None => {
                    let item = TypedItem::new(key.clone(), new_provider().await?);
                    self.insert_item(&item).await.map(|()| item)
                }
                Some(existing) => {
                    let value = updated_provider(existing.clone()).await?;
                    let item = existing.create_updated_item(value);
                    self.update_item(&item, &existing).await.map(|()| item)
                }
            };
            match result {
                Ok(item) => return Ok(item),
                Err(e) if e.is_conditional_check_failed() => {
                    debug!(%key, attempt, max_attempts, "lost update race, retrying");
                }
                Err(e) => return Err(e),
            }
        }
        Err(exhaustion(&key.to_string(), max_attempts))
    }

    /// Like [`CompositePrimaryKeyTable::retrying_update_item`], also
    /// inserting the historical item `historical_provider` derives from the
    /// new item, in the same transaction.
    pub async fn retrying_update_item_with_historical_row<T, U, UF, H>(
        &self,
        key: &CompositePrimaryKey,
        updated_provider: U,
        historical_provider: H,
    ) -> TableResult<TypedItem<T>>
    where
        T: RowType,
        U: Fn(TypedItem<T>) -> UF,
        UF: Future<Output = TableResult<T>>,
        H: Fn(&TypedItem<T>) -> TypedItem<T>,
    {
        self.retrying_upsert_item_with_historical_row(
            key,
            || missing_item::<T>(key),
            updated_provider,
            historical_provider,
        )
        .await
    }

    /// Like [`CompositePrimaryKeyTable::retrying_upsert_item`], also
    /// inserting the historical item `historical_provider` derives from the
    /// new item, in the same transaction.
    ///
    /// The primary write and the historical insert succeed or fail together.
    /// Only a lost race on the primary row is retried; a failed historical
    /// insert propagates as [`TableError::TransactionCanceled`].
    pub async fn retrying_upsert_item_with_historical_row<T, N, NF, U, UF, H>(
        &self,
        key: &CompositePrimaryKey,
        new_provider: N,
        updated_provider: U,
        historical_provider: H,
    ) -> TableResult<TypedItem<T>>
    where
        T: RowType,
        N: Fn() -> NF,
        NF: Future<Output = TableResult<T>>,
        U: Fn(TypedItem<T>) -> UF,
        UF: Future<Output = TableResult<T>>,
        H: Fn(&TypedItem<T>) -> TypedItem<T>,
    {
        let max_attempts = self.config.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let (primary, item) = match self.get_item::<T>(key).await? {
                None => {
                    let item = TypedItem::new(key.clone(), new_provider().await?);
                    (WriteEntry::Insert { new: item.clone() }, item)
                }
                Some(existing) => {
                    let value = updated_provider(existing.clone()).await?;
                    let item = existing.create_updated_item(value);
                    (
                        WriteEntry::Update {
                            new: item.clone(),
                            existing,
                        },
                        item,
                    )
                }
            };
            let history = WriteEntry::Insert {
                new: historical_provider(&item),
            };

            match self.transact_write(&[primary, history]).await {
                Ok(()) => return Ok(item),
                Err(e) => retry_or_fail(e, &[true, false], 2)?,
            }
            debug!(%key, attempt, max_attempts, "lost update race, retrying");
        }
        Err(exhaustion(&key.to_string(), max_attempts))
    }

    /// Transactionally writes the entries `provider` returns for each key,
    /// retrying lost races.
    ///
    /// Each attempt batch-reads the current items, calls `provider` once per
    /// key with the key and its current item (or `None`), and submits every
    /// returned entry plus the constraints as one transaction. A key for which
    /// `provider` returns `None` is left out of that attempt.
    ///
    /// A failed constraint fails with [`TableError::ConstraintFailure`] at
    /// once, without using up attempts.
    pub async fn retrying_transact_write<T, K, F, Fut>(
        &self,
        keys: &[CompositePrimaryKey],
        constraints: &[K],
        provider: F,
    ) -> TableResult<()>
    where
        T: RowType,
        K: PolymorphicTransactionConstraintEntry,
        F: Fn(CompositePrimaryKey, Option<TypedItem<T>>) -> Fut,
        Fut: Future<Output = TableResult<Option<WriteEntry<T>>>>,
    {
        self.retrying_transact_write_with_historical_rows(keys, constraints, |key, item| {
            let pending = provider(key, item);
            async move {
                let entry = pending.await?;
                Ok::<_, TableError>(entry.map(|entry| (entry, None::<WriteEntry<T>>)))
            }
        })
        .await
    }

    /// Like [`CompositePrimaryKeyTable::retrying_transact_write`], where each
    /// key may also yield a historical entry.
    ///
    /// Entries are submitted as `[entry 1, history 1, entry 2, history 2, ..]`
    /// followed by the constraints, in one transaction. Only lost races on
    /// primary entries are retried. A key listed more than once is offered
    /// to `provider` once, at its first position.
    pub async fn retrying_transact_write_with_historical_rows<T, K, F, Fut>(
        &self,
        keys: &[CompositePrimaryKey],
        constraints: &[K],
        provider: F,
    ) -> TableResult<()>
    where
        T: RowType,
        K: PolymorphicTransactionConstraintEntry,
        F: Fn(CompositePrimaryKey, Option<TypedItem<T>>) -> Fut,
        Fut: Future<Output = TableResult<Option<(WriteEntry<T>, Option<WriteEntry<T>>)>>>,
    {
        let mut seen = HashSet::with_capacity(keys.len());
        let keys: Vec<CompositePrimaryKey> = keys
            .iter()
            .filter(|key| seen.insert(*key))
            .cloned()
            .collect();

        let max_attempts = self.config.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let mut current = self.get_items::<T>(&keys).await?;
            let mut entries = Vec::with_capacity(keys.len());
            let mut primary = Vec::with_capacity(keys.len());
            for key in &keys {
                let existing = current.remove(key);
                if let Some((entry, history)) = provider(key.clone(), existing).await? {
                    entries.push(entry);
                    primary.push(true);
                    if let Some(history) = history {
                        entries.push(history);
                        primary.push(false);
                    }
                }
            }

            match self
                .polymorphic_transact_write(&entries, constraints)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) => retry_or_fail(e, &primary, entries.len())?,
            }
            debug!(
                keys = keys.len(),
                attempt, max_attempts, "transaction lost a race, retrying"
            );
        }
        Err(exhaustion(&format!("{} keys", keys.len()), max_attempts))
    }
}

/// Decides whether a failed transaction attempt may be retried.
///
/// Returns `Ok(())` to retry. Positions at or after `constraint_start` are
/// constraints; `primary[i]` marks entries whose lost race is retryable.
fn retry_or_fail(error: TableError, primary: &[bool], constraint_start: usize) -> TableResult<()> {
    let TableError::TransactionCanceled { reasons } = error else {
        return Err(error);
    };

    let constraint_failed = reasons
        .iter()
        .skip(constraint_start)
        .flatten()
        .any(TableError::is_conditional_check_failed);
    if constraint_failed {
        warn!("transaction constraint failed");
        return Err(TableError::ConstraintFailure { reasons });
    }

    let lost_race = reasons
        .iter()
        .zip(primary)
        .any(|(reason, is_primary)| {
            *is_primary && reason.as_ref().is_some_and(TableError::is_write_conflict)
        });
    if lost_race {
        Ok(())
    } else {
        Err(TableError::TransactionCanceled { reasons })
    }
}

async fn missing_item<T>(key: &CompositePrimaryKey) -> TableResult<T> {
    Err(TableError::conditional_check_failed(key, "item not present"))
}

fn exhaustion(subject: &str, attempts: u32) -> TableError {
    warn!(subject, attempts, "retries exhausted");
    TableError::ConcurrencyError {
        message: format!("{subject} still conflicting after {attempts} attempts"),
    }
}
