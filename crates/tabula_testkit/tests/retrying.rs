//! Retry orchestrator behavior under simulated concurrent writers.

use std::future::{ready, Ready};
use std::sync::atomic::{AtomicU32, Ordering};
use tabula_client::{InMemoryClient, PutItemRequest, TableClient};
use tabula_codec::AttributeEncoder;
use tabula_core::{
    CompositePrimaryKey, CompositePrimaryKeyTable, RetryConfig, TableConfig, TableError,
    TableResult, TransactionConstraintEntry, TypedItem, WriteEntry,
};
use tabula_testkit::prelude::*;

type RacedTable = CompositePrimaryKeyTable<SimulateConcurrencyClient<InMemoryClient>>;

/// A table whose client bumps `target` before each of its first `budget`
/// writes. `seed` rows are stored without interference.
async fn raced_table(
    seed: &[&TypedItem<Account>],
    target: &CompositePrimaryKey,
    budget: u32,
    max_attempts: u32,
) -> RacedTable {
    let inner = InMemoryClient::new().with_table(TEST_TABLE);
    let encoder = AttributeEncoder::new();
    for item in seed {
        inner
            .put_item(PutItemRequest {
                table_name: TEST_TABLE.into(),
                item: item.encode(&encoder).unwrap(),
                condition: None,
            })
            .await
            .unwrap();
    }
    inner.reset_call_counts();

    let client = SimulateConcurrencyClient::new(inner, TEST_TABLE, target.clone(), budget);
    CompositePrimaryKeyTable::new(
        client,
        TableConfig::new(TEST_TABLE).with_retry(RetryConfig::new(max_attempts)),
    )
}

fn deposit(amount: i64) -> impl Fn(TypedItem<Account>) -> Ready<TableResult<Account>> {
    move |current| {
        ready(Ok(Account {
            balance: current.row_value().balance + amount,
            ..current.row_value().clone()
        }))
    }
}

fn no_constraints() -> [TransactionConstraintEntry<Account>; 0] {
    []
}

fn stored(table: &RacedTable, key: &CompositePrimaryKey) -> Option<tabula_codec::Attributes> {
    table
        .client()
        .inner()
        .item(TEST_TABLE, &key.partition_key, &key.sort_key)
}

#[tokio::test]
async fn update_retries_lost_races() {
    let account = account_item(&unique_partition_key("acct"), 100);
    let table = raced_table(&[&account], account.key(), 2, 10).await;

    let written = table
        .retrying_update_item(account.key(), deposit(10))
        .await
        .unwrap();

    assert_eq!(table.client().interferences(), 2);
    assert_eq!(written.row_version(), 4);
    assert_eq!(written.row_value().balance, 110);
    let read: TypedItem<Account> = table.get_item(account.key()).await.unwrap().unwrap();
    assert_eq!(read, written);
}

#[tokio::test]
async fn update_gives_up_after_bound() {
    let account = account_item(&unique_partition_key("acct"), 100);
    let table = raced_table(&[&account], account.key(), 5, 3).await;
    let calls = AtomicU32::new(0);

    let result = table
        .retrying_update_item(account.key(), |current: TypedItem<Account>| {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(Ok(current.row_value().clone()))
        })
        .await;

    assert!(matches!(result, Err(TableError::ConcurrencyError { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(table.client().interferences(), 3);
}

#[tokio::test]
async fn provider_errors_stop_immediately() {
    let account = account_item(&unique_partition_key("acct"), 100);
    let table = raced_table(&[&account], account.key(), 5, 10).await;
    let calls = AtomicU32::new(0);

    let result = table
        .retrying_update_item(account.key(), |_: TypedItem<Account>| {
            calls.fetch_add(1, Ordering::SeqCst);
            ready(Err(TableError::provider("insufficient funds")))
        })
        .await;

    assert!(matches!(result, Err(TableError::Provider { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(table.client().interferences(), 0);
    assert_eq!(table.client().inner().call_counts().put_item, 0);
}

#[tokio::test]
async fn update_of_missing_item_fails_without_writing() {
    let table = memory_table();
    let key = account_key(&unique_partition_key("acct"));

    let result = table.retrying_update_item(&key, deposit(1)).await;

    assert!(matches!(result, Err(TableError::ConditionalCheckFailed { .. })));
    let counts = table.client().call_counts();
    assert_eq!(counts.get_item, 1);
    assert_eq!(counts.put_item, 0);
}

#[tokio::test]
async fn upsert_inserts_then_updates() {
    let table = memory_table();
    let partition = unique_partition_key("acct");
    let key = account_key(&partition);
    let create = || {
        ready(Ok(Account {
            owner: partition.clone(),
            balance: 1,
            tags: Vec::new(),
        }))
    };

    let first = table
        .retrying_upsert_item(&key, create, deposit(5))
        .await
        .unwrap();
    assert_eq!(first.row_version(), 1);
    assert_eq!(first.row_value().balance, 1);

    let second = table
        .retrying_upsert_item(&key, create, deposit(5))
        .await
        .unwrap();
    assert_eq!(second.row_version(), 2);
    assert_eq!(second.row_value().balance, 6);
}

#[tokio::test]
async fn historical_row_follows_the_winning_attempt() {
    let account = account_item(&unique_partition_key("acct"), 100);
    let table = raced_table(&[&account], account.key(), 1, 10).await;

    let written = table
        .retrying_update_item_with_historical_row(account.key(), deposit(1), audit_row)
        .await
        .unwrap();

    assert_eq!(written.row_version(), 3);
    let partition = &account.key().partition_key;
    let inner = table.client().inner();
    assert!(inner.item(TEST_TABLE, partition, "audit#00000003").is_some());
    assert!(inner.item(TEST_TABLE, partition, "audit#00000002").is_none());
    assert_eq!(inner.call_counts().execute_transaction, 2);
}

#[tokio::test]
async fn historical_row_failure_is_not_retried() {
    let table = memory_table_with_config(
        TableConfig::new(TEST_TABLE).with_retry(RetryConfig::new(5)),
    );
    let account = account_item(&unique_partition_key("acct"), 100);
    table.insert_item(&account).await.unwrap();
    let next = account.create_updated_item(account.row_value().clone());
    table.insert_item(&audit_row(&next)).await.unwrap();

    let result = table
        .retrying_update_item_with_historical_row(account.key(), deposit(1), audit_row)
        .await;

    let Err(TableError::TransactionCanceled { reasons }) = result else {
        panic!("expected cancellation");
    };
    assert!(reasons[0].is_none());
    assert!(matches!(reasons[1], Some(TableError::DuplicateItem { .. })));
    assert_eq!(table.client().call_counts().execute_transaction, 1);
    let current: TypedItem<Account> = table.get_item(account.key()).await.unwrap().unwrap();
    assert_eq!(current.row_version(), 1);
}

#[tokio::test]
async fn upsert_with_historical_row_inserts_both() {
    let table = memory_table();
    let partition = unique_partition_key("acct");
    let key = account_key(&partition);

    let written = table
        .retrying_upsert_item_with_historical_row(
            &key,
            || {
                ready(Ok(Account {
                    owner: partition.clone(),
                    balance: 0,
                    tags: Vec::new(),
                }))
            },
            deposit(1),
            audit_row,
        )
        .await
        .unwrap();

    assert_eq!(written.row_version(), 1);
    assert!(table
        .client()
        .item(TEST_TABLE, &partition, "audit#00000001")
        .is_some());
}

#[tokio::test]
async fn failed_constraint_is_not_retried() {
    let table = memory_table_with_config(
        TableConfig::new(TEST_TABLE).with_retry(RetryConfig::new(5)),
    );
    let guard = account_item(&unique_partition_key("acct"), 100);
    table.insert_item(&guard).await.unwrap();
    let moved = guard.create_updated_item(guard.row_value().clone());
    table.update_item(&moved, &guard).await.unwrap();
    let target = account_item(&unique_partition_key("acct"), 0);
    table.insert_item(&target).await.unwrap();
    table.client().reset_call_counts();

    let result = table
        .retrying_transact_write(
            &[target.key().clone()],
            &[required(&guard)],
            |_, item: Option<TypedItem<Account>>| {
                ready(Ok::<_, TableError>(item.map(|existing| WriteEntry::Update {
                    new: existing.create_updated_item(existing.row_value().clone()),
                    existing,
                })))
            },
        )
        .await;

    assert!(matches!(result, Err(TableError::ConstraintFailure { .. })));
    assert_eq!(table.client().call_counts().execute_transaction, 1);
}

#[tokio::test]
async fn transact_write_retries_lost_races() {
    let existing = account_item(&unique_partition_key("acct"), 10);
    let missing = account_key(&unique_partition_key("acct"));
    let table = raced_table(&[&existing], existing.key(), 1, 10).await;

    table
        .retrying_transact_write(
            &[existing.key().clone(), missing.clone()],
            &no_constraints(),
            |key, item: Option<TypedItem<Account>>| {
                let entry = match item {
                    Some(current) => WriteEntry::Update {
                        new: current.create_updated_item(Account {
                            balance: current.row_value().balance + 5,
                            ..current.row_value().clone()
                        }),
                        existing: current,
                    },
                    None => WriteEntry::Insert {
                        new: TypedItem::new(
                            key.clone(),
                            Account {
                                owner: key.partition_key.clone(),
                                balance: 5,
                                tags: Vec::new(),
                            },
                        ),
                    },
                };
                ready(Ok::<_, TableError>(Some(entry)))
            },
        )
        .await
        .unwrap();

    assert_eq!(table.client().interferences(), 1);
    assert_eq!(table.client().inner().call_counts().execute_transaction, 2);
    let updated: TypedItem<Account> = table.get_item(existing.key()).await.unwrap().unwrap();
    assert_eq!(updated.row_version(), 3);
    assert_eq!(updated.row_value().balance, 15);
    let inserted: TypedItem<Account> = table.get_item(&missing).await.unwrap().unwrap();
    assert_eq!(inserted.row_value().balance, 5);
}

#[tokio::test]
async fn transact_write_offers_repeated_keys_once() {
    let existing = account_item(&unique_partition_key("acct"), 10);
    let table = raced_table(&[&existing], existing.key(), 0, 10).await;
    let calls = AtomicU32::new(0);

    table
        .retrying_transact_write(
            &[existing.key().clone(), existing.key().clone()],
            &no_constraints(),
            |_, item: Option<TypedItem<Account>>| {
                calls.fetch_add(1, Ordering::SeqCst);
                let entry = item.map(|current| WriteEntry::Update {
                    new: current.create_updated_item(Account {
                        balance: current.row_value().balance + 1,
                        ..current.row_value().clone()
                    }),
                    existing: current,
                });
                ready(Ok::<_, TableError>(entry))
            },
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let updated: TypedItem<Account> = table.get_item(existing.key()).await.unwrap().unwrap();
    assert_eq!(updated.row_version(), 2);
    assert_eq!(updated.row_value().balance, 11);
}

#[tokio::test]
async fn transact_write_skips_keys_without_entries() {
    let table = memory_table();
    let key = account_key(&unique_partition_key("acct"));

    table
        .retrying_transact_write(&[key.clone()], &no_constraints(), |_, _: Option<TypedItem<Account>>| {
            ready(Ok::<_, TableError>(None))
        })
        .await
        .unwrap();

    assert_eq!(table.client().call_counts().execute_transaction, 0);
    assert!(table.get_item::<Account>(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn transact_write_with_historical_rows_writes_pairs() {
    let first = account_item(&unique_partition_key("acct"), 1);
    let second = account_item(&unique_partition_key("acct"), 2);
    let table = raced_table(&[&first, &second], second.key(), 1, 10).await;

    table
        .retrying_transact_write_with_historical_rows(
            &[first.key().clone(), second.key().clone()],
            &no_constraints(),
            |_, item: Option<TypedItem<Account>>| {
                let pair = item.map(|current| {
                    let new = current.create_updated_item(current.row_value().clone());
                    let history = WriteEntry::Insert {
                        new: audit_row(&new),
                    };
                    (
                        WriteEntry::Update {
                            new,
                            existing: current,
                        },
                        Some(history),
                    )
                });
                ready(Ok::<_, TableError>(pair))
            },
        )
        .await
        .unwrap();

    let first_audit = CompositePrimaryKey::new(first.key().partition_key.clone(), "audit#00000002");
    let second_audit =
        CompositePrimaryKey::new(second.key().partition_key.clone(), "audit#00000003");
    assert!(stored(&table, &first_audit).is_some());
    assert!(stored(&table, &second_audit).is_some());
    assert_eq!(table.client().inner().items(TEST_TABLE).len(), 4);
}

#[tokio::test]
async fn transact_write_gives_up_after_bound() {
    let account = account_item(&unique_partition_key("acct"), 1);
    let table = raced_table(&[&account], account.key(), 10, 2).await;

    let result = table
        .retrying_transact_write(
            &[account.key().clone()],
            &no_constraints(),
            |_, item: Option<TypedItem<Account>>| {
                ready(Ok::<_, TableError>(item.map(|existing| WriteEntry::Update {
                    new: existing.create_updated_item(existing.row_value().clone()),
                    existing,
                })))
            },
        )
        .await;

    assert!(matches!(result, Err(TableError::ConcurrencyError { .. })));
    assert_eq!(table.client().inner().call_counts().execute_transaction, 2);
}
