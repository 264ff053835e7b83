//! Bulk engine behavior against the in-memory backend.

use tabula_core::{TableConfig, TableError, TypedItem, WriteEntry};
use tabula_testkit::prelude::*;

#[tokio::test]
async fn one_failure_keeps_the_others() {
    let table = memory_table();
    let keys: Vec<String> = (0..3).map(|_| unique_partition_key("acct")).collect();
    table.insert_item(&account_item(&keys[1], 0)).await.unwrap();

    let entries: Vec<_> = keys
        .iter()
        .map(|key| WriteEntry::Insert {
            new: account_item(key, 7),
        })
        .collect();
    let result = table.bulk_write(&entries).await;

    let Err(TableError::BatchFailures { errors }) = result else {
        panic!("expected batch failures");
    };
    assert_eq!(errors.len(), 1);
    assert!(matches!(
        &errors[0],
        TableError::DuplicateItem { partition_key, .. } if *partition_key == keys[1]
    ));
    for key in [&keys[0], &keys[2]] {
        let stored: TypedItem<Account> = table.get_item(&account_key(key)).await.unwrap().unwrap();
        assert_eq!(stored.row_value().balance, 7);
    }
}

#[tokio::test]
async fn chunks_follow_configuration() {
    let table = memory_table_with_config(TableConfig::new(TEST_TABLE).with_batch_chunk_size(10));
    let entries: Vec<_> = (0..35)
        .map(|_| WriteEntry::Insert {
            new: account_item(&unique_partition_key("acct"), 1),
        })
        .collect();

    table.bulk_write(&entries).await.unwrap();
    assert_eq!(table.client().call_counts().batch_execute_statement, 4);
    assert_eq!(table.client().items(TEST_TABLE).len(), 35);
}

#[tokio::test]
async fn bulk_updates_check_versions() {
    let table = memory_table();
    let current = account_item(&unique_partition_key("acct"), 1);
    let stale = account_item(&unique_partition_key("acct"), 1);
    table.insert_item(&current).await.unwrap();
    table.insert_item(&stale).await.unwrap();
    let moved = stale.create_updated_item(stale.row_value().clone());
    table.update_item(&moved, &stale).await.unwrap();

    let bump = |item: &TypedItem<Account>| WriteEntry::Update {
        new: item.create_updated_item(Account {
            balance: 2,
            ..item.row_value().clone()
        }),
        existing: item.clone(),
    };
    let result = table.bulk_write(&[bump(&current), bump(&stale)]).await;

    let Err(TableError::BatchFailures { errors }) = result else {
        panic!("expected batch failures");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].is_conditional_check_failed());
    let stored: TypedItem<Account> = table.get_item(current.key()).await.unwrap().unwrap();
    assert_eq!(stored.row_version(), 2);
    assert_eq!(stored.row_value().balance, 2);
}

#[tokio::test]
async fn polymorphic_bulk_write_mixes_types() {
    let table = memory_table();
    let from = unique_partition_key("acct");
    let entries = vec![
        LedgerEntry::Account(WriteEntry::Insert {
            new: account_item(&from, 5),
        }),
        LedgerEntry::Transfer(WriteEntry::Insert {
            new: transfer_item(&from, "elsewhere", 1),
        }),
        LedgerEntry::Transfer(WriteEntry::Insert {
            new: transfer_item(&from, "elsewhere", 2),
        }),
    ];

    table.polymorphic_bulk_write(&entries).await.unwrap();
    let rows = table
        .polymorphic_execute_select(&[from.clone()], None, &ledger_registry())
        .await
        .unwrap();
    assert_eq!(rows.len(), 3);
    let transfers = rows
        .iter()
        .filter(|row| matches!(row, LedgerRow::Transfer(_)))
        .count();
    assert_eq!(transfers, 2);
}

#[tokio::test]
async fn long_rows_fall_back_to_single_writes() {
    let table = memory_table();
    let partition = unique_partition_key("acct");
    let wide = TypedItem::new(
        account_key(&partition),
        Account {
            owner: partition.clone(),
            balance: 1,
            tags: vec!["t".repeat(400); 25],
        },
    );
    let narrow = transfer_item(&partition, "elsewhere", 3);

    table
        .polymorphic_bulk_write(&[
            LedgerEntry::Account(WriteEntry::Insert { new: wide.clone() }),
            LedgerEntry::Transfer(WriteEntry::Insert { new: narrow }),
        ])
        .await
        .unwrap();

    let counts = table.client().call_counts();
    assert_eq!(counts.put_item, 1);
    assert_eq!(counts.batch_execute_statement, 1);
    let stored: TypedItem<Account> = table.get_item(wide.key()).await.unwrap().unwrap();
    assert_eq!(stored.row_value().tags.len(), 25);
}
