//! Reading mixed row types back through a type registry.

use serde::{Deserialize, Serialize};
use tabula_core::{
    QueryOptions, RowType, SortKeyCondition, TableError, TypeRegistry, TypedItem,
};
use tabula_testkit::prelude::*;

/// An older account shape stored under a retired tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LegacyAccount {
    owner: String,
    balance: i64,
}

impl RowType for LegacyAccount {
    const ROW_TYPE: &'static str = "LegacyAccount";
}

fn accounts_only(fallback: bool) -> TypeRegistry<LedgerRow> {
    TypeRegistry::builder()
        .register::<Account>(LedgerRow::Account)
        .with_single_variant_fallback(fallback)
        .build()
}

#[tokio::test]
async fn query_decodes_each_row_by_tag() {
    let table = memory_table();
    let partition = unique_partition_key("acct");
    table.insert_item(&account_item(&partition, 3)).await.unwrap();
    for amount in [1, 2] {
        table
            .insert_item(&transfer_item(&partition, "other", amount))
            .await
            .unwrap();
    }

    let (rows, token) = table
        .polymorphic_query(&partition, &QueryOptions::new(), &ledger_registry())
        .await
        .unwrap();
    assert!(token.is_none());
    assert_eq!(rows.len(), 3);
    assert!(matches!(rows[0], LedgerRow::Account(_)));

    let (transfers, _) = table
        .polymorphic_query(
            &partition,
            &QueryOptions::new()
                .with_sort_key_condition(SortKeyCondition::BeginsWith("transfer#".into())),
            &ledger_registry(),
        )
        .await
        .unwrap();
    assert_eq!(transfers.len(), 2);
}

#[tokio::test]
async fn batch_read_returns_found_keys_only() {
    let table = memory_table();
    let present = account_item(&unique_partition_key("acct"), 1);
    let transfer = transfer_item(&present.key().partition_key, "other", 9);
    table.insert_item(&present).await.unwrap();
    table.insert_item(&transfer).await.unwrap();
    let absent = account_key(&unique_partition_key("acct"));

    let rows = table
        .get_polymorphic_items(
            &[present.key().clone(), transfer.key().clone(), absent.clone()],
            &ledger_registry(),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(
        rows.get(transfer.key()),
        Some(&LedgerRow::Transfer(transfer.clone()))
    );
    assert!(!rows.contains_key(&absent));
}

#[tokio::test]
async fn unknown_tag_is_rejected_without_fallback() {
    let table = memory_table();
    let partition = unique_partition_key("acct");
    let legacy = TypedItem::new(
        account_key(&partition),
        LegacyAccount {
            owner: partition.clone(),
            balance: 4,
        },
    );
    table.insert_item(&legacy).await.unwrap();

    let result = table
        .get_polymorphic_items(&[legacy.key().clone()], &accounts_only(false))
        .await;
    assert!(matches!(
        result,
        Err(TableError::UnexpectedType { provided }) if provided == "LegacyAccount"
    ));
}

#[tokio::test]
async fn single_variant_fallback_decodes_unknown_tag() {
    let table = memory_table();
    let partition = unique_partition_key("acct");
    let legacy = TypedItem::new(
        account_key(&partition),
        LegacyAccount {
            owner: partition.clone(),
            balance: 4,
        },
    );
    table.insert_item(&legacy).await.unwrap();

    let rows = table
        .get_polymorphic_items(&[legacy.key().clone()], &accounts_only(true))
        .await
        .unwrap();
    let Some(LedgerRow::Account(account)) = rows.get(legacy.key()) else {
        panic!("expected an account row");
    };
    assert_eq!(account.row_value().balance, 4);
    assert!(account.row_value().tags.is_empty());
}

#[tokio::test]
async fn typed_read_of_wrong_tag_fails() {
    let table = memory_table();
    let transfer = transfer_item(&unique_partition_key("acct"), "other", 1);
    table.insert_item(&transfer).await.unwrap();

    let result = table.get_item::<Account>(transfer.key()).await;
    assert!(matches!(result, Err(TableError::TypeMismatch { .. })));
}

#[tokio::test]
async fn query_pages_resume_from_token() {
    let table = memory_table();
    let partition = unique_partition_key("acct");
    for amount in 0..5 {
        table
            .insert_item(&transfer_item(&partition, "other", amount))
            .await
            .unwrap();
    }

    let (first, token) = table
        .query::<Transfer>(&partition, &QueryOptions::new().with_limit(3))
        .await
        .unwrap();
    assert_eq!(first.len(), 3);
    let token = token.unwrap();

    let (rest, token) = table
        .query::<Transfer>(
            &partition,
            &QueryOptions::new().with_limit(3).with_exclusive_start(token),
        )
        .await
        .unwrap();
    assert_eq!(rest.len(), 2);
    assert!(token.is_none());

    let all = table.query_all::<Transfer>(&partition, None).await.unwrap();
    assert_eq!(all.len(), 5);
}
