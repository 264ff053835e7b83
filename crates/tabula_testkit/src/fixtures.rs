//! Sample row types and table helpers.
//!
//! The fixtures model a small ledger: accounts, transfers between them and
//! audit rows recording past account states.

use serde::{Deserialize, Serialize};
use tabula_client::InMemoryClient;
use tabula_core::{
    CompositePrimaryKey, CompositePrimaryKeyTable, PolymorphicWriteEntry, RowType, TableConfig,
    TableResult, TransactionConstraintEntry, TypeRegistry, TypedItem, WriteEntry,
    WriteEntryTransform,
};
use uuid::Uuid;

/// Name of the table created by [`memory_table`].
pub const TEST_TABLE: &str = "ledger";

/// An account balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Owner name.
    pub owner: String,
    /// Balance in cents.
    pub balance: i64,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RowType for Account {
    const ROW_TYPE: &'static str = "Account";
}

/// A transfer between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Source account partition key.
    pub from: String,
    /// Destination account partition key.
    pub to: String,
    /// Amount in cents.
    pub amount: i64,
}

impl RowType for Transfer {
    const ROW_TYPE: &'static str = "Transfer";
}

/// A row of any ledger row type.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerRow {
    /// An account row.
    Account(TypedItem<Account>),
    /// A transfer row.
    Transfer(TypedItem<Transfer>),
}

/// A write entry of any ledger row type.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerEntry {
    /// Writes an account row.
    Account(WriteEntry<Account>),
    /// Writes a transfer row.
    Transfer(WriteEntry<Transfer>),
}

impl PolymorphicWriteEntry for LedgerEntry {
    fn handle<V: WriteEntryTransform>(&self, transform: &mut V) -> TableResult<V::Output> {
        match self {
            LedgerEntry::Account(entry) => transform.transform(entry),
            LedgerEntry::Transfer(entry) => transform.transform(entry),
        }
    }
}

/// Registry decoding both ledger row types.
pub fn ledger_registry() -> TypeRegistry<LedgerRow> {
    TypeRegistry::builder()
        .register::<Account>(LedgerRow::Account)
        .register::<Transfer>(LedgerRow::Transfer)
        .build()
}

/// A table named [`TEST_TABLE`] over a fresh in-memory client.
pub fn memory_table() -> CompositePrimaryKeyTable<InMemoryClient> {
    memory_table_with_config(TableConfig::new(TEST_TABLE))
}

/// Like [`memory_table`], with a custom configuration.
pub fn memory_table_with_config(config: TableConfig) -> CompositePrimaryKeyTable<InMemoryClient> {
    let client = InMemoryClient::new().with_table(config.table_name.clone());
    CompositePrimaryKeyTable::new(client, config)
}

/// A partition key no other test uses.
pub fn unique_partition_key(prefix: &str) -> String {
    format!("{prefix}#{}", Uuid::new_v4())
}

/// The key of an account's profile row.
pub fn account_key(partition_key: &str) -> CompositePrimaryKey {
    CompositePrimaryKey::new(partition_key, "profile")
}

/// A new account item under `partition_key`.
pub fn account_item(partition_key: &str, balance: i64) -> TypedItem<Account> {
    TypedItem::new(
        account_key(partition_key),
        Account {
            owner: partition_key.to_string(),
            balance,
            tags: Vec::new(),
        },
    )
}

/// A new transfer item under `from`'s partition.
pub fn transfer_item(from: &str, to: &str, amount: i64) -> TypedItem<Transfer> {
    TypedItem::new(
        CompositePrimaryKey::new(from, format!("transfer#{}", Uuid::new_v4())),
        Transfer {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        },
    )
}

/// The audit row recording `item`, keyed by its version.
pub fn audit_row(item: &TypedItem<Account>) -> TypedItem<Account> {
    TypedItem::new(
        CompositePrimaryKey::new(
            item.key().partition_key.clone(),
            format!("audit#{:08}", item.row_version()),
        ),
        item.row_value().clone(),
    )
}

/// A constraint that `item` is still stored unchanged.
pub fn required(item: &TypedItem<Account>) -> TransactionConstraintEntry<Account> {
    TransactionConstraintEntry::Required {
        existing: item.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_keys_differ() {
        assert_ne!(unique_partition_key("a"), unique_partition_key("a"));
        assert!(unique_partition_key("acct").starts_with("acct#"));
    }

    #[test]
    fn audit_rows_are_keyed_by_version() {
        let v1 = account_item("acct#1", 5);
        let v2 = v1.create_updated_item(Account {
            balance: 6,
            ..v1.row_value().clone()
        });
        assert_eq!(audit_row(&v1).key().sort_key, "audit#00000001");
        assert_eq!(audit_row(&v2).key().sort_key, "audit#00000002");
        assert_eq!(audit_row(&v2).row_version(), 1);
    }

    #[test]
    fn registry_knows_both_types() {
        let registry = ledger_registry();
        assert!(registry.contains("Account"));
        assert!(registry.contains("Transfer"));
        assert_eq!(registry.len(), 2);
    }
}
