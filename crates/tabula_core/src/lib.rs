//! # Tabula Core
//!
//! Typed single-table write engine with optimistic concurrency.
//!
//! Every row lives under a [`CompositePrimaryKey`] and carries a monotonic
//! row version, so writers can detect that another writer got there first.
//! This crate provides:
//! - [`TypedItem`], a row value wrapped with its key, version, dates and
//!   optional time to live
//! - [`TypeRegistry`] for decoding rows of several row types into one enum
//! - A diff engine and [`StatementBuilder`] that turn item changes into
//!   minimal `UPDATE`/`INSERT`/`DELETE`/`EXISTS` statements
//! - Conditional single-item writes, transactions of up to 100 entries with
//!   constraint entries, and best-effort bulk writes
//! - Retrying fetch-compute-write helpers, with optional historical rows
//!
//! ## Usage
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use tabula_client::InMemoryClient;
//! use tabula_core::{CompositePrimaryKey, CompositePrimaryKeyTable, RowType, TableConfig};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Account {
//!     balance: i64,
//! }
//!
//! impl RowType for Account {
//!     const ROW_TYPE: &'static str = "Account";
//! }
//!
//! # async fn run() -> tabula_core::TableResult<()> {
//! let table = CompositePrimaryKeyTable::new(
//!     InMemoryClient::new().with_table("ledger"),
//!     TableConfig::new("ledger"),
//! );
//!
//! let key = CompositePrimaryKey::new("account#1", "profile");
//! let updated = table
//!     .retrying_upsert_item(
//!         &key,
//!         || async { Ok(Account { balance: 0 }) },
//!         |current| async move {
//!             Ok(Account { balance: current.row_value().balance + 10 })
//!         },
//!     )
//!     .await?;
//! assert!(updated.row_version() >= 1);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bulk;
mod config;
mod diff;
mod error;
mod item;
mod query;
mod registry;
mod retry;
mod statement;
mod table;
mod transaction;
mod write;

pub use config::{RetryConfig, TableConfig};
pub use diff::{apply_differences, diff_attributes, item_differences, AttributeDifference};
pub use error::{TableError, TableResult};
pub use item::{
    row_type_of, CompositePrimaryKey, RowStatus, RowType, TimeToLive, TypedItem, CREATE_DATE,
    EXPIRE_DATE, LAST_UPDATED_DATE, PARTITION_KEY, RESERVED_ATTRIBUTES, ROW_TYPE, ROW_VERSION,
    SORT_KEY,
};
pub use query::QueryOptions;
pub use registry::{DecodeFn, TypeRegistry, TypeRegistryBuilder};
pub use statement::{LiteralRenderer, StatementBuilder};
pub use table::CompositePrimaryKeyTable;
pub use tabula_client::SortKeyCondition;
pub use transaction::{
    ConstraintEntryTransform, PolymorphicTransactionConstraintEntry, PolymorphicWriteEntry,
    TransactionConstraintEntry, WriteEntry, WriteEntryTransform,
};
