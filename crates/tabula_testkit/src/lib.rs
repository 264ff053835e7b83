//! # Tabula Testkit
//!
//! Test utilities for Tabula.
//!
//! This crate provides:
//! - Sample row types, a polymorphic row enum and its registry
//! - Helpers for in-memory tables and unique keys
//! - [`SimulateConcurrencyClient`], a client wrapper that plays a competing
//!   writer before the first few writes
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tabula_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn deposit() {
//!     let table = memory_table();
//!     let account = account_item("alice", 10);
//!     table.insert_item(&account).await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod concurrency;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::concurrency::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use concurrency::*;
pub use fixtures::*;
pub use generators::*;
