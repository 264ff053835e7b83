//! # Tabula Client
//!
//! Backend client capability for Tabula.
//!
//! This crate provides:
//! - The [`TableClient`] trait: the eight remote calls the write engine needs
//!   (`put_item`, `get_item`, `delete_item`, `query`, `batch_get_item`,
//!   `batch_execute_statement`, `execute_statement`, `execute_transaction`)
//! - Request/response types exchanged as attribute maps
//! - The closed [`ClientError`] set and backend [`ErrorCode`]s
//! - [`InMemoryClient`], a reference backend that executes the PartiQL-like
//!   statements Tabula produces, for tests and local development
//!
//! ## Invariants
//!
//! - Conditional writes are evaluated atomically against current state
//! - Transaction cancellation reasons are positional: reason `i` belongs to
//!   statement `i`
//! - Batch statement responses are positional and carry per-item errors

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod error;
mod memory;
mod statement;
mod types;

pub use client::TableClient;
pub use error::{CancellationReason, ClientError, ClientResult, ErrorCode};
pub use memory::{CallCounts, InMemoryClient, InMemoryClientConfig};
pub use statement::{parse_statement, Comparison, Projection, Statement, Term};
pub use types::{
    BatchGetItemOutput, BatchGetItemRequest, BatchStatementError, BatchStatementRequest,
    BatchStatementResponse, Condition, DeleteItemRequest, ExecuteStatementOutput,
    ExecuteStatementRequest, ExecuteTransactionRequest, GetItemOutput, GetItemRequest,
    PutItemRequest, QueryOutput, QueryRequest, SortKeyCondition,
};
