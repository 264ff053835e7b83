//! Atomic multi-item transactions.
//!
//! Each [`WriteEntry`] compiles to one statement and each
//! [`TransactionConstraintEntry`] to one condition-only assertion. The whole
//! list is submitted as one backend transaction: either every statement
//! applies or none does.
//!
//! Entry lists mixing several row types use the polymorphic traits. A closed
//! enum of entries implements [`PolymorphicWriteEntry`] by dispatching each
//! variant to a [`WriteEntryTransform`], which is generic over the row type:
//!
//! ```rust,ignore
//! enum Entry {
//!     Customer(WriteEntry<Customer>),
//!     Order(WriteEntry<Order>),
//! }
//!
//! impl PolymorphicWriteEntry for Entry {
//!     fn handle<V: WriteEntryTransform>(&self, transform: &mut V) -> TableResult<V::Output> {
//!         match self {
//!             Entry::Customer(entry) => transform.transform(entry),
//!             Entry::Order(entry) => transform.transform(entry),
//!         }
//!     }
//! }
//! ```

use crate::diff::item_differences;
use crate::error::{TableError, TableResult};
use crate::item::{CompositePrimaryKey, RowType, TypedItem};
use crate::statement::StatementBuilder;
use crate::table::{CompositePrimaryKeyTable, SingleWrite};
use tabula_client::{ClientError, ExecuteTransactionRequest, TableClient};
use tabula_codec::AttributeEncoder;
use tracing::{debug, warn};

/// One write of a transaction or bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteEntry<T> {
    /// Insert a new item; fails if the key is taken.
    Insert {
        /// The item to insert.
        new: TypedItem<T>,
    },
    /// Update an item that must still be stored unchanged.
    Update {
        /// The next version.
        new: TypedItem<T>,
        /// The version read before.
        existing: TypedItem<T>,
    },
    /// Delete whatever is stored at a key.
    DeleteAtKey {
        /// The key to delete.
        key: CompositePrimaryKey,
    },
    /// Delete an item that must still be stored unchanged.
    DeleteItem {
        /// The version read before.
        existing: TypedItem<T>,
    },
}

impl<T> WriteEntry<T> {
    /// Returns the key this entry writes.
    pub fn key(&self) -> &CompositePrimaryKey {
        match self {
            WriteEntry::Insert { new } | WriteEntry::Update { new, .. } => new.key(),
            WriteEntry::DeleteAtKey { key } => key,
            WriteEntry::DeleteItem { existing } => existing.key(),
        }
    }
}

/// A transaction participant that asserts state without writing.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionConstraintEntry<T> {
    /// The item must exist with this version.
    Required {
        /// The version read before.
        existing: TypedItem<T>,
    },
}

impl<T> TransactionConstraintEntry<T> {
    /// Returns the key this constraint checks.
    pub fn key(&self) -> &CompositePrimaryKey {
        match self {
            TransactionConstraintEntry::Required { existing } => existing.key(),
        }
    }
}

/// An operation applied to a write entry of any row type.
pub trait WriteEntryTransform {
    /// What the operation produces.
    type Output;

    /// Applies the operation to one entry.
    fn transform<T: RowType>(&mut self, entry: &WriteEntry<T>) -> TableResult<Self::Output>;
}

/// An operation applied to a constraint entry of any row type.
pub trait ConstraintEntryTransform {
    /// What the operation produces.
    type Output;

    /// Applies the operation to one constraint.
    fn transform<T: RowType>(
        &mut self,
        entry: &TransactionConstraintEntry<T>,
    ) -> TableResult<Self::Output>;
}

/// A write entry over a closed set of row types.
pub trait PolymorphicWriteEntry {
    /// Dispatches this entry to `transform` with its concrete row type.
    fn handle<V: WriteEntryTransform>(&self, transform: &mut V) -> TableResult<V::Output>;
}

/// A constraint entry over a closed set of row types.
pub trait PolymorphicTransactionConstraintEntry {
    /// Dispatches this constraint to `transform` with its concrete row type.
    fn handle<V: ConstraintEntryTransform>(&self, transform: &mut V) -> TableResult<V::Output>;
}

impl<T: RowType> PolymorphicWriteEntry for WriteEntry<T> {
    fn handle<V: WriteEntryTransform>(&self, transform: &mut V) -> TableResult<V::Output> {
        transform.transform(self)
    }
}

impl<T: RowType> PolymorphicTransactionConstraintEntry for TransactionConstraintEntry<T> {
    fn handle<V: ConstraintEntryTransform>(&self, transform: &mut V) -> TableResult<V::Output> {
        transform.transform(self)
    }
}

/// A write entry compiled for submission.
#[derive(Debug, Clone)]
pub(crate) struct CompiledEntry {
    pub(crate) key: CompositePrimaryKey,
    pub(crate) statement: String,
    pub(crate) single: SingleWrite,
}

/// Compiles entries into statements plus single-item fallbacks.
pub(crate) struct EntryCompiler<'a> {
    pub(crate) encoder: &'a AttributeEncoder,
    pub(crate) statements: &'a StatementBuilder,
}

impl WriteEntryTransform for EntryCompiler<'_> {
    type Output = CompiledEntry;

    fn transform<T: RowType>(&mut self, entry: &WriteEntry<T>) -> TableResult<CompiledEntry> {
        let (statement, single) = match entry {
            WriteEntry::Insert { new } => (
                self.statements.insert(&new.encode(self.encoder)?)?,
                SingleWrite::insert(self.encoder, new)?,
            ),
            WriteEntry::Update { new, existing } => {
                let single = SingleWrite::update(self.encoder, new, existing)?;
                let differences = item_differences(self.encoder, new, existing)?;
                let statement =
                    self.statements
                        .update(existing.key(), existing.row_version(), &differences)?;
                (statement, single)
            }
            WriteEntry::DeleteAtKey { key } => (
                self.statements.delete(key, None),
                SingleWrite::delete_at_key(key),
            ),
            WriteEntry::DeleteItem { existing } => (
                self.statements
                    .delete(existing.key(), Some(existing.row_version())),
                SingleWrite::delete_item(existing),
            ),
        };
        Ok(CompiledEntry {
            key: entry.key().clone(),
            statement,
            single,
        })
    }
}

impl ConstraintEntryTransform for EntryCompiler<'_> {
    type Output = (CompositePrimaryKey, String);

    fn transform<T: RowType>(
        &mut self,
        entry: &TransactionConstraintEntry<T>,
    ) -> TableResult<(CompositePrimaryKey, String)> {
        match entry {
            TransactionConstraintEntry::Required { existing } => Ok((
                existing.key().clone(),
                self.statements
                    .exists(existing.key(), existing.row_version()),
            )),
        }
    }
}

impl<C: TableClient> CompositePrimaryKeyTable<C> {
    /// Writes entries of one row type atomically.
    pub async fn transact_write<T: RowType>(&self, entries: &[WriteEntry<T>]) -> TableResult<()> {
        self.polymorphic_transact_write::<_, TransactionConstraintEntry<T>>(entries, &[])
            .await
    }

    /// Writes entries atomically, provided every constraint holds.
    pub async fn transact_write_with_constraints<T: RowType, U: RowType>(
        &self,
        entries: &[WriteEntry<T>],
        constraints: &[TransactionConstraintEntry<U>],
    ) -> TableResult<()> {
        self.polymorphic_transact_write(entries, constraints).await
    }

    /// Writes entries of several row types atomically, provided every
    /// constraint holds.
    ///
    /// Fails with [`TableError::ItemCollectionSizeLimitExceeded`] before any
    /// backend call if entries and constraints together exceed the
    /// configured maximum. On cancellation, fails with
    /// [`TableError::TransactionCanceled`] carrying one reason per entry
    /// followed by one per constraint.
    pub async fn polymorphic_transact_write<E, K>(
        &self,
        entries: &[E],
        constraints: &[K],
    ) -> TableResult<()>
    where
        E: PolymorphicWriteEntry,
        K: PolymorphicTransactionConstraintEntry,
    {
        let attempted = entries.len() + constraints.len();
        if attempted > self.config.max_transaction_size {
            return Err(TableError::ItemCollectionSizeLimitExceeded {
                attempted,
                max: self.config.max_transaction_size,
            });
        }
        if attempted == 0 {
            return Ok(());
        }

        let statements = self.statements();
        let mut compiler = EntryCompiler {
            encoder: &self.encoder,
            statements: &statements,
        };
        let mut keys = Vec::with_capacity(attempted);
        let mut texts = Vec::with_capacity(attempted);
        for entry in entries {
            let compiled = entry.handle(&mut compiler)?;
            keys.push(compiled.key);
            texts.push(compiled.statement);
        }
        for constraint in constraints {
            let (key, text) = constraint.handle(&mut compiler)?;
            keys.push(key);
            texts.push(text);
        }

        debug!(
            entries = entries.len(),
            constraints = constraints.len(),
            "submitting transaction"
        );
        let result = self
            .client
            .execute_transaction(ExecuteTransactionRequest {
                statements: texts,
                client_request_token: None,
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(ClientError::TransactionCanceled { reasons }) => {
                let reasons: Vec<Option<TableError>> = keys
                    .iter()
                    .enumerate()
                    .map(|(position, key)| {
                        reasons.get(position).and_then(Option::as_ref).map(|reason| {
                            TableError::from_error_code(&reason.code, reason.message.clone(), key)
                        })
                    })
                    .collect();
                warn!(
                    failed = reasons.iter().filter(|r| r.is_some()).count(),
                    total = reasons.len(),
                    "transaction canceled"
                );
                Err(TableError::TransactionCanceled { reasons })
            }
            Err(ClientError::TransactionConflict { message }) => {
                Err(TableError::TransactionConflict { message })
            }
            Err(ClientError::InternalServerError { message }) => {
                Err(TableError::InternalServerError { message })
            }
            Err(other) => Err(other.into()),
        }
    }
}
