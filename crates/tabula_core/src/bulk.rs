//! Best-effort bulk writes.
//!
//! Entries are compiled to statements and sent in chunks through batch
//! statement calls. Chunks run concurrently and are not atomic with respect
//! to each other. Per-item failures are collected across every chunk and
//! reported together as [`TableError::BatchFailures`]; items that succeeded
//! stay written.

use crate::error::{TableError, TableResult};
use crate::item::RowType;
use crate::table::CompositePrimaryKeyTable;
use crate::transaction::{CompiledEntry, EntryCompiler, PolymorphicWriteEntry, WriteEntry};
use futures::future::join_all;
use tabula_client::{BatchStatementRequest, TableClient};
use tracing::{debug, warn};

impl<C: TableClient> CompositePrimaryKeyTable<C> {
    /// Writes entries through batch statement calls.
    ///
    /// Statements longer than the backend accepts make their whole chunk
    /// fail; use [`CompositePrimaryKeyTable::bulk_write_with_fallback`] when
    /// that can happen.
    pub async fn bulk_write<T: RowType>(&self, entries: &[WriteEntry<T>]) -> TableResult<()> {
        self.run_bulk(entries, false).await
    }

    /// Writes entries through batch statement calls, sending any entry whose
    /// statement is too long through a single-item write instead.
    pub async fn bulk_write_with_fallback<T: RowType>(
        &self,
        entries: &[WriteEntry<T>],
    ) -> TableResult<()> {
        self.run_bulk(entries, true).await
    }

    /// Writes entries of several row types, with the same chunking and
    /// fallback as [`CompositePrimaryKeyTable::bulk_write_with_fallback`].
    pub async fn polymorphic_bulk_write<E: PolymorphicWriteEntry>(
        &self,
        entries: &[E],
    ) -> TableResult<()> {
        self.run_bulk(entries, true).await
    }

    async fn run_bulk<E: PolymorphicWriteEntry>(
        &self,
        entries: &[E],
        fallback: bool,
    ) -> TableResult<()> {
        let statements = self.statements();
        let mut compiler = EntryCompiler {
            encoder: &self.encoder,
            statements: &statements,
        };

        let mut errors = Vec::new();
        let mut batched = Vec::with_capacity(entries.len());
        let mut oversize = Vec::new();
        for entry in entries {
            match entry.handle(&mut compiler) {
                Ok(compiled)
                    if fallback
                        && compiled.statement.chars().count() > self.config.max_statement_length =>
                {
                    oversize.push(compiled)
                }
                Ok(compiled) => batched.push(compiled),
                Err(e) => errors.push(e),
            }
        }

        let chunk_size = self.config.batch_chunk_size.max(1);
        let chunks = join_all(
            batched
                .chunks(chunk_size)
                .map(|chunk| self.execute_batch_chunk(chunk)),
        )
        .await;
        errors.extend(chunks.into_iter().flatten());

        if !oversize.is_empty() {
            debug!(count = oversize.len(), "writing oversize entries individually");
            let results = join_all(
                oversize
                    .into_iter()
                    .map(|compiled| self.execute_single(compiled.single)),
            )
            .await;
            errors.extend(results.into_iter().filter_map(Result::err));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            warn!(
                failed = errors.len(),
                total = entries.len(),
                "bulk write had failures"
            );
            Err(TableError::BatchFailures { errors })
        }
    }

    /// Sends one chunk, returning its per-item errors.
    ///
    /// A failed call counts as a failure of every item in the chunk.
    async fn execute_batch_chunk(&self, chunk: &[CompiledEntry]) -> Vec<TableError> {
        match self.send_batch_chunk(chunk).await {
            Ok(errors) => errors,
            Err(TableError::Client(error)) => {
                warn!(size = chunk.len(), %error, "batch chunk call failed");
                chunk
                    .iter()
                    .map(|_| TableError::Client(error.clone()))
                    .collect()
            }
            Err(error) => {
                warn!(size = chunk.len(), %error, "batch chunk call failed");
                vec![error]
            }
        }
    }

    async fn send_batch_chunk(&self, chunk: &[CompiledEntry]) -> TableResult<Vec<TableError>> {
        let requests = chunk
            .iter()
            .map(|compiled| BatchStatementRequest {
                statement: compiled.statement.clone(),
                consistent_read: self.config.consistent_read,
            })
            .collect();
        let responses = self.client.batch_execute_statement(requests).await?;
        if responses.len() != chunk.len() {
            return Err(TableError::unexpected_response(format!(
                "batch of {} statements returned {} responses",
                chunk.len(),
                responses.len()
            )));
        }

        let errors: Vec<TableError> = chunk
            .iter()
            .zip(responses)
            .filter_map(|(compiled, response)| {
                response.error.map(|error| {
                    TableError::from_error_code(&error.code, error.message, &compiled.key)
                })
            })
            .collect();
        if !errors.is_empty() {
            debug!(failed = errors.len(), size = chunk.len(), "batch chunk had failures");
        }
        Ok(errors)
    }
}
