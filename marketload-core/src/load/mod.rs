//! LoadCoordinator: atomic full-refresh of the target table.
//!
//! One transaction per run:
//! `BEGIN` → create-if-absent → `DELETE FROM t` → batched `INSERT`s → `COMMIT`.
//! Any failure after `BEGIN` rolls back and surfaces the original error, so
//! the table is either fully replaced or left exactly as it was.

pub mod duck;
pub mod memory;
pub mod table;
pub mod warehouse;

pub use duck::DuckDbWarehouse;
pub use memory::MemoryWarehouse;
pub use table::{Statement, TableName, TABLE_COLUMNS};
pub use warehouse::{TransactionScope, Warehouse};

use crate::artifact::{self, ArtifactError};
use crate::record::CanonicalRecord;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};

/// Rows per INSERT statement unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Errors raised while loading the target table.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid table name '{name}': {reason}")]
    InvalidTable { name: String, reason: String },

    #[error("open warehouse {target}: {message}")]
    Connection { target: String, message: String },

    #[error("DDL failed for {table}: {message}")]
    Ddl { table: String, message: String },

    #[error("constraint violation on {table}: {message}")]
    Constraint { table: String, message: String },

    #[error("{statement} on {table} failed: {message}")]
    Statement {
        statement: &'static str,
        table: String,
        message: String,
    },

    #[error("{operation} failed: {message}")]
    Transaction {
        operation: &'static str,
        message: String,
    },

    #[error("refusing to replace {table} with an empty record set")]
    EmptyArtifact { table: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Outcome of a committed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub table: String,
    pub rows_deleted: usize,
    pub rows_inserted: usize,
    pub batches: usize,
}

/// Replaces the target table's contents with a canonical record set.
#[derive(Debug, Clone)]
pub struct LoadCoordinator {
    table: TableName,
    batch_size: usize,
}

impl LoadCoordinator {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Read a canonical artifact and load it.
    pub fn load_artifact<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        path: &Path,
    ) -> Result<LoadSummary, LoadError> {
        let records = artifact::read_canonical(path)?;
        debug!(path = %path.display(), rows = records.len(), "read canonical artifact");
        self.load(warehouse, &records)
    }

    /// Replace the table's contents with `records` in one transaction.
    pub fn load<W: Warehouse + ?Sized>(
        &self,
        warehouse: &mut W,
        records: &[CanonicalRecord],
    ) -> Result<LoadSummary, LoadError> {
        let table = self.table.to_string();
        if records.is_empty() {
            return Err(LoadError::EmptyArtifact { table });
        }
        let _span = info_span!("load", %table, warehouse = warehouse.name()).entered();

        let mut tx = TransactionScope::begin(warehouse)?;
        match self.replace_contents(&mut tx, records) {
            Ok((rows_deleted, rows_inserted, batches)) => {
                tx.commit()?;
                info!(rows_deleted, rows_inserted, batches, "table replaced");
                Ok(LoadSummary {
                    table,
                    rows_deleted,
                    rows_inserted,
                    batches,
                })
            }
            Err(e) => {
                warn!(error = %e, "load failed, rolling back");
                if let Err(rb) = tx.rollback() {
                    error!(error = %rb, "rollback failed");
                }
                Err(e)
            }
        }
    }

    fn replace_contents<W: Warehouse + ?Sized>(
        &self,
        tx: &mut TransactionScope<'_, W>,
        records: &[CanonicalRecord],
    ) -> Result<(usize, usize, usize), LoadError> {
        if let Some(schema) = self.table.schema() {
            tx.execute(&Statement::CreateSchema(&schema))?;
        }
        tx.execute(&Statement::CreateTable(&self.table))?;

        let deleted = tx.execute(&Statement::DeleteAll(&self.table))?;
        debug!(deleted, "cleared table");

        let mut inserted = 0;
        let mut batches = 0;
        for (batch, rows) in records.chunks(self.batch_size).enumerate() {
            inserted += tx.execute(&Statement::Insert {
                table: &self.table,
                rows,
            })?;
            batches += 1;
            debug!(batch, rows = rows.len(), "inserted batch");
        }
        Ok((deleted, inserted, batches))
    }
}
