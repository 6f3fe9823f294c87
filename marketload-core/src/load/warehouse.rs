//! Warehouse seam and the transaction guard the load protocol runs inside.

use super::table::Statement;
use super::LoadError;
use tracing::{debug, error, warn};

/// Transactional store that owns the target table.
///
/// Implementations execute one [`Statement`] at a time and expose explicit
/// transaction control. They are handed to the coordinator by the caller; the
/// coordinator never opens connections itself.
pub trait Warehouse {
    /// Short identifier for logs (`duckdb:path`, `memory`).
    fn name(&self) -> &str;

    fn begin(&mut self) -> Result<(), LoadError>;

    /// Execute a statement, returning the number of rows it affected.
    fn execute(&mut self, statement: &Statement<'_>) -> Result<usize, LoadError>;

    fn commit(&mut self) -> Result<(), LoadError>;

    fn rollback(&mut self) -> Result<(), LoadError>;
}

/// An open transaction on a [`Warehouse`].
///
/// Dropping the scope without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls back, so early returns and panics
/// unwinding through the load never leave a transaction open.
pub struct TransactionScope<'w, W: Warehouse + ?Sized> {
    warehouse: &'w mut W,
    open: bool,
}

impl<'w, W: Warehouse + ?Sized> TransactionScope<'w, W> {
    pub fn begin(warehouse: &'w mut W) -> Result<Self, LoadError> {
        warehouse.begin()?;
        debug!(warehouse = warehouse.name(), "BEGIN");
        Ok(Self {
            warehouse,
            open: true,
        })
    }

    pub fn execute(&mut self, statement: &Statement<'_>) -> Result<usize, LoadError> {
        self.warehouse.execute(statement)
    }

    /// Commit. If the commit itself fails the transaction is rolled back
    /// before the commit error is returned.
    pub fn commit(mut self) -> Result<(), LoadError> {
        self.open = false;
        match self.warehouse.commit() {
            Ok(()) => {
                debug!(warehouse = self.warehouse.name(), "COMMIT");
                Ok(())
            }
            Err(e) => {
                if let Err(rb) = self.warehouse.rollback() {
                    debug!(error = %rb, "rollback after failed commit");
                }
                Err(e)
            }
        }
    }

    pub fn rollback(mut self) -> Result<(), LoadError> {
        self.open = false;
        self.warehouse.rollback()?;
        debug!(warehouse = self.warehouse.name(), "ROLLBACK");
        Ok(())
    }
}

impl<W: Warehouse + ?Sized> Drop for TransactionScope<'_, W> {
    fn drop(&mut self) {
        if !self.open {
            return;
        }
        warn!(
            warehouse = self.warehouse.name(),
            "transaction dropped without commit, rolling back"
        );
        if let Err(e) = self.warehouse.rollback() {
            error!(error = %e, "rollback on drop failed");
        }
    }
}
