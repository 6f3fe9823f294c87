//! In-process warehouse with snapshot rollback and primary-key enforcement.
//!
//! Backs `--dry-run` and the load tests. Every statement attempt is recorded
//! in a log so tests can assert protocol order.

use super::table::{Statement, TableName};
use super::{LoadError, Warehouse};
use crate::record::CanonicalRecord;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

type Rows = BTreeMap<(String, NaiveDate), CanonicalRecord>;

#[derive(Debug, Clone, Default)]
struct State {
    schemas: BTreeSet<String>,
    tables: BTreeMap<String, Rows>,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFailure {
    kind: &'static str,
    nth: usize,
    seen: usize,
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: State,
    /// State as of `BEGIN`; `Some` while a transaction is open.
    snapshot: Option<State>,
    log: Vec<String>,
    failure: Option<InjectedFailure>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `nth` (1-based) statement of `kind` (`"DELETE"`, `"INSERT"`,
    /// `"CREATE TABLE"`, `"COMMIT"`, ...) fail.
    pub fn fail_on(mut self, kind: &'static str, nth: usize) -> Self {
        self.failure = Some(InjectedFailure { kind, nth, seen: 0 });
        self
    }

    /// Current rows of `table`, ordered by (symbol, date). Empty when the
    /// table does not exist.
    pub fn rows(&self, table: &TableName) -> Vec<CanonicalRecord> {
        self.state
            .tables
            .get(&table.to_string())
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn table_exists(&self, table: &TableName) -> bool {
        self.state.tables.contains_key(&table.to_string())
    }

    pub fn in_transaction(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Statement kinds attempted so far, including `BEGIN`/`COMMIT`/`ROLLBACK`.
    pub fn statement_log(&self) -> &[String] {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    fn record(&mut self, kind: &'static str) -> Result<(), String> {
        self.log.push(kind.to_string());
        if let Some(f) = self.failure.as_mut() {
            if f.kind == kind {
                f.seen += 1;
                if f.seen == f.nth {
                    return Err(format!("injected failure on {kind} #{}", f.nth));
                }
            }
        }
        Ok(())
    }

    fn table_mut(&mut self, table: &TableName) -> Result<&mut Rows, String> {
        self.state
            .tables
            .get_mut(&table.to_string())
            .ok_or_else(|| format!("table {table} does not exist"))
    }

    fn apply(&mut self, statement: &Statement<'_>) -> Result<usize, LoadError> {
        match *statement {
            Statement::CreateSchema(schema) => {
                self.state.schemas.insert(schema.to_string());
                Ok(0)
            }
            Statement::CreateTable(table) => {
                if let Some(schema) = table.schema() {
                    if !self.state.schemas.contains(&schema) {
                        return Err(LoadError::Ddl {
                            table: table.to_string(),
                            message: format!("schema {schema} does not exist"),
                        });
                    }
                }
                self.state.tables.entry(table.to_string()).or_default();
                Ok(0)
            }
            Statement::DeleteAll(table) => {
                let rows = self.table_mut(table).map_err(|message| LoadError::Statement {
                    statement: statement.kind(),
                    table: table.to_string(),
                    message,
                })?;
                let deleted = rows.len();
                rows.clear();
                Ok(deleted)
            }
            Statement::Insert { table, rows } => {
                let existing = self.table_mut(table).map_err(|message| LoadError::Statement {
                    statement: statement.kind(),
                    table: table.to_string(),
                    message,
                })?;
                // A failed statement leaves no trace, as in a SQL engine.
                let mut staged = existing.clone();
                for row in rows {
                    let key = (row.ticker.clone(), row.date);
                    if staged.contains_key(&key) {
                        return Err(LoadError::Constraint {
                            table: table.to_string(),
                            message: format!(
                                "duplicate primary key (symbol, date) = ({}, {})",
                                row.ticker, row.date
                            ),
                        });
                    }
                    staged.insert(key, row.clone());
                }
                *existing = staged;
                Ok(rows.len())
            }
        }
    }
}

impl Warehouse for MemoryWarehouse {
    fn name(&self) -> &str {
        "memory"
    }

    fn begin(&mut self) -> Result<(), LoadError> {
        self.record("BEGIN").map_err(|message| LoadError::Transaction {
            operation: "BEGIN",
            message,
        })?;
        if self.snapshot.is_some() {
            return Err(LoadError::Transaction {
                operation: "BEGIN",
                message: "a transaction is already active".into(),
            });
        }
        self.snapshot = Some(self.state.clone());
        Ok(())
    }

    fn execute(&mut self, statement: &Statement<'_>) -> Result<usize, LoadError> {
        let kind = statement.kind();
        if let Err(message) = self.record(kind) {
            let table = match *statement {
                Statement::CreateSchema(schema) => schema.to_string(),
                Statement::CreateTable(t) | Statement::DeleteAll(t) => t.to_string(),
                Statement::Insert { table, .. } => table.to_string(),
            };
            return Err(if statement.is_ddl() {
                LoadError::Ddl { table, message }
            } else {
                LoadError::Statement {
                    statement: kind,
                    table,
                    message,
                }
            });
        }
        self.apply(statement)
    }

    fn commit(&mut self) -> Result<(), LoadError> {
        self.record("COMMIT").map_err(|message| LoadError::Transaction {
            operation: "COMMIT",
            message,
        })?;
        match self.snapshot.take() {
            Some(_) => Ok(()),
            None => Err(LoadError::Transaction {
                operation: "COMMIT",
                message: "no transaction is active".into(),
            }),
        }
    }

    fn rollback(&mut self) -> Result<(), LoadError> {
        self.record("ROLLBACK").map_err(|message| LoadError::Transaction {
            operation: "ROLLBACK",
            message,
        })?;
        match self.snapshot.take() {
            Some(before) => {
                self.state = before;
                Ok(())
            }
            None => Err(LoadError::Transaction {
                operation: "ROLLBACK",
                message: "no transaction is active".into(),
            }),
        }
    }
}
