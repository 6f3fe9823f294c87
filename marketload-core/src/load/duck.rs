//! DuckDB-backed warehouse.

use super::table::{Statement, TableName};
use super::{LoadError, Warehouse};
use crate::record::CanonicalRecord;
use chrono::NaiveDate;
use duckdb::{Connection, ToSql};
use std::path::Path;

/// A DuckDB connection owned for the duration of one run.
pub struct DuckDbWarehouse {
    conn: Connection,
    name: String,
}

impl DuckDbWarehouse {
    /// Open (or create) a database file.
    pub fn open(path: &Path) -> Result<Self, LoadError> {
        let conn = Connection::open(path).map_err(|e| LoadError::Connection {
            target: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            conn,
            name: format!("duckdb:{}", path.display()),
        })
    }

    pub fn open_in_memory() -> Result<Self, LoadError> {
        let conn = Connection::open_in_memory().map_err(|e| LoadError::Connection {
            target: ":memory:".into(),
            message: e.to_string(),
        })?;
        Ok(Self {
            conn,
            name: "duckdb:memory".into(),
        })
    }

    /// Rows of `table` ordered by (symbol, date).
    pub fn snapshot(&self, table: &TableName) -> Result<Vec<CanonicalRecord>, LoadError> {
        let query_error = |e: duckdb::Error| LoadError::Statement {
            statement: "SELECT",
            table: table.to_string(),
            message: e.to_string(),
        };

        let sql = format!(
            "SELECT symbol, strftime(date, '%Y-%m-%d'), \
             CAST(open AS DOUBLE), CAST(close AS DOUBLE), \
             CAST(low_price AS DOUBLE), CAST(high_price AS DOUBLE), \
             CAST(volume AS BIGINT) \
             FROM {table} ORDER BY symbol, date"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(query_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, i64>(6)?,
                ))
            })
            .map_err(query_error)?;

        let mut out = Vec::new();
        for row in rows {
            let (ticker, date, open, close, low_price, high_price, volume) =
                row.map_err(query_error)?;
            let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
                LoadError::Statement {
                    statement: "SELECT",
                    table: table.to_string(),
                    message: format!("unexpected date '{date}': {e}"),
                }
            })?;
            out.push(CanonicalRecord {
                ticker,
                date,
                open,
                close,
                low_price,
                high_price,
                volume,
            });
        }
        Ok(out)
    }

    pub fn row_count(&self, table: &TableName) -> Result<i64, LoadError> {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .map_err(|e| LoadError::Statement {
                statement: "SELECT",
                table: table.to_string(),
                message: e.to_string(),
            })
    }

    fn transaction(&self, operation: &'static str) -> Result<(), LoadError> {
        self.conn
            .execute_batch(operation)
            .map_err(|e| LoadError::Transaction {
                operation,
                message: e.to_string(),
            })
    }

    fn insert(&self, table: &TableName, rows: &[CanonicalRecord]) -> duckdb::Result<usize> {
        let sql = Statement::Insert { table, rows }.sql();
        let dates: Vec<String> = rows
            .iter()
            .map(|r| r.date.format("%Y-%m-%d").to_string())
            .collect();

        let mut params: Vec<&dyn ToSql> = Vec::with_capacity(rows.len() * 7);
        for (row, date) in rows.iter().zip(&dates) {
            params.push(&row.ticker);
            params.push(date);
            params.push(&row.open);
            params.push(&row.close);
            params.push(&row.low_price);
            params.push(&row.high_price);
            params.push(&row.volume);
        }

        let mut stmt = self.conn.prepare(&sql)?;
        stmt.execute(params.as_slice())
    }
}

/// Map a DuckDB failure onto the load taxonomy.
fn classify(statement: &Statement<'_>, table: String, err: duckdb::Error) -> LoadError {
    let message = err.to_string();
    if statement.is_ddl() {
        LoadError::Ddl { table, message }
    } else if message.contains("Constraint Error") {
        LoadError::Constraint { table, message }
    } else {
        LoadError::Statement {
            statement: statement.kind(),
            table,
            message,
        }
    }
}

impl Warehouse for DuckDbWarehouse {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&mut self) -> Result<(), LoadError> {
        self.transaction("BEGIN TRANSACTION")
    }

    fn execute(&mut self, statement: &Statement<'_>) -> Result<usize, LoadError> {
        let (table, result) = match *statement {
            Statement::CreateSchema(schema) => (
                schema.to_string(),
                self.conn.execute_batch(&statement.sql()).map(|_| 0),
            ),
            Statement::CreateTable(table) => (
                table.to_string(),
                self.conn.execute_batch(&statement.sql()).map(|_| 0),
            ),
            Statement::DeleteAll(table) => {
                (table.to_string(), self.conn.execute(&statement.sql(), []))
            }
            Statement::Insert { table, rows } => (table.to_string(), self.insert(table, rows)),
        };
        result.map_err(|e| classify(statement, table, e))
    }

    fn commit(&mut self) -> Result<(), LoadError> {
        self.transaction("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), LoadError> {
        self.transaction("ROLLBACK")
    }
}
