//! Target table identifiers and the statements the load protocol issues.

use super::LoadError;
use crate::record::CanonicalRecord;
use std::fmt;

/// Columns of the target table, in insert order.
pub const TABLE_COLUMNS: [&str; 7] = [
    "symbol",
    "date",
    "open",
    "close",
    "low_price",
    "high_price",
    "volume",
];

/// Validated, optionally qualified table identifier (`table`, `schema.table`
/// or `catalog.schema.table`).
///
/// Every part matches `[A-Za-z_][A-Za-z0-9_]*`, so names can be spliced into
/// SQL without quoting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName {
    parts: Vec<String>,
}

impl TableName {
    pub fn parse(raw: &str) -> Result<Self, LoadError> {
        let invalid = |reason: &str| LoadError::InvalidTable {
            name: raw.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = raw.trim().split('.').collect();
        if parts.len() > 3 {
            return Err(invalid("at most catalog.schema.table"));
        }
        for part in &parts {
            let mut chars = part.chars();
            match chars.next() {
                None => return Err(invalid("empty identifier")),
                Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
                    return Err(invalid("identifiers must start with a letter or '_'"))
                }
                _ => {}
            }
            if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("identifiers may only contain letters, digits and '_'"));
            }
        }

        Ok(Self {
            parts: parts.into_iter().map(String::from).collect(),
        })
    }

    /// Qualifier in front of the table, if any (`raw` for `raw.prices`).
    pub fn schema(&self) -> Option<String> {
        match self.parts.len() {
            1 => None,
            n => Some(self.parts[..n - 1].join(".")),
        }
    }

    /// Unqualified table name.
    pub fn table(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("."))
    }
}

/// One step of the load protocol, rendered to SQL by SQL-speaking warehouses
/// and interpreted directly by [`super::MemoryWarehouse`].
#[derive(Debug, Clone, Copy)]
pub enum Statement<'a> {
    CreateSchema(&'a str),
    CreateTable(&'a TableName),
    DeleteAll(&'a TableName),
    Insert {
        table: &'a TableName,
        rows: &'a [CanonicalRecord],
    },
}

impl Statement<'_> {
    /// Short label for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CreateSchema(_) => "CREATE SCHEMA",
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DeleteAll(_) => "DELETE",
            Statement::Insert { .. } => "INSERT",
        }
    }

    /// Whether the statement is DDL (schema/table creation).
    pub fn is_ddl(&self) -> bool {
        matches!(self, Statement::CreateSchema(_) | Statement::CreateTable(_))
    }

    /// Render the statement. Inserts use `?` placeholders, seven per row, bound
    /// in [`TABLE_COLUMNS`] order.
    pub fn sql(&self) -> String {
        match self {
            Statement::CreateSchema(schema) => format!("CREATE SCHEMA IF NOT EXISTS {schema}"),
            Statement::CreateTable(table) => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\
                 symbol VARCHAR, \
                 date DATE, \
                 open DOUBLE, \
                 close DOUBLE, \
                 low_price DOUBLE, \
                 high_price DOUBLE, \
                 volume BIGINT, \
                 PRIMARY KEY (symbol, date))"
            ),
            Statement::DeleteAll(table) => format!("DELETE FROM {table}"),
            Statement::Insert { table, rows } => {
                let row = "(?, CAST(? AS DATE), ?, ?, ?, ?, ?)";
                let values = vec![row; rows.len()].join(", ");
                format!(
                    "INSERT INTO {table} ({}) VALUES {values}",
                    TABLE_COLUMNS.join(", ")
                )
            }
        }
    }
}
