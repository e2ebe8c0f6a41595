//! Ledger table DDL.
//!
//! The ledger is a single table:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS migrations (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     name TEXT NOT NULL UNIQUE,
//!     applied_at TEXT NOT NULL
//! );
//! ```
//!
//! The table name is configurable so several ledgers can share a database.
//! Names are interpolated into SQL, so they are restricted to plain
//! identifiers.

use crate::error::{Result, SqliteError};

/// Ledger table name used when none is configured.
pub const DEFAULT_LEDGER_TABLE: &str = "migrations";

/// Validates that a table name is a plain SQL identifier.
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(SqliteError::InvalidTableName(name.to_string()));
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(SqliteError::InvalidTableName(name.to_string()));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SqliteError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

/// Generates the ledger table and index DDL.
///
/// Uses `IF NOT EXISTS` so it is safe to run on every startup.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidTableName`] if `table` is not a plain
/// identifier.
pub fn generate_ledger_sql(table: &str) -> Result<String> {
    validate_table_name(table)?;

    Ok(format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    applied_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{table}_applied_at ON {table}(applied_at, name);
"#
    ))
}
