//! SQLite implementation of [`Ledger`] and [`Target`].
//!
//! [`SqliteTarget`] wraps an open [`Connection`]. Script bodies run through
//! [`Connection::execute_batch`], so a body may contain any number of
//! statements. The ledger table lives in the same database.
//!
//! # Transactions
//!
//! With transactions enabled (the default), each script body and its ledger
//! write run in one SQLite transaction: either both land or neither does.
//! Scripts that issue their own `BEGIN`/`COMMIT` cannot run inside an outer
//! transaction; disable it with
//! [`with_transactional(false)`](SqliteTarget::with_transactional) for those.
//! Without transactions a crash between the body and the ledger write leaves
//! the script applied but unrecorded.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use sqlshift_core::{
    Ledger, LedgerEntry, MigrateError, Phase, Target, execute_then_record, execute_then_remove,
};
use tracing::debug;

use crate::convert::{LedgerRow, format_applied_at, row_to_entry};
use crate::error::{Result, SqliteError};
use crate::schema::{generate_ledger_sql, validate_table_name};

/// SQLite target store with its migration ledger.
///
/// # Examples
///
/// ```no_run
/// use sqlshift_core::{Migrator, ScriptStore};
/// use sqlshift_sqlite::SqliteTarget;
///
/// let target = SqliteTarget::open("db/development.sqlite3", "migrations").unwrap();
/// let mut migrator = Migrator::new(ScriptStore::new("db/migrations"), target);
/// let report = migrator.apply().unwrap();
/// println!("applied {} migrations", report.applied.len());
/// ```
pub struct SqliteTarget {
    conn: Connection,
    table: String,
    transactional: bool,
}

impl SqliteTarget {
    /// Wraps an already open connection.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidTableName`] if `table` is not a plain
    /// identifier.
    pub fn new(conn: Connection, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        validate_table_name(&table)?;
        Ok(Self {
            conn,
            table,
            transactional: true,
        })
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, table: impl Into<String>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::new(conn, table)
    }

    /// Enables or disables the per-script transaction.
    pub fn with_transactional(mut self, transactional: bool) -> Self {
        self.transactional = transactional;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn load_names(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT name FROM {} ORDER BY name", self.table))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<_>>>()?;
        Ok(names)
    }

    fn load_latest(&self) -> Result<Option<LedgerEntry>> {
        let row: Option<LedgerRow> = self
            .conn
            .query_row(
                &format!(
                    "SELECT id, name, applied_at FROM {} \
                     ORDER BY applied_at DESC, name DESC LIMIT 1",
                    self.table
                ),
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        row.map(row_to_entry).transpose()
    }
}

/// Inserts a ledger row, mapping a unique-name violation to
/// [`MigrateError::Duplicate`].
fn insert_entry(
    conn: &Connection,
    table: &str,
    name: &str,
    applied_at: DateTime<Utc>,
) -> sqlshift_core::Result<()> {
    let sql = format!("INSERT INTO {table} (name, applied_at) VALUES (?1, ?2)");
    match conn.execute(&sql, params![name, format_applied_at(applied_at)]) {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            Err(MigrateError::Duplicate(name.to_string()))
        }
        Err(e) => Err(MigrateError::backend("insert", e)),
    }
}

/// Deletes a ledger row, failing with [`MigrateError::NotFound`] if none
/// matched.
fn delete_entry(conn: &Connection, table: &str, name: &str) -> sqlshift_core::Result<()> {
    let sql = format!("DELETE FROM {table} WHERE name = ?1");
    let deleted = conn
        .execute(&sql, params![name])
        .map_err(|e| MigrateError::backend("delete", e))?;
    if deleted == 0 {
        return Err(MigrateError::NotFound(name.to_string()));
    }
    Ok(())
}

impl Ledger for SqliteTarget {
    fn ensure_schema(&mut self) -> sqlshift_core::Result<()> {
        let sql = generate_ledger_sql(&self.table).map_err(|e| MigrateError::Schema(e.into()))?;
        self.conn
            .execute_batch(&sql)
            .map_err(|e| MigrateError::Schema(SqliteError::from(e).into()))
    }

    fn list_applied(&self) -> sqlshift_core::Result<BTreeSet<String>> {
        self.load_names().map_err(|e| MigrateError::backend("list", e))
    }

    fn record_applied(
        &mut self,
        name: &str,
        applied_at: DateTime<Utc>,
    ) -> sqlshift_core::Result<()> {
        insert_entry(&self.conn, &self.table, name, applied_at)
    }

    fn most_recently_applied(&self) -> sqlshift_core::Result<Option<LedgerEntry>> {
        self.load_latest()
            .map_err(|e| MigrateError::backend("lookup", e))
    }

    fn remove(&mut self, name: &str) -> sqlshift_core::Result<()> {
        delete_entry(&self.conn, &self.table, name)
    }
}

impl Target for SqliteTarget {
    fn execute(&mut self, body: &str) -> sqlshift_core::Result<()> {
        self.conn.execute_batch(body).map_err(MigrateError::execution)
    }

    fn apply_step(
        &mut self,
        name: &str,
        body: &str,
        applied_at: DateTime<Utc>,
    ) -> sqlshift_core::Result<()> {
        if !self.transactional {
            return execute_then_record(self, name, body, applied_at);
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|e| MigrateError::backend("begin", e).in_phase(name, Phase::Executing))?;
        tx.execute_batch(body)
            .map_err(|e| MigrateError::execution(e).in_phase(name, Phase::Executing))?;
        insert_entry(&tx, &self.table, name, applied_at)
            .map_err(|e| e.in_phase(name, Phase::Recording))?;
        tx.commit()
            .map_err(|e| MigrateError::backend("commit", e).in_phase(name, Phase::Recording))?;

        debug!(migration = name, "Committed migration and ledger entry");
        Ok(())
    }

    fn revert_step(&mut self, name: &str, body: &str) -> sqlshift_core::Result<()> {
        if !self.transactional {
            return execute_then_remove(self, name, body);
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|e| MigrateError::backend("begin", e).in_phase(name, Phase::Executing))?;
        tx.execute_batch(body)
            .map_err(|e| MigrateError::execution(e).in_phase(name, Phase::Executing))?;
        delete_entry(&tx, &self.table, name).map_err(|e| e.in_phase(name, Phase::Removing))?;
        tx.commit()
            .map_err(|e| MigrateError::backend("commit", e).in_phase(name, Phase::Removing))?;

        debug!(migration = name, "Committed rollback and ledger removal");
        Ok(())
    }
}
