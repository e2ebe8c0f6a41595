//! Ledger and target store capabilities.
//!
//! The engine never opens connections itself. Callers hand it a value that
//! implements [`Target`]: something that can run a script body and that owns
//! the [`Ledger`] of applied migrations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::error::{Phase, Result};

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Surrogate key assigned by the backend.
    pub id: i64,
    /// Up script file name.
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Durable record of applied migrations.
///
/// Entries are inserted and deleted, never updated.
pub trait Ledger {
    /// Creates the ledger table if it does not exist. Safe to call on every
    /// startup.
    fn ensure_schema(&mut self) -> Result<()>;

    /// Names of all applied migrations.
    fn list_applied(&self) -> Result<BTreeSet<String>>;

    /// Records `name` as applied.
    ///
    /// Fails with [`MigrateError::Duplicate`](crate::MigrateError::Duplicate)
    /// if `name` is already recorded.
    fn record_applied(&mut self, name: &str, applied_at: DateTime<Utc>) -> Result<()>;

    /// Entry with the greatest `applied_at`, ties broken by the greatest name.
    fn most_recently_applied(&self) -> Result<Option<LedgerEntry>>;

    /// Deletes the entry for `name`.
    ///
    /// Fails with [`MigrateError::NotFound`](crate::MigrateError::NotFound)
    /// if `name` is not recorded.
    fn remove(&mut self, name: &str) -> Result<()>;
}

/// A store that migration bodies run against, together with its ledger.
pub trait Target: Ledger {
    /// Runs a script body. Errors should be
    /// [`MigrateError::Execution`](crate::MigrateError::Execution).
    fn execute(&mut self, body: &str) -> Result<()>;

    /// Runs an up script and records it.
    ///
    /// The default runs the two operations back to back; a crash between them
    /// leaves the script applied but unrecorded. Backends that can put both in
    /// one transaction should override this. Errors are returned to the caller
    /// as-is, so overrides tag them with [`MigrateError::in_phase`](crate::MigrateError::in_phase)
    /// themselves.
    fn apply_step(&mut self, name: &str, body: &str, applied_at: DateTime<Utc>) -> Result<()> {
        execute_then_record(self, name, body, applied_at)
    }

    /// Runs a down script and removes the ledger entry for `name`.
    ///
    /// Overrides tag errors with their phase, as for [`apply_step`](Self::apply_step).
    fn revert_step(&mut self, name: &str, body: &str) -> Result<()> {
        execute_then_remove(self, name, body)
    }
}

/// Non-atomic apply step shared by [`Target::apply_step`] and backends that
/// opt out of transactions.
pub fn execute_then_record<T: Target + ?Sized>(
    target: &mut T,
    name: &str,
    body: &str,
    applied_at: DateTime<Utc>,
) -> Result<()> {
    target
        .execute(body)
        .map_err(|e| e.in_phase(name, Phase::Executing))?;
    target
        .record_applied(name, applied_at)
        .map_err(|e| e.in_phase(name, Phase::Recording))
}

/// Non-atomic revert step shared by [`Target::revert_step`] and backends
/// that opt out of transactions.
pub fn execute_then_remove<T: Target + ?Sized>(
    target: &mut T,
    name: &str,
    body: &str,
) -> Result<()> {
    target
        .execute(body)
        .map_err(|e| e.in_phase(name, Phase::Executing))?;
    target
        .remove(name)
        .map_err(|e| e.in_phase(name, Phase::Removing))
}

