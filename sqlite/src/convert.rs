//! Conversion between ledger rows and [`LedgerEntry`].
//!
//! `applied_at` is stored as fixed-width UTC text with microsecond
//! precision, so ordering the column as text orders it by time.

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlshift_core::LedgerEntry;

use crate::error::{Result, SqliteError};

/// Storage format of the `applied_at` column.
pub(crate) const APPLIED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

pub(crate) fn format_applied_at(at: DateTime<Utc>) -> String {
    at.format(APPLIED_AT_FORMAT).to_string()
}

pub(crate) fn parse_applied_at(name: &str, value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, APPLIED_AT_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| SqliteError::InvalidTimestamp {
            name: name.to_string(),
            value: value.to_string(),
        })
}

/// Raw `(id, name, applied_at)` ledger row.
pub(crate) type LedgerRow = (i64, String, String);

pub(crate) fn row_to_entry((id, name, applied_at): LedgerRow) -> Result<LedgerEntry> {
    let applied_at = parse_applied_at(&name, &applied_at)?;
    Ok(LedgerEntry {
        id,
        name,
        applied_at,
    })
}
