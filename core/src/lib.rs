//! Linear, timestamp-ordered SQL migrations.
//!
//! This crate holds everything that does not depend on a particular database:
//!
//! - [`ScriptStore`] — a directory of paired `*.up.sql` / `*.down.sql`
//!   scripts, plus [`ScriptStore::create`] for new empty pairs.
//! - [`Ledger`] and [`Target`] — the capabilities a database backend
//!   provides: recording applied migrations and running script bodies.
//! - [`Migrator`] — applies pending scripts oldest first (stopping at the
//!   first failure) and rolls back the most recent one.
//!
//! Ordering comes from the file names: `<14-digit UTC timestamp>_<label>`,
//! compared by [`compare_ids`].
//!
//! # Example
//!
//! ```
//! use sqlshift_core::{Direction, parse_file_name, normalize_label};
//!
//! let label = normalize_label("Create Users").unwrap();
//! assert_eq!(label, "create_users");
//!
//! let (id, direction) = parse_file_name("20240101000000_create_users.up.sql").unwrap();
//! assert_eq!(direction, Direction::Up);
//! assert_eq!(id.file_name(Direction::Down), "20240101000000_create_users.down.sql");
//! ```

mod engine;
mod error;
mod ledger;
mod name;
mod store;

pub use engine::{ApplyReport, MigrationStatus, Migrator, RollbackOutcome};
pub use error::{BoxError, MigrateError, Phase, Result};
pub use ledger::{Ledger, LedgerEntry, Target, execute_then_record, execute_then_remove};
pub use name::{
    Direction, MigrationId, TIMESTAMP_FORMAT, TIMESTAMP_WIDTH, compare_ids, down_name_for,
    normalize_label, parse_file_name,
};
pub use store::{
    CreatedMigration, DEFAULT_MIGRATIONS_DIR, MigrationScript, ScriptStore, sort_chronologically,
};
