//! SQLite backend for sqlshift migrations.
//!
//! This crate provides [`SqliteTarget`], which implements the
//! [`Ledger`](sqlshift_core::Ledger) and [`Target`](sqlshift_core::Target)
//! capabilities over a `rusqlite` connection. The ledger is a single table in
//! the migrated database, created on first use.
//!
//! # Architecture
//!
//! - **`schema`** — ledger table DDL with a validated table name
//! - **`convert`** — ledger row ↔ [`LedgerEntry`](sqlshift_core::LedgerEntry)
//! - **`target`** — script execution and ledger operations, optionally in a
//!   single transaction per script
//!
//! # Quick start
//!
//! ```no_run
//! use sqlshift_core::{Migrator, RollbackOutcome, ScriptStore};
//! use sqlshift_sqlite::SqliteTarget;
//!
//! let target = SqliteTarget::open("app.sqlite3", "migrations").unwrap();
//! let mut migrator = Migrator::new(ScriptStore::new("db/migrations"), target);
//!
//! migrator.apply().unwrap();
//!
//! if let RollbackOutcome::RolledBack(entry) = migrator.rollback().unwrap() {
//!     println!("rolled back {}", entry.name);
//! }
//! ```

mod convert;
mod error;
mod schema;
mod target;

pub use error::{Result, SqliteError};
pub use schema::{DEFAULT_LEDGER_TABLE, generate_ledger_sql};
pub use target::SqliteTarget;
