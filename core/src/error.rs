//! Error types for migration operations.
//!
//! [`MigrateError`] covers script store I/O, target store execution, ledger
//! consistency, and naming failures. Failures that happen while a specific
//! script is being processed are wrapped in [`MigrateError::Step`], which
//! carries the script name and the [`Phase`] that failed.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error produced by a target store or ledger backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The step of a single-script operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading the script body from the store.
    Loading,
    /// Running the script body against the target store.
    Executing,
    /// Writing the ledger entry after a successful up script.
    Recording,
    /// Locating the down script paired with a ledger entry.
    Resolving,
    /// Deleting the ledger entry after a successful down script.
    Removing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Loading => "loading",
            Phase::Executing => "executing",
            Phase::Recording => "recording",
            Phase::Resolving => "resolving",
            Phase::Removing => "removing",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while discovering, applying, or rolling back
/// migrations.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// A script or the store directory could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A new script file or its directory could not be written.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The target store rejected a script body.
    #[error("execution error: {0}")]
    Execution(#[source] BoxError),

    /// The ledger already holds an entry with this name.
    #[error("migration {0} is already recorded in the ledger")]
    Duplicate(String),

    /// The ledger holds no entry with this name.
    #[error("migration {0} is not recorded in the ledger")]
    NotFound(String),

    /// Rollback was requested but the paired down script does not exist.
    #[error("missing down script for {name}: expected {}", expected.display())]
    MissingDownScript { name: String, expected: PathBuf },

    /// A label or file name does not follow the naming convention.
    #[error("invalid migration name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// The ledger backend failed outside of a consistency check.
    #[error("ledger {operation} failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// The ledger table could not be created or verified.
    #[error("ledger schema bootstrap failed: {0}")]
    Schema(#[source] BoxError),

    /// A failure while processing one script.
    #[error("{phase} {script} failed: {source}")]
    Step {
        script: String,
        phase: Phase,
        #[source]
        source: Box<MigrateError>,
    },
}

impl MigrateError {
    /// Wraps a backend error as an execution failure.
    pub fn execution(source: impl Into<BoxError>) -> Self {
        MigrateError::Execution(source.into())
    }

    /// Wraps a backend error raised by a ledger operation.
    pub fn backend(operation: &'static str, source: impl Into<BoxError>) -> Self {
        MigrateError::Backend {
            operation,
            source: source.into(),
        }
    }

    /// Attaches the script name and phase to this error.
    ///
    /// Errors that already carry step context are returned unchanged.
    pub fn in_phase(self, script: impl Into<String>, phase: Phase) -> Self {
        match self {
            MigrateError::Step { .. } => self,
            other => MigrateError::Step {
                script: script.into(),
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost error, skipping step context.
    pub fn root(&self) -> &MigrateError {
        match self {
            MigrateError::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Returns the script name and phase if this error carries step context.
    pub fn step(&self) -> Option<(&str, Phase)> {
        match self {
            MigrateError::Step { script, phase, .. } => Some((script.as_str(), *phase)),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`MigrateError`].
pub type Result<T> = std::result::Result<T, MigrateError>;
