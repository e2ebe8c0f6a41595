//! Project configuration for the `sqlshift` binary.
//!
//! Settings come from an optional YAML file, then command-line overrides.
//! Every field has a default, so an empty file (or no file at all) is valid.
//!
//! # Example YAML
//!
//! ```yaml
//! migrations_dir: db/migrations
//! database: db/development.sqlite3
//! ledger_table: migrations
//! transactional: true
//! ```

use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlshift_core::DEFAULT_MIGRATIONS_DIR;
use sqlshift_sqlite::DEFAULT_LEDGER_TABLE;
use thiserror::Error;

/// Config file picked up from the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "sqlshift.yml";

/// Default SQLite database path.
pub const DEFAULT_DATABASE: &str = "db/development.sqlite3";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding `*.up.sql` / `*.down.sql` scripts.
    pub migrations_dir: PathBuf,
    /// SQLite database file that migrations run against.
    pub database: PathBuf,
    /// Name of the ledger table.
    pub ledger_table: String,
    /// Run each script and its ledger write in one transaction.
    pub transactional: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from(DEFAULT_MIGRATIONS_DIR),
            database: PathBuf::from(DEFAULT_DATABASE),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            transactional: true,
        }
    }
}

impl Config {
    /// Loads configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        // An empty file deserializes as unit, not as an empty map.
        if file.metadata().map(|m| m.len() == 0).unwrap_or(false) {
            return Ok(Self::default());
        }
        serde_yaml::from_reader(BufReader::new(file)).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `explicit` if given, else [`DEFAULT_CONFIG_FILE`] if it exists in
    /// `cwd`, else the defaults.
    ///
    /// A missing explicit file is an error; a missing default file is not.
    pub fn resolve(explicit: Option<&Path>, cwd: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let default_path = cwd.join(DEFAULT_CONFIG_FILE);
        if default_path.is_file() {
            return Self::load(default_path);
        }
        Ok(Self::default())
    }

    /// Applies command-line overrides.
    pub fn with_overrides(
        mut self,
        migrations_dir: Option<PathBuf>,
        database: Option<PathBuf>,
    ) -> Self {
        if let Some(dir) = migrations_dir {
            self.migrations_dir = dir;
        }
        if let Some(db) = database {
            self.database = db;
        }
        self
    }
}
