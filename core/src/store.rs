//! Filesystem script store.
//!
//! [`ScriptStore`] reads paired up/down scripts from a single directory. It
//! never modifies existing scripts; [`ScriptStore::create`] only adds new
//! pairs.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::name::{
    Direction, MigrationId, down_name_for, has_script_suffix, normalize_label, parse_file_name,
};

/// Default script store location, relative to the working directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "db/migrations";

const UP_PLACEHOLDER: &str = "-- SQL UP Migration\n";
const DOWN_PLACEHOLDER: &str = "-- SQL DOWN Migration\n";

/// One half of a migration on disk. The body is read on demand with
/// [`ScriptStore::load_body`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub id: MigrationId,
    pub direction: Direction,
    pub path: PathBuf,
}

impl MigrationScript {
    /// File name of the script, which is also its ledger name for up scripts.
    pub fn name(&self) -> String {
        self.id.file_name(self.direction)
    }
}

/// Sorts scripts in ascending chronological order.
pub fn sort_chronologically(scripts: &mut [MigrationScript]) {
    scripts.sort_by(|a, b| a.id.cmp(&b.id));
}

/// File names written by [`ScriptStore::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMigration {
    pub up: PathBuf,
    pub down: PathBuf,
}

/// A directory of paired migration scripts.
///
/// # Examples
///
/// ```no_run
/// use std::collections::BTreeSet;
/// use sqlshift_core::ScriptStore;
///
/// let store = ScriptStore::new("db/migrations");
/// for script in store.list_pending(&BTreeSet::new()).unwrap() {
///     println!("pending: {}", script.name());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ScriptStore {
    dir: PathBuf,
}

impl ScriptStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists every well-formed up script, oldest first.
    ///
    /// A missing directory lists as empty. Files that carry a script suffix
    /// but do not match the naming convention are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Read`] if the directory exists but cannot be
    /// enumerated.
    pub fn list_up(&self) -> Result<Vec<MigrationScript>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(dir = %self.dir.display(), "Script store directory does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.read_error(&self.dir, e)),
        };

        let mut scripts = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| self.read_error(&self.dir, e))?;
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !has_script_suffix(file_name) {
                continue;
            }
            match parse_file_name(file_name) {
                Ok((id, Direction::Up)) => scripts.push(MigrationScript {
                    id,
                    direction: Direction::Up,
                    path,
                }),
                Ok((_, Direction::Down)) => {}
                Err(e) => warn!(file = file_name, error = %e, "Skipping misnamed migration file"),
            }
        }

        sort_chronologically(&mut scripts);
        debug!(dir = %self.dir.display(), count = scripts.len(), "Scanned up scripts");
        Ok(scripts)
    }

    /// Lists up scripts whose names are not in `applied`, oldest first.
    pub fn list_pending(&self, applied: &BTreeSet<String>) -> Result<Vec<MigrationScript>> {
        let mut scripts = self.list_up()?;
        scripts.retain(|s| !applied.contains(&s.name()));
        Ok(scripts)
    }

    /// Reads a script body.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Read`] if the file was removed or cannot be
    /// read.
    pub fn load_body(&self, script: &MigrationScript) -> Result<String> {
        fs::read_to_string(&script.path).map_err(|e| self.read_error(&script.path, e))
    }

    /// Finds the down script paired with an applied up script.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidName`] if `up_name` is not an up script
    /// name, or [`MigrateError::MissingDownScript`] if the down file does not
    /// exist.
    pub fn resolve_down(&self, up_name: &str) -> Result<MigrationScript> {
        let down_name = down_name_for(up_name)?;
        let path = self.dir.join(&down_name);
        if !path.is_file() {
            return Err(MigrateError::MissingDownScript {
                name: up_name.to_string(),
                expected: path,
            });
        }
        let (id, direction) = parse_file_name(&down_name)?;
        Ok(MigrationScript { id, direction, path })
    }

    /// Creates an empty up/down pair for `label`, stamped with the current
    /// UTC time.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::InvalidName`] for an empty label and
    /// [`MigrateError::Write`] if the directory cannot be created or either
    /// file already exists.
    pub fn create(&self, label: &str) -> Result<CreatedMigration> {
        self.create_at(label, Utc::now())
    }

    /// Same as [`create`](Self::create) with an explicit timestamp.
    pub fn create_at(&self, label: &str, created_at: DateTime<Utc>) -> Result<CreatedMigration> {
        let label = normalize_label(label)?;
        let id = MigrationId::new(created_at, label);

        fs::create_dir_all(&self.dir).map_err(|source| MigrateError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let up = self.dir.join(id.file_name(Direction::Up));
        let down = self.dir.join(id.file_name(Direction::Down));

        write_new(&up, UP_PLACEHOLDER)?;
        if let Err(e) = write_new(&down, DOWN_PLACEHOLDER) {
            // Leave no half pair behind.
            let _ = fs::remove_file(&up);
            return Err(e);
        }

        info!(up = %up.display(), down = %down.display(), "Created migration");
        Ok(CreatedMigration { up, down })
    }

    fn read_error(&self, path: &Path, source: io::Error) -> MigrateError {
        MigrateError::Read {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn write_new(path: &Path, contents: &str) -> Result<()> {
    let write = || -> io::Result<()> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        file.write_all(contents.as_bytes())?;
        file.flush()
    };
    write().map_err(|source| MigrateError::Write {
        path: path.to_path_buf(),
        source,
    })
}
