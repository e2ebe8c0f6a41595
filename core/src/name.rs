//! Migration file naming and ordering.
//!
//! Every migration is a pair of files in the script store:
//!
//! ```text
//! 20240101000000_create_users.up.sql
//! 20240101000000_create_users.down.sql
//! ```
//!
//! The 14-digit prefix is a UTC timestamp with second resolution. Ordering is
//! defined by [`MigrationId`]'s [`Ord`] impl (timestamp first, then label),
//! which is the same as the byte order of the file names. Two migrations
//! created within the same second are ordered by label only.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{MigrateError, Result};

/// `chrono` format string for the timestamp prefix.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Number of digits in the timestamp prefix.
pub const TIMESTAMP_WIDTH: usize = 14;

const UP_SUFFIX: &str = ".up.sql";
const DOWN_SUFFIX: &str = ".down.sql";

static FILE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{14})_([A-Za-z0-9_-]+)\.(up|down)\.sql$").expect("static regex must compile")
});

/// Which half of a migration a script is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// File name suffix for this direction, including `.sql`.
    pub fn suffix(self) -> &'static str {
        match self {
            Direction::Up => UP_SUFFIX,
            Direction::Down => DOWN_SUFFIX,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// Timestamp and label shared by the up and down halves of a migration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MigrationId {
    timestamp: String,
    label: String,
}

impl MigrationId {
    /// Builds an id from a creation time and an already normalized label.
    pub fn new(created_at: DateTime<Utc>, label: impl Into<String>) -> Self {
        Self {
            timestamp: created_at.format(TIMESTAMP_FORMAT).to_string(),
            label: label.into(),
        }
    }

    /// The 14-digit timestamp prefix.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// The human label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// File name of the script for `direction`.
    pub fn file_name(&self, direction: Direction) -> String {
        format!("{}_{}{}", self.timestamp, self.label, direction.suffix())
    }
}

impl Ord for MigrationId {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ids(self, other)
    }
}

impl PartialOrd for MigrationId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.timestamp, self.label)
    }
}

/// Chronological order of two migrations.
///
/// Timestamps are fixed width, so byte order on the prefix is time order.
/// Equal timestamps fall back to the label.
pub fn compare_ids(a: &MigrationId, b: &MigrationId) -> Ordering {
    a.timestamp
        .as_bytes()
        .cmp(b.timestamp.as_bytes())
        .then_with(|| a.label.as_bytes().cmp(b.label.as_bytes()))
}

/// Parses a script file name into its id and direction.
///
/// # Errors
///
/// Returns [`MigrateError::InvalidName`] if the name does not match
/// `<14 digits>_<label>.<up|down>.sql`.
///
/// # Examples
///
/// ```
/// use sqlshift_core::{Direction, parse_file_name};
///
/// let (id, direction) = parse_file_name("20240101000000_create_users.up.sql").unwrap();
/// assert_eq!(id.timestamp(), "20240101000000");
/// assert_eq!(id.label(), "create_users");
/// assert_eq!(direction, Direction::Up);
/// ```
pub fn parse_file_name(name: &str) -> Result<(MigrationId, Direction)> {
    let caps = FILE_NAME_RE
        .captures(name)
        .ok_or_else(|| MigrateError::InvalidName {
            name: name.to_string(),
            reason: "expected <14-digit timestamp>_<label>.<up|down>.sql",
        })?;

    let direction = if &caps[3] == "up" {
        Direction::Up
    } else {
        Direction::Down
    };

    Ok((
        MigrationId {
            timestamp: caps[1].to_string(),
            label: caps[2].to_string(),
        },
        direction,
    ))
}

/// Returns `true` if `name` ends with a script suffix, whether or not the
/// rest of the name is well formed.
pub(crate) fn has_script_suffix(name: &str) -> bool {
    name.ends_with(UP_SUFFIX) || name.ends_with(DOWN_SUFFIX)
}

/// Derives the down script name from an up script name.
///
/// # Errors
///
/// Returns [`MigrateError::InvalidName`] if `up_name` is not a well-formed
/// up script name.
pub fn down_name_for(up_name: &str) -> Result<String> {
    match parse_file_name(up_name)? {
        (id, Direction::Up) => Ok(id.file_name(Direction::Down)),
        (_, Direction::Down) => Err(MigrateError::InvalidName {
            name: up_name.to_string(),
            reason: "expected an up script name",
        }),
    }
}

/// Normalizes a user supplied label into the `[a-z0-9_]` alphabet.
///
/// Runs of other characters collapse into a single underscore and leading or
/// trailing underscores are dropped.
///
/// # Errors
///
/// Returns [`MigrateError::InvalidName`] if nothing remains after
/// normalization.
///
/// # Examples
///
/// ```
/// use sqlshift_core::normalize_label;
///
/// assert_eq!(normalize_label("Add Users Table").unwrap(), "add_users_table");
/// assert!(normalize_label("  -- ").is_err());
/// ```
pub fn normalize_label(label: &str) -> Result<String> {
    let mut out = String::with_capacity(label.len());
    let mut pending_sep = false;

    for ch in label.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }

    if out.is_empty() {
        return Err(MigrateError::InvalidName {
            name: label.to_string(),
            reason: "label must contain at least one letter or digit",
        });
    }
    Ok(out)
}
