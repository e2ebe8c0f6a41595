//! Apply and rollback engines.
//!
//! [`Migrator`] ties a [`ScriptStore`] to a [`Target`]. Every run is a single
//! pass:
//!
//! - [`apply`](Migrator::apply) computes the pending set once, then runs each
//!   script oldest first and stops at the first failure. Scripts applied
//!   before the failure stay recorded; later scripts are not attempted.
//! - [`rollback`](Migrator::rollback) reverts only the most recently applied
//!   migration. The ledger entry is removed only after its down script
//!   succeeds.
//!
//! Runs are not safe against a second process migrating the same target at
//! the same time; nothing locks the ledger between planning and recording.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::{Phase, Result};
use crate::ledger::{LedgerEntry, Target};
use crate::store::{MigrationScript, ScriptStore};

type Clock = Box<dyn FnMut() -> DateTime<Utc>>;

/// Scripts applied by one [`Migrator::apply`] run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
}

impl ApplyReport {
    /// `true` when there was nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Result of a [`Migrator::rollback`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The ledger was empty.
    NothingToRollBack,
    /// The entry that was reverted and removed.
    RolledBack(LedgerEntry),
}

/// Snapshot of the ledger compared with the script store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Applied migrations, oldest first.
    pub applied: Vec<String>,
    /// Up scripts not yet applied, oldest first.
    pub pending: Vec<String>,
    /// Applied migrations whose up script is no longer in the store.
    pub orphaned: Vec<String>,
}

/// Runs migrations from a script store against a target.
///
/// # Examples
///
/// ```ignore
/// use sqlshift_core::{Migrator, ScriptStore};
///
/// let mut migrator = Migrator::new(ScriptStore::new("db/migrations"), target);
/// let report = migrator.apply()?;
/// for name in &report.applied {
///     println!("applied {name}");
/// }
/// ```
pub struct Migrator<T> {
    store: ScriptStore,
    target: T,
    clock: Clock,
}

impl<T: Target> Migrator<T> {
    pub fn new(store: ScriptStore, target: T) -> Self {
        Self {
            store,
            target,
            clock: Box::new(Utc::now),
        }
    }

    /// Replaces the clock used for ledger timestamps.
    pub fn with_clock(mut self, clock: impl FnMut() -> DateTime<Utc> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn into_target(self) -> T {
        self.target
    }

    /// Computes the pending set without running anything.
    ///
    /// Creates the ledger table first if needed.
    pub fn plan(&mut self) -> Result<Vec<MigrationScript>> {
        self.target.ensure_schema()?;
        let applied = self.target.list_applied()?;
        self.store.list_pending(&applied)
    }

    /// Applies every pending migration, oldest first.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Loading failures and those from the provided
    /// step helpers are wrapped in [`MigrateError::Step`](crate::MigrateError::Step),
    /// naming the script and phase; errors from an overridden
    /// [`Target::apply_step`] pass through unchanged. Nothing after the failed
    /// script is attempted.
    pub fn apply(&mut self) -> Result<ApplyReport> {
        let plan = self.plan()?;
        self.apply_plan(plan)
    }

    /// Applies a plan previously returned by [`plan`](Self::plan).
    ///
    /// The plan is not recomputed, so scripts added to the store after
    /// planning are not picked up.
    pub fn apply_plan(&mut self, plan: Vec<MigrationScript>) -> Result<ApplyReport> {
        let mut report = ApplyReport::default();
        if plan.is_empty() {
            info!("Nothing to apply");
            return Ok(report);
        }

        let mut floor = self.target.most_recently_applied()?.map(|e| e.applied_at);

        for script in plan {
            let name = script.name();
            let body = self
                .store
                .load_body(&script)
                .map_err(|e| e.in_phase(&name, Phase::Loading))?;

            // applied_at never goes backwards, even if the wall clock does.
            let now = (self.clock)();
            let applied_at = floor.map_or(now, |f| now.max(f));

            info!(migration = %name, "Applying migration");
            if let Err(e) = self.target.apply_step(&name, &body, applied_at) {
                error!(
                    migration = %name,
                    applied = report.applied.len(),
                    error = %e,
                    "Migration failed, stopping"
                );
                return Err(e);
            }

            floor = Some(applied_at);
            report.applied.push(name);
        }

        info!(count = report.applied.len(), "All migrations applied");
        Ok(report)
    }

    /// Reverts the most recently applied migration.
    ///
    /// # Errors
    ///
    /// Fails in the `resolving` phase with
    /// [`MigrateError::MissingDownScript`](crate::MigrateError::MissingDownScript)
    /// if the down script is absent. On any failure the ledger entry is kept.
    pub fn rollback(&mut self) -> Result<RollbackOutcome> {
        self.target.ensure_schema()?;

        let Some(entry) = self.target.most_recently_applied()? else {
            info!("No applied migrations to roll back");
            return Ok(RollbackOutcome::NothingToRollBack);
        };

        let down = self
            .store
            .resolve_down(&entry.name)
            .map_err(|e| e.in_phase(&entry.name, Phase::Resolving))?;
        let body = self
            .store
            .load_body(&down)
            .map_err(|e| e.in_phase(&entry.name, Phase::Loading))?;

        info!(migration = %entry.name, down = %down.name(), "Rolling back migration");
        self.target.revert_step(&entry.name, &body)?;

        info!(migration = %entry.name, "Rollback complete");
        Ok(RollbackOutcome::RolledBack(entry))
    }

    /// Compares the ledger with the script store.
    pub fn status(&mut self) -> Result<MigrationStatus> {
        self.target.ensure_schema()?;
        let applied = self.target.list_applied()?;
        let scripts = self.store.list_up()?;

        let known: BTreeSet<String> = scripts.iter().map(MigrationScript::name).collect();
        let pending = scripts
            .iter()
            .map(MigrationScript::name)
            .filter(|name| !applied.contains(name))
            .collect();
        let orphaned = applied.difference(&known).cloned().collect();

        Ok(MigrationStatus {
            applied: applied.into_iter().collect(),
            pending,
            orphaned,
        })
    }
}
