//! Engine behavior against an in-memory target.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration, TimeZone, Utc};
use sqlshift_core::{
    Ledger, LedgerEntry, MigrateError, Migrator, Phase, Result, RollbackOutcome, ScriptStore,
    Target, execute_then_record,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Target that records executed bodies and keeps its ledger in a `Vec`.
/// Any body containing `FAIL` is rejected. With `untagged_step_errors`, its
/// `apply_step` reports a duplicate without phase context.
#[derive(Debug, Default)]
struct MemoryTarget {
    entries: Vec<LedgerEntry>,
    next_id: i64,
    executed: Vec<String>,
    broken_schema: bool,
    untagged_step_errors: bool,
}

impl Ledger for MemoryTarget {
    fn ensure_schema(&mut self) -> Result<()> {
        if self.broken_schema {
            return Err(MigrateError::Schema("permission denied".into()));
        }
        Ok(())
    }

    fn list_applied(&self) -> Result<BTreeSet<String>> {
        Ok(self.entries.iter().map(|e| e.name.clone()).collect())
    }

    fn record_applied(&mut self, name: &str, applied_at: DateTime<Utc>) -> Result<()> {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(MigrateError::Duplicate(name.to_string()));
        }
        self.next_id += 1;
        self.entries.push(LedgerEntry {
            id: self.next_id,
            name: name.to_string(),
            applied_at,
        });
        Ok(())
    }

    fn most_recently_applied(&self) -> Result<Option<LedgerEntry>> {
        Ok(self
            .entries
            .iter()
            .max_by(|a, b| a.applied_at.cmp(&b.applied_at).then_with(|| a.name.cmp(&b.name)))
            .cloned())
    }

    fn remove(&mut self, name: &str) -> Result<()> {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        if self.entries.len() == before {
            return Err(MigrateError::NotFound(name.to_string()));
        }
        Ok(())
    }
}

impl Target for MemoryTarget {
    fn execute(&mut self, body: &str) -> Result<()> {
        if body.contains("FAIL") {
            return Err(MigrateError::execution(format!("rejected: {body}")));
        }
        self.executed.push(body.to_string());
        Ok(())
    }

    fn apply_step(&mut self, name: &str, body: &str, applied_at: DateTime<Utc>) -> Result<()> {
        if self.untagged_step_errors {
            return Err(MigrateError::Duplicate(name.to_string()));
        }
        execute_then_record(self, name, body, applied_at)
    }
}

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

/// Writes an up/down pair whose bodies are `up:<label>` / `down:<label>`.
fn write_pair(dir: &Path, stem: &str) {
    let label = stem.split_once('_').unwrap().1;
    write(dir, &format!("{stem}.up.sql"), &format!("up:{label}"));
    write(dir, &format!("{stem}.down.sql"), &format!("down:{label}"));
}

fn migrator(dir: &Path) -> Migrator<MemoryTarget> {
    Migrator::new(ScriptStore::new(dir), MemoryTarget::default())
}

fn applied(m: &Migrator<MemoryTarget>) -> Vec<String> {
    m.target().list_applied().unwrap().into_iter().collect()
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

#[test]
fn test_apply_then_rollback_scenario() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_create_users");
    write_pair(tmp.path(), "20240102000000_add_index");

    let mut m = migrator(tmp.path());
    let report = m.apply().unwrap();
    assert_eq!(
        report.applied,
        [
            "20240101000000_create_users.up.sql",
            "20240102000000_add_index.up.sql"
        ]
    );
    assert_eq!(m.target().executed, ["up:create_users", "up:add_index"]);
    assert_eq!(m.target().entries.len(), 2);

    let entry = match m.rollback().unwrap() {
        RollbackOutcome::RolledBack(entry) => entry,
        other => panic!("expected a rollback, got {other:?}"),
    };
    assert_eq!(entry.name, "20240102000000_add_index.up.sql");
    assert_eq!(m.target().executed.last().unwrap(), "down:add_index");
    assert_eq!(applied(&m), ["20240101000000_create_users.up.sql"]);
}

#[test]
fn test_second_apply_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let mut m = migrator(tmp.path());
    assert_eq!(m.apply().unwrap().applied.len(), 1);

    let second = m.apply().unwrap();
    assert!(second.is_empty());
    assert_eq!(m.target().executed.len(), 1);
}

#[test]
fn test_apply_on_empty_store_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let mut m = migrator(&tmp.path().join("db/migrations"));
    assert!(m.apply().unwrap().is_empty());
    assert!(m.target().executed.is_empty());
}

#[test]
fn test_apply_order_ignores_creation_order() {
    let tmp = tempfile::tempdir().unwrap();
    for stem in [
        "20240105000000_e",
        "20240101000000_a",
        "20240104000000_d",
        "20240102000000_b",
        "20240103000000_c",
    ] {
        write_pair(tmp.path(), stem);
    }

    let mut m = migrator(tmp.path());
    m.apply().unwrap();
    assert_eq!(m.target().executed, ["up:a", "up:b", "up:c", "up:d", "up:e"]);
}

#[test]
fn test_ledger_records_only_after_success() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let mut m = migrator(tmp.path());
    assert!(applied(&m).is_empty());
    m.apply().unwrap();
    assert_eq!(applied(&m), ["20240101000000_a.up.sql"]);
}

#[test]
fn test_apply_stops_at_first_failure() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");
    write(tmp.path(), "20240102000000_b.up.sql", "FAIL");
    write_pair(tmp.path(), "20240103000000_c");

    let mut m = migrator(tmp.path());
    let err = m.apply().unwrap_err();
    assert_eq!(err.step(), Some(("20240102000000_b.up.sql", Phase::Executing)));
    assert!(matches!(err.root(), MigrateError::Execution(_)));
    assert_eq!(applied(&m), ["20240101000000_a.up.sql"]);
    assert_eq!(m.target().executed, ["up:a"]);

    // Fix b and rerun: only b and c run.
    write(tmp.path(), "20240102000000_b.up.sql", "up:b");
    let report = m.apply().unwrap();
    assert_eq!(
        report.applied,
        ["20240102000000_b.up.sql", "20240103000000_c.up.sql"]
    );
    assert_eq!(m.target().executed, ["up:a", "up:b", "up:c"]);
}

#[test]
fn test_apply_reports_recording_failure() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let mut m = migrator(tmp.path());
    let plan = m.plan().unwrap();
    // Someone else records it between planning and applying.
    m.target_mut()
        .record_applied("20240101000000_a.up.sql", Utc::now())
        .unwrap();

    let err = m.apply_plan(plan).unwrap_err();
    assert_eq!(err.step(), Some(("20240101000000_a.up.sql", Phase::Recording)));
    assert!(matches!(err.root(), MigrateError::Duplicate(_)));
    // The default step is not atomic: the body already ran.
    assert_eq!(m.target().executed, ["up:a"]);
}

#[test]
fn test_apply_step_errors_keep_their_own_phase() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let mut m = migrator(tmp.path());
    m.target_mut().untagged_step_errors = true;

    let err = m.apply().unwrap_err();
    assert!(matches!(&err, MigrateError::Duplicate(name) if name == "20240101000000_a.up.sql"));
    assert_eq!(err.step(), None);
    assert!(applied(&m).is_empty());
}

#[test]
fn test_plan_is_a_snapshot() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let mut m = migrator(tmp.path());
    let plan = m.plan().unwrap();
    write_pair(tmp.path(), "20240102000000_b");

    let report = m.apply_plan(plan).unwrap();
    assert_eq!(report.applied, ["20240101000000_a.up.sql"]);
    assert_eq!(m.plan().unwrap().len(), 1);
}

#[test]
fn test_script_deleted_after_planning_fails_in_loading() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let mut m = migrator(tmp.path());
    let plan = m.plan().unwrap();
    fs::remove_file(tmp.path().join("20240101000000_a.up.sql")).unwrap();

    let err = m.apply_plan(plan).unwrap_err();
    assert_eq!(err.step(), Some(("20240101000000_a.up.sql", Phase::Loading)));
    assert!(matches!(err.root(), MigrateError::Read { .. }));
    assert!(applied(&m).is_empty());
}

#[test]
fn test_schema_failure_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let target = MemoryTarget {
        broken_schema: true,
        ..MemoryTarget::default()
    };
    let mut m = Migrator::new(ScriptStore::new(tmp.path()), target);
    assert!(matches!(m.apply(), Err(MigrateError::Schema(_))));
    assert!(matches!(m.rollback(), Err(MigrateError::Schema(_))));
    assert!(m.target().executed.is_empty());
}

#[test]
fn test_applied_at_never_goes_backwards() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");
    write_pair(tmp.path(), "20240102000000_b");

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut m = migrator(tmp.path()).with_clock(move || t0);
    m.apply().unwrap();

    // Clock steps back an hour; new entries are clamped to the latest one.
    write_pair(tmp.path(), "20240103000000_c");
    let mut m = Migrator::new(ScriptStore::new(tmp.path()), m.into_target())
        .with_clock(move || t0 - Duration::hours(1));
    m.apply().unwrap();

    let latest = m.target().most_recently_applied().unwrap().unwrap();
    assert_eq!(latest.name, "20240103000000_c.up.sql");
    assert_eq!(latest.applied_at, t0);
}

// ---------------------------------------------------------------------------
// Rollback
// ---------------------------------------------------------------------------

#[test]
fn test_rollback_with_empty_ledger() {
    let tmp = tempfile::tempdir().unwrap();
    let mut m = migrator(tmp.path());
    assert_eq!(m.rollback().unwrap(), RollbackOutcome::NothingToRollBack);
}

#[test]
fn test_rollback_missing_down_script_keeps_ledger() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");
    write(tmp.path(), "20240102000000_b.up.sql", "up:b");

    let mut m = migrator(tmp.path());
    m.apply().unwrap();
    let before = applied(&m);

    let err = m.rollback().unwrap_err();
    assert_eq!(err.step(), Some(("20240102000000_b.up.sql", Phase::Resolving)));
    assert!(matches!(err.root(), MigrateError::MissingDownScript { .. }));
    assert_eq!(applied(&m), before);
    assert_eq!(m.target().executed, ["up:a", "up:b"]);
}

#[test]
fn test_rollback_malformed_ledger_name_fails_resolving() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let mut m = migrator(tmp.path());
    m.apply().unwrap();
    let later = m.target().entries[0].applied_at + Duration::seconds(1);
    m.target_mut().record_applied("legacy_init", later).unwrap();
    let before = applied(&m);

    let err = m.rollback().unwrap_err();
    assert_eq!(err.step(), Some(("legacy_init", Phase::Resolving)));
    assert!(matches!(err.root(), MigrateError::InvalidName { name, .. } if name == "legacy_init"));
    assert_eq!(applied(&m), before);
    assert_eq!(m.target().executed, ["up:a"]);
}

#[test]
fn test_rollback_execution_failure_keeps_ledger() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "20240101000000_a.up.sql", "up:a");
    write(tmp.path(), "20240101000000_a.down.sql", "FAIL");

    let mut m = migrator(tmp.path());
    m.apply().unwrap();

    let err = m.rollback().unwrap_err();
    assert_eq!(err.step(), Some(("20240101000000_a.up.sql", Phase::Executing)));
    assert_eq!(applied(&m), ["20240101000000_a.up.sql"]);
}

#[test]
fn test_rollback_one_step_at_a_time() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");
    write_pair(tmp.path(), "20240102000000_b");

    let mut m = migrator(tmp.path());
    m.apply().unwrap();

    m.rollback().unwrap();
    assert_eq!(applied(&m), ["20240101000000_a.up.sql"]);
    m.rollback().unwrap();
    assert!(applied(&m).is_empty());
    assert_eq!(m.rollback().unwrap(), RollbackOutcome::NothingToRollBack);
    assert_eq!(m.target().executed, ["up:a", "up:b", "down:b", "down:a"]);
}

#[test]
fn test_rollback_then_reapply() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");

    let mut m = migrator(tmp.path());
    m.apply().unwrap();
    m.rollback().unwrap();
    assert!(applied(&m).is_empty());

    let report = m.apply().unwrap();
    assert_eq!(report.applied, ["20240101000000_a.up.sql"]);
    assert_eq!(applied(&m), ["20240101000000_a.up.sql"]);
    assert_eq!(m.target().executed, ["up:a", "down:a", "up:a"]);
}

#[test]
fn test_rollback_ties_break_by_name() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");
    write_pair(tmp.path(), "20240102000000_b");

    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let mut m = migrator(tmp.path()).with_clock(move || t0);
    m.apply().unwrap();

    let RollbackOutcome::RolledBack(entry) = m.rollback().unwrap() else {
        panic!("expected a rollback");
    };
    assert_eq!(entry.name, "20240102000000_b.up.sql");
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[test]
fn test_status_reports_pending_and_orphaned() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "20240101000000_a");
    write_pair(tmp.path(), "20240102000000_b");

    let mut m = migrator(tmp.path());
    m.target_mut()
        .record_applied("20231231000000_gone.up.sql", Utc::now())
        .unwrap();
    m.target_mut()
        .record_applied("20240101000000_a.up.sql", Utc::now())
        .unwrap();

    let status = m.status().unwrap();
    assert_eq!(
        status.applied,
        ["20231231000000_gone.up.sql", "20240101000000_a.up.sql"]
    );
    assert_eq!(status.pending, ["20240102000000_b.up.sql"]);
    assert_eq!(status.orphaned, ["20231231000000_gone.up.sql"]);
}
