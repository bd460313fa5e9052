//! Schema patches.
//!
//! A [`Patch`] is one idempotent schema step. Whether it has been applied is
//! decided by inspecting the schema itself (tables, columns), never by a
//! bookkeeping table, so a database upgraded by any earlier release is detected
//! correctly.
//!
//! [`PatchRunner`] applies patches in their declared order. Each patch runs in
//! its own `SQLite` transaction; a failure rolls that patch back, stops the
//! run, and is reported as fatal. Patches that already ran stay applied.
//!
//! Successful applications are also written to `plan_patches`. That table is
//! informational only and is never consulted when deciding what to apply.

mod columns;
mod geo_info;
mod rebuild;

use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tally_core::{ErrorReporter, Severity, TracingReporter};
use tracing::{debug, info};

use crate::errors::{DbOpError, Result, StoreError};
use crate::sqlite::schema::tables;

pub use columns::{AddColumnPatch, DropTablePatch};
pub use geo_info::{GeoInfoIpHashPatch, GeoInfoIpRemovalPatch};
pub use rebuild::TableRebuild;

const ORIGIN: &str = "patch-runner";

/// One idempotent schema step.
pub trait Patch: Send + Sync {
    /// Stable name, recorded in `plan_patches` and used in fault reports.
    fn name(&self) -> &'static str;

    /// Inspect the schema and decide whether this step is already in effect.
    fn has_been_applied(&self, conn: &Connection) -> Result<bool>;

    /// Perform the step. Runs inside a transaction opened by the runner.
    fn apply(&self, conn: &Connection) -> Result<()>;
}

/// Every patch, in the order it must run.
///
/// Later patches may depend on earlier ones: the geolocation rebuild copies the
/// `last_used` and `ip_hash` columns added before it.
pub fn all_patches() -> Vec<Box<dyn Patch>> {
    vec![
        Box::new(AddColumnPatch::new(
            "session_afk_time",
            tables::SESSIONS,
            "afk_time",
            "INTEGER NOT NULL DEFAULT 0",
        )),
        Box::new(AddColumnPatch::new(
            "worlds_server_id",
            tables::WORLDS,
            "server_id",
            "INTEGER REFERENCES plan_servers(id)",
        )),
        Box::new(AddColumnPatch::new(
            "nickname_last_used",
            tables::NICKNAMES,
            "last_used",
            "INTEGER NOT NULL DEFAULT 0",
        )),
        Box::new(AddColumnPatch::new(
            "geo_info_last_used",
            tables::GEOLOCATIONS,
            "last_used",
            "INTEGER NOT NULL DEFAULT 0",
        )),
        Box::new(GeoInfoIpHashPatch),
        Box::new(GeoInfoIpRemovalPatch),
        Box::new(DropTablePatch::new("transfer_table_removal", tables::TRANSFER)),
    ]
}

/// What a patch run did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatchSummary {
    /// Patches applied by this run, in order.
    pub applied: Vec<&'static str>,
    /// Patches found already in effect.
    pub skipped: Vec<&'static str>,
}

/// Applies patches in declared order, stopping at the first failure.
pub struct PatchRunner {
    patches: Vec<Box<dyn Patch>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl PatchRunner {
    /// Runner over `patches`, reporting to `reporter`.
    pub fn new(patches: Vec<Box<dyn Patch>>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self { patches, reporter }
    }

    /// Runner over [`all_patches`] that reports through `tracing`.
    pub fn with_defaults() -> Self {
        Self::new(all_patches(), Arc::new(TracingReporter))
    }

    /// Apply every pending patch.
    ///
    /// On failure the offending patch is rolled back, later patches are not
    /// attempted, and a fatal fault naming the patch is reported and returned.
    pub fn run(&self, conn: &Connection) -> std::result::Result<PatchSummary, StoreError> {
        ensure_patch_table(conn).map_err(|e| self.fail(tables::PATCHES, e))?;

        let mut summary = PatchSummary::default();
        for patch in &self.patches {
            let name = patch.name();
            match run_one(conn, patch.as_ref()) {
                Ok(true) => summary.applied.push(name),
                Ok(false) => summary.skipped.push(name),
                Err(e) => return Err(self.fail(name, e)),
            }
        }

        if !summary.applied.is_empty() {
            info!(applied = ?summary.applied, "schema patches complete");
        }
        Ok(summary)
    }

    fn fail(&self, step: &str, source: DbOpError) -> StoreError {
        let fault = StoreError::migration(step, source);
        self.reporter.report(Severity::Fatal, ORIGIN, &fault);
        fault
    }
}

impl std::fmt::Debug for PatchRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.patches.iter().map(|p| p.name()).collect();
        f.debug_struct("PatchRunner").field("patches", &names).finish()
    }
}

/// Names recorded in `plan_patches`, oldest first.
pub fn applied_patches(conn: &Connection) -> Result<Vec<String>> {
    ensure_patch_table(conn)?;
    let mut stmt = conn.prepare("SELECT name FROM plan_patches ORDER BY applied_at, rowid")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal
// ─────────────────────────────────────────────────────────────────────────────

fn ensure_patch_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS plan_patches (
           name       TEXT PRIMARY KEY,
           applied_at INTEGER NOT NULL
         );",
    )?;
    Ok(())
}

fn run_one(conn: &Connection, patch: &dyn Patch) -> Result<bool> {
    let name = patch.name();
    if patch.has_been_applied(conn)? {
        debug!(patch = name, "patch already in effect, skipping");
        return Ok(false);
    }

    info!(patch = name, "applying patch");
    let tx = conn.unchecked_transaction()?;
    patch.apply(&tx)?;
    if !patch.has_been_applied(&tx)? {
        return Err(DbOpError::InvalidData(format!(
            "patch {name} ran but its effect is not visible"
        )));
    }
    let _ = tx.execute(
        "INSERT OR REPLACE INTO plan_patches (name, applied_at) VALUES (?1, ?2)",
        rusqlite::params![name, Utc::now().timestamp_millis()],
    )?;
    tx.commit()?;
    Ok(true)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use tally_core::MemoryReporter;

    use super::*;
    use crate::sqlite::schema::{self, has_column, has_table};

    /// Creates table `name` when applied.
    struct CreateTable {
        name: &'static str,
        applies: Arc<AtomicUsize>,
    }

    impl Patch for CreateTable {
        fn name(&self) -> &'static str {
            self.name
        }

        fn has_been_applied(&self, conn: &Connection) -> Result<bool> {
            has_table(conn, self.name)
        }

        fn apply(&self, conn: &Connection) -> Result<()> {
            let _ = self.applies.fetch_add(1, Ordering::SeqCst);
            conn.execute_batch(&format!("CREATE TABLE {} (x INTEGER)", self.name))?;
            Ok(())
        }
    }

    /// Creates its table, then fails.
    struct Failing;

    impl Patch for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn has_been_applied(&self, conn: &Connection) -> Result<bool> {
            has_table(conn, "half_done")
        }

        fn apply(&self, conn: &Connection) -> Result<()> {
            conn.execute_batch("CREATE TABLE half_done (x INTEGER)")?;
            conn.execute_batch("INSERT INTO no_such_table VALUES (1)")?;
            Ok(())
        }
    }

    /// Never takes effect.
    struct Ineffective;

    impl Patch for Ineffective {
        fn name(&self) -> &'static str {
            "ineffective"
        }

        fn has_been_applied(&self, _conn: &Connection) -> Result<bool> {
            Ok(false)
        }

        fn apply(&self, _conn: &Connection) -> Result<()> {
            Ok(())
        }
    }

    fn create(name: &'static str, applies: &Arc<AtomicUsize>) -> Box<dyn Patch> {
        Box::new(CreateTable {
            name,
            applies: Arc::clone(applies),
        })
    }

    #[test]
    fn applies_pending_patches_once() {
        let conn = Connection::open_in_memory().unwrap();
        let applies = Arc::new(AtomicUsize::new(0));
        let runner = PatchRunner::new(
            vec![create("first", &applies), create("second", &applies)],
            Arc::new(MemoryReporter::new()),
        );

        let summary = runner.run(&conn).unwrap();
        assert_eq!(summary.applied, vec!["first", "second"]);
        assert!(summary.skipped.is_empty());

        let again = runner.run(&conn).unwrap();
        assert!(again.applied.is_empty());
        assert_eq!(again.skipped, vec!["first", "second"]);
        assert_eq!(applies.load(Ordering::SeqCst), 2);
        assert_eq!(applied_patches(&conn).unwrap().len(), 2);
    }

    #[test]
    fn failure_stops_later_patches_and_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        let applies = Arc::new(AtomicUsize::new(0));
        let reporter = Arc::new(MemoryReporter::new());
        let runner = PatchRunner::new(
            vec![
                create("before", &applies),
                Box::new(Failing),
                create("after", &applies),
            ],
            reporter.clone(),
        );

        let err = runner.run(&conn).unwrap_err();
        assert_matches!(err, StoreError::Migration { ref step, .. } if step == "failing");
        assert!(has_table(&conn, "before").unwrap());
        assert!(!has_table(&conn, "half_done").unwrap());
        assert!(!has_table(&conn, "after").unwrap());
        assert_eq!(applies.load(Ordering::SeqCst), 1);
        assert_eq!(reporter.count(Severity::Fatal), 1);
        assert!(reporter.reports()[0].message.contains("failing"));
    }

    #[test]
    fn patch_without_visible_effect_fails() {
        let conn = Connection::open_in_memory().unwrap();
        let runner = PatchRunner::new(vec![Box::new(Ineffective)], Arc::new(MemoryReporter::new()));
        assert_matches!(runner.run(&conn), Err(StoreError::Migration { .. }));
        assert!(applied_patches(&conn).unwrap().is_empty());
    }

    #[test]
    fn decisions_ignore_the_audit_table() {
        let conn = Connection::open_in_memory().unwrap();
        let applies = Arc::new(AtomicUsize::new(0));
        let runner = PatchRunner::new(vec![create("audited", &applies)], Arc::new(MemoryReporter::new()));
        runner.run(&conn).unwrap();

        // Forget the record; the schema still shows the patch in effect.
        let _ = conn.execute("DELETE FROM plan_patches", []).unwrap();
        let summary = runner.run(&conn).unwrap();
        assert_eq!(summary.skipped, vec!["audited"]);
        assert_eq!(applies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn declared_patches_are_all_skipped_on_fresh_schema() {
        let conn = Connection::open_in_memory().unwrap();
        schema::create_tables(&conn).unwrap();
        let summary = PatchRunner::with_defaults().run(&conn).unwrap();
        assert!(summary.applied.is_empty());
        assert_eq!(summary.skipped.len(), all_patches().len());
        assert!(has_column(&conn, tables::GEOLOCATIONS, "ip_hash").unwrap());
    }

    #[test]
    fn declared_names_are_unique() {
        let mut names: Vec<_> = all_patches().iter().map(|p| p.name()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }
}
