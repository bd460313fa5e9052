//! Whole-database copy from one store into another.
//!
//! The destination is emptied first, then every data table is copied in
//! dependency order so a row is never inserted before the rows it references.
//! Rows are copied verbatim, primary keys included, and grouped into bounded
//! batches; each batch is one destination transaction.
//!
//! There is no resume or rollback across batches: a failure part-way leaves the
//! destination partially filled. The failure is reported as fatal and
//! returned, naming the table that failed.

pub mod batches;

use std::collections::BTreeMap;
use std::sync::Arc;

use rusqlite::types::Value;
use tally_core::Severity;
use tracing::{debug, info};

use crate::database::Database;
use crate::errors::{DbOpError, StoreError};
use crate::transaction::{Query, Transaction};
use crate::transactions::remove_everything;

pub use batches::{DEFAULT_BATCH_SIZE, chunked, split_keyed};

const ORIGIN: &str = "batch-migrator";

/// A table in the copy plan and the column its rows are grouped by.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CopyTable {
    /// Table name.
    pub name: &'static str,
    /// Column identifying the owning row, if any.
    pub owner: Option<&'static str>,
}

const fn table(name: &'static str, owner: Option<&'static str>) -> CopyTable {
    CopyTable { name, owner }
}

/// Tables in copy order. Every table appears after the tables it references.
pub const COPY_PLAN: &[CopyTable] = &[
    table("plan_servers", None),
    table("plan_users", None),
    table("plan_user_info", Some("user_id")),
    table("plan_worlds", Some("server_id")),
    table("plan_sessions", Some("user_id")),
    table("plan_world_times", Some("session_id")),
    table("plan_kills", Some("session_id")),
    table("plan_ping", Some("user_id")),
    table("plan_commandusages", Some("server_id")),
    table("plan_geolocations", Some("user_id")),
    table("plan_nicknames", Some("user_id")),
    table("plan_tps", Some("server_id")),
];

/// Rows copied for one table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableCopy {
    /// Table name.
    pub table: &'static str,
    /// Rows inserted into the destination.
    pub rows: usize,
    /// Destination transactions used.
    pub batches: usize,
}

/// What a migration copied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MigrationSummary {
    /// Per-table results, in copy order.
    pub tables: Vec<TableCopy>,
}

impl MigrationSummary {
    /// Total rows copied.
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

struct TableRows {
    columns: Arc<Vec<String>>,
    groups: BTreeMap<Option<i64>, Vec<Vec<Value>>>,
}

/// Copies every data table from `source` into `destination`.
#[derive(Debug)]
pub struct BatchMigrator<'a> {
    source: &'a Database,
    destination: &'a Database,
    batch_size: usize,
}

impl<'a> BatchMigrator<'a> {
    /// Migrator using [`DEFAULT_BATCH_SIZE`].
    pub fn new(source: &'a Database, destination: &'a Database) -> Self {
        Self {
            source,
            destination,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Use at most `batch_size` rows per destination transaction.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Clear the destination and copy everything.
    pub fn run(&self) -> Result<MigrationSummary, StoreError> {
        info!(
            from = %self.source.source(),
            to = %self.destination.source(),
            "batch migration starting"
        );
        let _ = self
            .destination
            .execute(&remove_everything())
            .map_err(|e| self.fail("remove_everything", e))?;

        let mut summary = MigrationSummary::default();
        for table in COPY_PLAN {
            let copied = self.copy_table(*table).map_err(|e| self.fail(table.name, e))?;
            debug!(table = table.name, rows = copied.rows, batches = copied.batches, "table copied");
            summary.tables.push(copied);
        }
        info!(rows = summary.total_rows(), "batch migration complete");
        Ok(summary)
    }

    fn copy_table(&self, table: CopyTable) -> Result<TableCopy, DbOpError> {
        let rows = self.source.query(&read_table(table))?;
        let total: usize = rows.groups.values().map(Vec::len).sum();
        let batches: Vec<Vec<Vec<Value>>> = match table.owner {
            Some(_) => split_keyed(rows.groups, self.batch_size)
                .into_iter()
                .map(|batch| batch.into_values().flatten().collect())
                .collect(),
            None => chunked(rows.groups.into_values().flatten().collect(), self.batch_size),
        };
        let batch_count = batches.len();

        for batch in batches {
            let _ = self
                .destination
                .execute(&insert_rows(table.name, Arc::clone(&rows.columns), batch))?;
        }
        Ok(TableCopy {
            table: table.name,
            rows: total,
            batches: batch_count,
        })
    }

    fn fail(&self, step: &str, source: DbOpError) -> StoreError {
        let fault = StoreError::migration(step, source);
        self.source.reporter().report(Severity::Fatal, ORIGIN, &fault);
        fault
    }
}

fn read_table(table: CopyTable) -> Query<TableRows> {
    Query::new(format!("read_{}", table.name), move |conn| {
        let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", table.name))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let owner_index = match table.owner {
            Some(owner) => Some(columns.iter().position(|c| c == owner).ok_or_else(|| {
                DbOpError::InvalidData(format!("{} has no column {owner}", table.name))
            })?),
            None => None,
        };
        let width = columns.len();

        let mut groups: BTreeMap<Option<i64>, Vec<Vec<Value>>> = BTreeMap::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let key = match owner_index {
                Some(index) => row.get::<_, Option<i64>>(index)?,
                None => None,
            };
            let values = (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Vec<_>>>()?;
            groups.entry(key).or_default().push(values);
        }
        Ok(TableRows {
            columns: Arc::new(columns),
            groups,
        })
    })
}

fn insert_rows(table: &'static str, columns: Arc<Vec<String>>, rows: Vec<Vec<Value>>) -> Transaction {
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    );
    Transaction::new(format!("copy_{table}"), move |ctx| {
        let inserted = ctx.execute_batch(&sql, &rows, |stmt, row| {
            for (i, value) in row.iter().enumerate() {
                stmt.raw_bind_parameter(i + 1, value)?;
            }
            Ok(())
        })?;
        if inserted != rows.len() {
            return Err(DbOpError::InvalidData(format!(
                "inserted {inserted} of {} rows into {table}",
                rows.len()
            )));
        }
        Ok(())
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tally_core::MemoryReporter;

    use super::*;
    use crate::queries;
    use crate::sqlite::schema::TABLES_IN_DEPENDENCY_ORDER;
    use crate::sqlite::{ConnectionConfig, DbSource};
    use crate::transactions::{self, fixtures};

    #[test]
    fn copy_plan_matches_dependency_order() {
        let names: Vec<_> = COPY_PLAN.iter().map(|t| t.name).collect();
        assert_eq!(names, TABLES_IN_DEPENDENCY_ORDER);
    }

    #[test]
    fn copies_every_table_and_replaces_destination() {
        let source = Database::in_memory().unwrap();
        let server = fixtures::server(&source);
        for i in 0..5 {
            let _ = fixtures::player(&source, &format!("p{i}"), i);
        }
        let _ = source
            .execute(&transactions::store_command_usage(server, "/help"))
            .unwrap();

        let destination = Database::in_memory().unwrap();
        let _ = fixtures::server(&destination);
        let _ = fixtures::player(&destination, "stale", 0);

        let summary = BatchMigrator::new(&source, &destination)
            .with_batch_size(2)
            .run()
            .unwrap();

        assert_eq!(destination.query(&queries::user_count()).unwrap(), 5);
        assert_eq!(fixtures::count(&destination, "plan_servers"), 1);
        assert_eq!(
            destination.query(&queries::command_usage(server)).unwrap()["/help"],
            1
        );
        let users = summary.tables.iter().find(|t| t.table == "plan_users").unwrap();
        assert_eq!(users.rows, 5);
        assert_eq!(users.batches, 3);
        assert_eq!(summary.total_rows(), 7);
    }

    #[test]
    fn unowned_rows_keep_their_order_across_batches() {
        let source = Database::in_memory().unwrap();
        for i in 0..7 {
            let _ = fixtures::player(&source, &format!("p{i}"), i);
        }
        let ids = |db: &Database| {
            db.with_connection(|conn| {
                let mut stmt = conn.prepare("SELECT id FROM plan_users ORDER BY rowid")?;
                let ids = stmt
                    .query_map([], |r| r.get::<_, i64>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(ids)
            })
            .unwrap()
        };

        let destination = Database::in_memory().unwrap();
        let summary = BatchMigrator::new(&source, &destination)
            .with_batch_size(3)
            .run()
            .unwrap();

        let users = summary.tables.iter().find(|t| t.table == "plan_users").unwrap();
        assert_eq!(users.batches, 3);
        assert_eq!(ids(&destination), ids(&source));
    }

    #[test]
    fn failure_is_reported_and_stops_the_copy() {
        let reporter = Arc::new(MemoryReporter::new());
        let source = Database::open(DbSource::Memory, ConnectionConfig::default(), reporter.clone())
            .unwrap();
        let _ = fixtures::server(&source);
        let destination = Database::in_memory().unwrap();
        destination
            .with_connection(|conn| {
                conn.execute_batch("DROP TABLE plan_tps")?;
                Ok(())
            })
            .unwrap();

        let err = BatchMigrator::new(&source, &destination).run().unwrap_err();
        assert_matches!(err, StoreError::Migration { ref step, .. } if step == "remove_everything");
        assert_eq!(reporter.count(Severity::Fatal), 1);
        assert_eq!(fixtures::count(&destination, "plan_servers"), 0);
    }
}
