//! Rename-create-copy-drop table rebuild with resumable steps.
//!
//! `SQLite` cannot drop a column in older versions, so removing one means
//! rebuilding the table:
//!
//! 1. rename `table` to `temp_table`
//! 2. create `table` with the new layout
//! 3. copy the kept columns from `temp_table`
//! 4. drop `temp_table`
//!
//! Each step checks its precondition first. A run interrupted between steps by
//! an earlier, non-transactional release leaves `temp_table` behind; the next
//! run notices it, skips the rename, and discards any partially built
//! `table` before recreating it from the intact copy.

use rusqlite::Connection;
use tracing::{debug, warn};

use crate::errors::{DbOpError, Result};
use crate::sqlite::schema::has_table;

/// One table rebuild.
#[derive(Clone, Debug)]
pub struct TableRebuild<'a> {
    table: &'a str,
    create_sql: &'a str,
    columns: &'a [&'a str],
}

impl<'a> TableRebuild<'a> {
    /// Rebuild `table` using `create_sql` (a plain `CREATE TABLE table ...`),
    /// keeping `columns`.
    pub fn new(table: &'a str, create_sql: &'a str, columns: &'a [&'a str]) -> Self {
        Self {
            table,
            create_sql,
            columns,
        }
    }

    /// Name of the holding table used during the rebuild.
    pub fn temp_table(&self) -> String {
        format!("temp_{}", self.table)
    }

    /// Whether a previous rebuild was interrupted.
    pub fn is_interrupted(&self, conn: &Connection) -> Result<bool> {
        has_table(conn, &self.temp_table())
    }

    /// Run (or resume) the rebuild.
    pub fn run(&self, conn: &Connection) -> Result<()> {
        let temp = self.temp_table();
        let temp_exists = has_table(conn, &temp)?;
        let table_exists = has_table(conn, self.table)?;

        match (temp_exists, table_exists) {
            (false, true) => {
                conn.execute_batch(&format!("ALTER TABLE {} RENAME TO {temp}", self.table))?;
            }
            (true, true) => {
                warn!(table = self.table, "resuming interrupted rebuild, discarding partial table");
                conn.execute_batch(&format!("DROP TABLE {}", self.table))?;
            }
            (true, false) => {
                debug!(table = self.table, "resuming interrupted rebuild after rename");
            }
            (false, false) => {
                return Err(DbOpError::InvalidData(format!(
                    "cannot rebuild {}: table does not exist",
                    self.table
                )));
            }
        }

        conn.execute_batch(self.create_sql)?;
        let columns = self.columns.join(", ");
        let _ = conn.execute(
            &format!(
                "INSERT INTO {} ({columns}) SELECT {columns} FROM {temp}",
                self.table
            ),
            [],
        )?;
        conn.execute_batch(&format!("DROP TABLE {temp}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::schema::has_column;

    const CREATE: &str = "CREATE TABLE g (id INTEGER PRIMARY KEY, name TEXT NOT NULL)";
    const COLUMNS: &[&str] = &["id", "name"];

    fn legacy() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE g (id INTEGER PRIMARY KEY, name TEXT NOT NULL, secret TEXT);
             INSERT INTO g VALUES (1, 'a', 's1'), (2, 'b', 's2');",
        )
        .unwrap();
        conn
    }

    fn names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn.prepare("SELECT name FROM g ORDER BY id").unwrap();
        stmt.query_map([], |r| r.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap()
    }

    #[test]
    fn rebuild_drops_column_and_keeps_rows() {
        let conn = legacy();
        let rebuild = TableRebuild::new("g", CREATE, COLUMNS);
        rebuild.run(&conn).unwrap();

        assert!(!has_column(&conn, "g", "secret").unwrap());
        assert!(!rebuild.is_interrupted(&conn).unwrap());
        assert_eq!(names(&conn), vec!["a", "b"]);
    }

    #[test]
    fn resumes_after_rename() {
        let conn = legacy();
        conn.execute_batch("ALTER TABLE g RENAME TO temp_g").unwrap();
        let rebuild = TableRebuild::new("g", CREATE, COLUMNS);
        assert!(rebuild.is_interrupted(&conn).unwrap());

        rebuild.run(&conn).unwrap();
        assert_eq!(names(&conn), vec!["a", "b"]);
        assert!(!has_table(&conn, "temp_g").unwrap());
    }

    #[test]
    fn resumes_after_partial_copy() {
        let conn = legacy();
        conn.execute_batch(
            "ALTER TABLE g RENAME TO temp_g;
             CREATE TABLE g (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
             INSERT INTO g (id, name) SELECT id, name FROM temp_g WHERE id = 1;",
        )
        .unwrap();

        TableRebuild::new("g", CREATE, COLUMNS).run(&conn).unwrap();
        assert_eq!(names(&conn), vec!["a", "b"]);
    }

    #[test]
    fn missing_table_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(TableRebuild::new("g", CREATE, COLUMNS).run(&conn).is_err());
    }
}
