//! Single-statement patches: add a column, drop a table.

use rusqlite::Connection;

use super::Patch;
use crate::errors::Result;
use crate::sqlite::schema::{has_column, has_table};

/// Adds `column` to `table` when it is missing.
#[derive(Clone, Debug)]
pub struct AddColumnPatch {
    name: &'static str,
    table: &'static str,
    column: &'static str,
    definition: &'static str,
}

impl AddColumnPatch {
    /// `definition` is the column type and constraints, e.g.
    /// `INTEGER NOT NULL DEFAULT 0`.
    pub const fn new(
        name: &'static str,
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    ) -> Self {
        Self {
            name,
            table,
            column,
            definition,
        }
    }
}

impl Patch for AddColumnPatch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn has_been_applied(&self, conn: &Connection) -> Result<bool> {
        has_column(conn, self.table, self.column)
    }

    fn apply(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            self.table, self.column, self.definition
        ))?;
        Ok(())
    }
}

/// Drops an obsolete table when it still exists.
#[derive(Clone, Debug)]
pub struct DropTablePatch {
    name: &'static str,
    table: &'static str,
}

impl DropTablePatch {
    /// Patch `name` dropping `table`.
    pub const fn new(name: &'static str, table: &'static str) -> Self {
        Self { name, table }
    }
}

impl Patch for DropTablePatch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn has_been_applied(&self, conn: &Connection) -> Result<bool> {
        Ok(!has_table(conn, self.table)?)
    }

    fn apply(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!("DROP TABLE {}", self.table))?;
        Ok(())
    }
}
