//! Read-only queries.

use std::collections::BTreeMap;

use rusqlite::OptionalExtension;
use tally_core::ServerUuid;
use uuid::Uuid;

use crate::sqlite::schema::TABLES_IN_DEPENDENCY_ORDER;
use crate::transaction::Query;

/// Command name to use count on `server`.
pub fn command_usage(server: ServerUuid) -> Query<BTreeMap<String, i64>> {
    Query::new("command_usage", move |conn| {
        let mut stmt = conn.prepare_cached(
            "SELECT c.command_name, c.times_used FROM plan_commandusages c \
             JOIN plan_servers s ON s.id = c.server_id WHERE s.uuid = ?1",
        )?;
        let usage = stmt
            .query_map([server.to_string()], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<BTreeMap<String, i64>>>()?;
        Ok(usage)
    })
}

/// Number of registered players.
pub fn user_count() -> Query<i64> {
    Query::new("user_count", |conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM plan_users", [], |row| row.get(0))?)
    })
}

/// Number of stored sessions.
pub fn session_count() -> Query<i64> {
    Query::new("session_count", |conn| {
        Ok(conn.query_row("SELECT COUNT(*) FROM plan_sessions", [], |row| row.get(0))?)
    })
}

/// Row id of `server`, if registered.
pub fn server_id_of(server: ServerUuid) -> Query<Option<i64>> {
    Query::new("server_id_of", move |conn| {
        Ok(conn
            .query_row(
                "SELECT id FROM plan_servers WHERE uuid = ?1",
                [server.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    })
}

/// Row id of `player`, if registered.
pub fn user_id_of(player: Uuid) -> Query<Option<i64>> {
    Query::new("user_id_of", move |conn| {
        Ok(conn
            .query_row(
                "SELECT id FROM plan_users WHERE uuid = ?1",
                [player.to_string()],
                |row| row.get(0),
            )
            .optional()?)
    })
}

/// Sessions whose player or server row does not exist.
pub fn orphaned_sessions() -> Query<i64> {
    Query::new("orphaned_sessions", |conn| {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM plan_sessions s \
             LEFT JOIN plan_users u ON u.id = s.user_id \
             LEFT JOIN plan_servers v ON v.id = s.server_id \
             WHERE u.id IS NULL OR v.id IS NULL",
            [],
            |row| row.get(0),
        )?)
    })
}

/// Row count of every data table, in dependency order.
pub fn row_counts() -> Query<Vec<(String, i64)>> {
    Query::new("row_counts", |conn| {
        let mut counts = Vec::with_capacity(TABLES_IN_DEPENDENCY_ORDER.len());
        for table in TABLES_IN_DEPENDENCY_ORDER {
            let rows: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            counts.push(((*table).to_string(), rows));
        }
        Ok(counts)
    })
}
