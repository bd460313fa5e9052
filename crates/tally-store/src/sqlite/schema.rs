//! Table layout and schema introspection.
//!
//! [`create_tables`] brings a fresh database straight to the latest layout.
//! Databases created by older releases keep their old shape until the
//! [`patches`](crate::patches) upgrade them; `CREATE TABLE IF NOT EXISTS`
//! leaves existing tables untouched.

use rusqlite::{Connection, OptionalExtension};

use crate::errors::Result;

/// Table names.
pub mod tables {
    /// Registered servers.
    pub const SERVERS: &str = "plan_servers";
    /// Players, one row per player UUID.
    pub const USERS: &str = "plan_users";
    /// Per-server player info.
    pub const USER_INFO: &str = "plan_user_info";
    /// World names per server.
    pub const WORLDS: &str = "plan_worlds";
    /// Finished play sessions.
    pub const SESSIONS: &str = "plan_sessions";
    /// Per-world gamemode times of a session.
    pub const WORLD_TIMES: &str = "plan_world_times";
    /// Player kills.
    pub const KILLS: &str = "plan_kills";
    /// Ping samples.
    pub const PING: &str = "plan_ping";
    /// Command usage counters.
    pub const COMMAND_USAGES: &str = "plan_commandusages";
    /// Geolocation of player connections.
    pub const GEOLOCATIONS: &str = "plan_geolocations";
    /// Display names seen per server.
    pub const NICKNAMES: &str = "plan_nicknames";
    /// Server performance samples.
    pub const TPS: &str = "plan_tps";
    /// Informational record of applied patches.
    pub const PATCHES: &str = "plan_patches";
    /// Table removed by the `transfer_table_removal` patch.
    pub const TRANSFER: &str = "plan_transfer";
}

/// Data tables, each listed after every table it references.
///
/// Batch migration copies in this order; bulk removal deletes in reverse.
pub const TABLES_IN_DEPENDENCY_ORDER: &[&str] = &[
    tables::SERVERS,
    tables::USERS,
    tables::USER_INFO,
    tables::WORLDS,
    tables::SESSIONS,
    tables::WORLD_TIMES,
    tables::KILLS,
    tables::PING,
    tables::COMMAND_USAGES,
    tables::GEOLOCATIONS,
    tables::NICKNAMES,
    tables::TPS,
];

/// `CREATE` statement for the latest geolocation layout.
///
/// Shared with the rebuild patch that drops the legacy plaintext `ip` column.
pub const CREATE_GEOLOCATIONS: &str = "\
CREATE TABLE plan_geolocations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES plan_users(id),
    geolocation TEXT NOT NULL,
    ip_hash     TEXT,
    last_used   INTEGER NOT NULL DEFAULT 0
)";

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS plan_servers (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid        TEXT NOT NULL UNIQUE,
    name        TEXT NOT NULL,
    web_address TEXT,
    is_installed INTEGER NOT NULL DEFAULT 1,
    max_players INTEGER NOT NULL DEFAULT -1
);

CREATE TABLE IF NOT EXISTS plan_users (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid         TEXT NOT NULL UNIQUE,
    name         TEXT NOT NULL,
    registered   INTEGER NOT NULL,
    times_kicked INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS plan_user_info (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id    INTEGER NOT NULL REFERENCES plan_users(id),
    server_id  INTEGER NOT NULL REFERENCES plan_servers(id),
    registered INTEGER NOT NULL,
    opped      INTEGER NOT NULL DEFAULT 0,
    banned     INTEGER NOT NULL DEFAULT 0,
    UNIQUE (user_id, server_id)
);

CREATE TABLE IF NOT EXISTS plan_worlds (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    world_name TEXT NOT NULL,
    server_id  INTEGER REFERENCES plan_servers(id)
);

CREATE TABLE IF NOT EXISTS plan_sessions (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id       INTEGER NOT NULL REFERENCES plan_users(id),
    server_id     INTEGER NOT NULL REFERENCES plan_servers(id),
    session_start INTEGER NOT NULL,
    session_end   INTEGER NOT NULL,
    mob_kills     INTEGER NOT NULL DEFAULT 0,
    deaths        INTEGER NOT NULL DEFAULT 0,
    afk_time      INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON plan_sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_server ON plan_sessions(server_id);

CREATE TABLE IF NOT EXISTS plan_world_times (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id        INTEGER NOT NULL REFERENCES plan_users(id),
    world_id       INTEGER NOT NULL REFERENCES plan_worlds(id),
    server_id      INTEGER NOT NULL REFERENCES plan_servers(id),
    session_id     INTEGER NOT NULL REFERENCES plan_sessions(id),
    survival_time  INTEGER NOT NULL DEFAULT 0,
    creative_time  INTEGER NOT NULL DEFAULT 0,
    adventure_time INTEGER NOT NULL DEFAULT 0,
    spectator_time INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS plan_kills (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    killer_id  INTEGER NOT NULL REFERENCES plan_users(id),
    victim_id  INTEGER NOT NULL REFERENCES plan_users(id),
    server_id  INTEGER NOT NULL REFERENCES plan_servers(id),
    session_id INTEGER NOT NULL REFERENCES plan_sessions(id),
    weapon     TEXT NOT NULL,
    date       INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS plan_ping (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id   INTEGER NOT NULL REFERENCES plan_users(id),
    server_id INTEGER NOT NULL REFERENCES plan_servers(id),
    date      INTEGER NOT NULL,
    max_ping  INTEGER NOT NULL,
    min_ping  INTEGER NOT NULL,
    avg_ping  REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS plan_commandusages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    command_name TEXT NOT NULL,
    times_used   INTEGER NOT NULL DEFAULT 0,
    server_id    INTEGER NOT NULL REFERENCES plan_servers(id),
    UNIQUE (command_name, server_id)
);

CREATE TABLE IF NOT EXISTS plan_geolocations (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id     INTEGER NOT NULL REFERENCES plan_users(id),
    geolocation TEXT NOT NULL,
    ip_hash     TEXT,
    last_used   INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS plan_nicknames (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id   INTEGER NOT NULL REFERENCES plan_users(id),
    server_id INTEGER NOT NULL REFERENCES plan_servers(id),
    nickname  TEXT NOT NULL,
    last_used INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS plan_tps (
    server_id       INTEGER NOT NULL REFERENCES plan_servers(id),
    date            INTEGER NOT NULL,
    tps             REAL NOT NULL,
    players_online  INTEGER NOT NULL,
    cpu_usage       REAL NOT NULL,
    ram_usage       INTEGER NOT NULL,
    entities        INTEGER NOT NULL,
    chunks_loaded   INTEGER NOT NULL,
    free_disk_space INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tps_server_date ON plan_tps(server_id, date);

CREATE TABLE IF NOT EXISTS plan_patches (
    name       TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
";

/// Create every missing table at its latest layout.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_TABLES)?;
    Ok(())
}

/// Whether a table named `table` exists.
pub fn has_table(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Column names of `table`, in declaration order. Empty if the table is missing.
pub fn columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// Whether `table` has a column named `column`.
pub fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    Ok(columns(conn, table)?.iter().any(|c| c == column))
}

/// Tables referenced by foreign keys declared on `table`.
pub fn referenced_tables(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT \"table\" FROM pragma_foreign_key_list(?1)")?;
    let names = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
