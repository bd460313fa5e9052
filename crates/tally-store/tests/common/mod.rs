#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use rusqlite::Connection;
use tally_core::{MemoryReporter, ServerUuid};
use tally_store::records::{FinishedSession, PlayerKill, PlayerRegistration, ServerInfo, WorldTime};
use tally_store::{ConnectionConfig, Database, DbSource, transactions};
use uuid::Uuid;

/// Schema written by releases that predate every declared patch.
pub const LEGACY_SCHEMA: &str = "
CREATE TABLE plan_servers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    web_address TEXT,
    is_installed INTEGER NOT NULL DEFAULT 1,
    max_players INTEGER NOT NULL DEFAULT -1
);
CREATE TABLE plan_users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uuid TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    registered INTEGER NOT NULL,
    times_kicked INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE plan_worlds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    world_name TEXT NOT NULL
);
CREATE TABLE plan_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES plan_users(id),
    server_id INTEGER NOT NULL REFERENCES plan_servers(id),
    session_start INTEGER NOT NULL,
    session_end INTEGER NOT NULL,
    mob_kills INTEGER NOT NULL DEFAULT 0,
    deaths INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE plan_nicknames (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES plan_users(id),
    server_id INTEGER NOT NULL REFERENCES plan_servers(id),
    nickname TEXT NOT NULL
);
CREATE TABLE plan_geolocations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES plan_users(id),
    ip TEXT NOT NULL,
    geolocation TEXT NOT NULL
);
CREATE TABLE plan_transfer (
    sender_server_id INTEGER,
    expiry_date INTEGER,
    type TEXT,
    content_64 TEXT
);
";

pub const LEGACY_SERVER: &str = "7d3c8d4e-1111-4a4a-9b9b-000000000001";
pub const LEGACY_PLAYER: &str = "7d3c8d4e-2222-4a4a-9b9b-000000000002";
pub const LEGACY_IP: &str = "203.0.113.9";

/// Write a legacy database with one row in most tables.
pub fn write_legacy(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(LEGACY_SCHEMA).unwrap();
    conn.execute_batch(&format!(
        "INSERT INTO plan_servers (uuid, name) VALUES ('{LEGACY_SERVER}', 'Old');
         INSERT INTO plan_users (uuid, name, registered) VALUES ('{LEGACY_PLAYER}', 'Veteran', 1000);
         INSERT INTO plan_worlds (world_name) VALUES ('world');
         INSERT INTO plan_sessions (user_id, server_id, session_start, session_end) VALUES (1, 1, 1000, 5000);
         INSERT INTO plan_nicknames (user_id, server_id, nickname) VALUES (1, 1, 'Vet');
         INSERT INTO plan_geolocations (user_id, ip, geolocation) VALUES (1, '{LEGACY_IP}', 'Norway');
         INSERT INTO plan_transfer (sender_server_id, type) VALUES (1, 'onlineStatus');"
    ))
    .unwrap();
}

pub fn open_file(path: &Path) -> (Database, Arc<MemoryReporter>) {
    let reporter = Arc::new(MemoryReporter::new());
    let db = Database::open(
        DbSource::File(path.to_path_buf()),
        ConnectionConfig::default(),
        reporter.clone(),
    )
    .unwrap();
    (db, reporter)
}

pub fn count(db: &Database, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {table}");
    db.with_connection(|conn| Ok(conn.query_row(&sql, [], |r| r.get(0))?))
        .unwrap()
}

pub fn server(db: &Database) -> ServerUuid {
    let uuid = ServerUuid::random();
    db.execute(&transactions::store_server(ServerInfo {
        uuid,
        name: "Survival".into(),
        web_address: None,
        max_players: 20,
    }))
    .unwrap();
    uuid
}

pub fn player(db: &Database, name: &str) -> Uuid {
    let player = Uuid::new_v4();
    db.execute(&transactions::register_user(PlayerRegistration {
        player,
        name: name.into(),
        registered: 0,
    }))
    .unwrap();
    player
}

pub fn session(player: Uuid, server: ServerUuid, victim: Uuid, start: i64) -> FinishedSession {
    FinishedSession {
        player,
        server,
        start,
        end: start + 60_000,
        mob_kills: 2,
        deaths: 0,
        afk_time: 0,
        world_times: vec![WorldTime {
            world: "world".into(),
            survival: 60_000,
            ..Default::default()
        }],
        kills: vec![PlayerKill {
            victim,
            weapon: "Iron Axe".into(),
            date: start + 1,
        }],
    }
}
