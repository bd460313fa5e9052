//! `SQLite` connection pool with WAL mode and foreign keys enabled.
//!
//! Uses `r2d2` connection pooling with the `r2d2_sqlite` backend. The
//! [`PragmaCustomizer`] runs on each new connection so every checkout sees the
//! same pragmas.
//!
//! An in-memory database is private to the connection that created it, so a
//! [`DbSource::Memory`] pool always holds exactly one connection.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tally_settings::{DatabaseKind, DatabaseSettings};
use tracing::debug;

use crate::errors::Result;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Alias for a pooled connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Where the database lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DbSource {
    /// File-backed database; parent directories are created on open.
    File(PathBuf),
    /// Private in-memory database.
    Memory,
}

impl DbSource {
    /// Build the source described by `settings`.
    pub fn from_settings(settings: &DatabaseSettings) -> Self {
        match settings.kind {
            DatabaseKind::Sqlite => Self::File(PathBuf::from(&settings.path)),
            DatabaseKind::Memory => Self::Memory,
        }
    }
}

impl fmt::Display for DbSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory => f.write_str(":memory:"),
        }
    }
}

/// Configuration for the connection pool.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size (default: 8). Forced to 1 for in-memory databases.
    pub pool_size: u32,
    /// Busy timeout in milliseconds (default: 30000).
    pub busy_timeout_ms: u32,
    /// Cache size in KiB (default: 8192 = 8 MB).
    pub cache_size_kib: i64,
    /// How long a checkout waits for a free connection (default: 5s).
    pub connection_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
            connection_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&DatabaseSettings> for ConnectionConfig {
    fn from(settings: &DatabaseSettings) -> Self {
        Self {
            pool_size: settings.pool_size,
            busy_timeout_ms: settings.busy_timeout_ms,
            connection_timeout: settings.connection_timeout(),
            ..Self::default()
        }
    }
}

/// `SQLite` pragma customizer that runs on each new connection.
#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;\
             PRAGMA cache_size = -{};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms, self.cache_size_kib
        ))?;
        Ok(())
    }
}

/// Open a pool for `source`.
///
/// `r2d2` establishes the initial connections eagerly, so an unreachable or
/// unwritable database fails here rather than on first use.
pub fn open_pool(source: &DbSource, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let (manager, max_size) = match source {
        DbSource::File(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            (SqliteConnectionManager::file(path), config.pool_size.max(1))
        }
        DbSource::Memory => (SqliteConnectionManager::memory(), 1),
    };
    let mut builder = Pool::builder()
        .max_size(max_size)
        .connection_timeout(config.connection_timeout);
    if matches!(source, DbSource::Memory) {
        // the data lives only as long as this one connection
        builder = builder.min_idle(Some(1)).idle_timeout(None).max_lifetime(None);
    }
    let pool = builder
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)?;
    Ok(pool)
}

/// Run the trivial liveness statement on one pooled connection.
///
/// A pool whose connections are all checked out is busy, not dead: the
/// check passes without waiting for a checkout that may time out.
pub fn probe(pool: &ConnectionPool) -> Result<()> {
    let conn = match pool.try_get() {
        Some(conn) => conn,
        None if pool.state().connections > 0 => {
            debug!(connections = pool.state().connections, "pool busy, skipping liveness check");
            return Ok(());
        }
        None => pool.get()?,
    };
    let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
    debug_assert_eq!(one, 1);
    Ok(())
}

/// Verify pragmas are set correctly on a connection.
pub fn verify_pragmas(conn: &Connection) -> Result<PragmaState> {
    let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
    let foreign_keys: i32 = conn.query_row("PRAGMA foreign_keys", [], |row| row.get(0))?;
    Ok(PragmaState {
        journal_mode,
        foreign_keys_enabled: foreign_keys == 1,
    })
}

/// Pragma state for verification.
#[derive(Debug)]
pub struct PragmaState {
    /// Journal mode (`wal` for files, `memory` for in-memory databases).
    pub journal_mode: String,
    /// Whether foreign keys are enabled.
    pub foreign_keys_enabled: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_pool_has_single_connection() {
        let config = ConnectionConfig {
            pool_size: 16,
            ..Default::default()
        };
        let pool = open_pool(&DbSource::Memory, &config).unwrap();
        assert_eq!(pool.max_size(), 1);
        let conn = pool.get().unwrap();
        let pragmas = verify_pragmas(&conn).unwrap();
        assert_eq!(pragmas.journal_mode, "memory");
        assert!(pragmas.foreign_keys_enabled);
    }

    #[test]
    fn memory_pool_keeps_data_between_checkouts() {
        let pool = open_pool(&DbSource::Memory, &ConnectionConfig::default()).unwrap();
        pool.get()
            .unwrap()
            .execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7);")
            .unwrap();
        let x: i64 = pool
            .get()
            .unwrap()
            .query_row("SELECT x FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(x, 7);
    }

    #[test]
    fn file_pool_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let source = DbSource::File(dir.path().join("nested").join("tally.db"));
        let pool = open_pool(&source, &ConnectionConfig::default()).unwrap();
        let conn = pool.get().unwrap();
        let pragmas = verify_pragmas(&conn).unwrap();
        assert_eq!(pragmas.journal_mode, "wal");
        assert!(pragmas.foreign_keys_enabled);
    }

    #[test]
    fn probe_succeeds_on_healthy_pool() {
        let pool = open_pool(&DbSource::Memory, &ConnectionConfig::default()).unwrap();
        probe(&pool).unwrap();
    }

    #[test]
    fn probe_passes_while_only_connection_is_checked_out() {
        let config = ConnectionConfig {
            connection_timeout: Duration::from_millis(50),
            ..Default::default()
        };
        let pool = open_pool(&DbSource::Memory, &config).unwrap();
        let held = pool.get().unwrap();
        probe(&pool).unwrap();
        drop(held);
        probe(&pool).unwrap();
    }

    #[test]
    fn unopenable_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let source = DbSource::File(blocker.join("tally.db"));
        assert!(open_pool(&source, &ConnectionConfig::default()).is_err());
    }

    #[test]
    fn source_from_settings() {
        let settings = DatabaseSettings {
            kind: DatabaseKind::Memory,
            ..Default::default()
        };
        assert_eq!(DbSource::from_settings(&settings), DbSource::Memory);
        assert_eq!(DbSource::Memory.to_string(), ":memory:");
    }

    #[test]
    fn config_from_settings() {
        let settings = DatabaseSettings {
            pool_size: 3,
            connection_timeout_secs: 9,
            ..Default::default()
        };
        let config = ConnectionConfig::from(&settings);
        assert_eq!(config.pool_size, 3);
        assert_eq!(config.connection_timeout, Duration::from_secs(9));
    }
}
