//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON file format
//! and `#[serde(default)]` so a partial file only overrides what it names.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "database": { "path": "/srv/tally/stats.db", "poolSize": 4 },
///   "data": { "keepInactivePlayersDays": 90 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TallySettings {
    /// Storage backend and connection settings.
    pub database: DatabaseSettings,
    /// Task processor lane sizes and shutdown timings.
    pub tasks: TaskSettings,
    /// Data retention and migration settings.
    pub data: DataSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TallySettings {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(SettingsError::InvalidValue(
                "database.poolSize must be at least 1".into(),
            ));
        }
        if self.database.keep_alive_interval_secs == 0 {
            return Err(SettingsError::InvalidValue(
                "database.keepAliveIntervalSecs must be at least 1".into(),
            ));
        }
        if self.tasks.critical_workers == 0 || self.tasks.non_critical_workers == 0 {
            return Err(SettingsError::InvalidValue(
                "task lanes need at least one worker each".into(),
            ));
        }
        if self.data.migration_batch_size == 0 {
            return Err(SettingsError::InvalidValue(
                "data.migrationBatchSize must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Which storage backend to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// File-backed `SQLite` database at [`DatabaseSettings::path`].
    #[default]
    Sqlite,
    /// Private in-memory database; contents are lost on close.
    Memory,
}

/// Storage backend settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseSettings {
    /// Backend kind.
    pub kind: DatabaseKind,
    /// Database file path (ignored for `memory`).
    pub path: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Seconds to wait for a pooled connection before failing.
    pub connection_timeout_secs: u64,
    /// Interval between liveness probes.
    pub keep_alive_interval_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            kind: DatabaseKind::Sqlite,
            path: crate::loader::tally_dir()
                .join("database.db")
                .to_string_lossy()
                .into_owned(),
            pool_size: 8,
            busy_timeout_ms: 30_000,
            connection_timeout_secs: 5,
            keep_alive_interval_secs: 300,
        }
    }
}

impl DatabaseSettings {
    /// Liveness probe interval.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_interval_secs)
    }

    /// Pool checkout timeout.
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }
}

/// Task processor settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskSettings {
    /// Workers in the critical lane.
    pub critical_workers: usize,
    /// Workers in the non-critical lane.
    pub non_critical_workers: usize,
    /// How long queued and in-flight critical work may keep running after
    /// shutdown begins.
    pub critical_grace_ms: u64,
    /// Final wait for critical workers after forced completion.
    pub termination_check_ms: u64,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            critical_workers: 2,
            non_critical_workers: 6,
            critical_grace_ms: 3_000,
            termination_check_ms: 1_000,
        }
    }
}

impl TaskSettings {
    /// Critical drain grace period.
    pub fn critical_grace(&self) -> Duration {
        Duration::from_millis(self.critical_grace_ms)
    }

    /// Final worker termination wait.
    pub fn termination_check(&self) -> Duration {
        Duration::from_millis(self.termination_check_ms)
    }
}

/// Data retention and bulk-copy settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataSettings {
    /// Players inactive for longer than this many days are removed.
    pub keep_inactive_players_days: u64,
    /// Interval between retention cleanup runs.
    pub cleanup_interval_secs: u64,
    /// Records per insert batch during batch migration.
    pub migration_batch_size: usize,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            keep_inactive_players_days: 180,
            cleanup_interval_secs: 3_600,
            migration_batch_size: 2_048,
        }
    }
}

impl DataSettings {
    /// Retention window as a duration.
    pub fn keep_inactive(&self) -> Duration {
        Duration::from_secs(self.keep_inactive_players_days.saturating_mul(24 * 60 * 60))
    }

    /// Cleanup interval as a duration.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
