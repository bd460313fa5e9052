//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TallySettings::default()`]
//! 2. If `~/.tally/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TALLY_*` environment variable overrides
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::{DatabaseKind, TallySettings};

/// Directory holding tally's files (`~/.tally`).
pub fn tally_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tally")
}

/// Resolve the path to the settings file (`~/.tally/settings.json`).
pub fn settings_path() -> PathBuf {
    tally_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TallySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or out-of-range values are
/// errors.
pub fn load_settings_from_path(path: &Path) -> Result<TallySettings> {
    let defaults = serde_json::to_value(TallySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TallySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are logged and ignored (the file/default value stays).
pub fn apply_env_overrides(settings: &mut TallySettings) {
    if let Some(v) = read_env_string("TALLY_DB_PATH") {
        settings.database.path = v;
    }
    if let Some(v) = read_env_string("TALLY_DB_KIND") {
        match parse_kind(&v) {
            Some(kind) => settings.database.kind = kind,
            None => warn!(key = "TALLY_DB_KIND", value = %v, "invalid database kind, ignoring"),
        }
    }
    if let Some(v) = read_env_u64("TALLY_DB_POOL_SIZE", 1, 256) {
        settings.database.pool_size = u32::try_from(v).unwrap_or(settings.database.pool_size);
    }
    if let Some(v) = read_env_u64("TALLY_KEEP_ALIVE_SECS", 1, 86_400) {
        settings.database.keep_alive_interval_secs = v;
    }
    if let Some(v) = read_env_usize("TALLY_CRITICAL_WORKERS", 1, 64) {
        settings.tasks.critical_workers = v;
    }
    if let Some(v) = read_env_usize("TALLY_NON_CRITICAL_WORKERS", 1, 256) {
        settings.tasks.non_critical_workers = v;
    }
    if let Some(v) = read_env_u64("TALLY_KEEP_INACTIVE_DAYS", 1, 36_500) {
        settings.data.keep_inactive_players_days = v;
    }
    if let Some(v) = read_env_string("TALLY_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// Parse a database kind name.
pub fn parse_kind(val: &str) -> Option<DatabaseKind> {
    match val.to_lowercase().as_str() {
        "sqlite" => Some(DatabaseKind::Sqlite),
        "memory" => Some(DatabaseKind::Memory),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}
