//! # tally-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TallySettings::default()`]
//! 2. **User file**: `~/.tally/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `TALLY_*` overrides (highest priority)
//!
//! There is no process-wide settings instance. The host loads settings once
//! and passes the relevant section to each component it constructs.
//!
//! ```no_run
//! let settings = tally_settings::load_settings().unwrap_or_default();
//! println!("critical workers: {}", settings.tasks.critical_workers);
//! ```

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
