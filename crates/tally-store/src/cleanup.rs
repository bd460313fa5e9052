//! Periodic removal of inactive players.

use std::time::Duration;

use chrono::Utc;
use tally_core::Severity;
use tally_settings::DataSettings;
use tracing::debug;

use crate::database::Database;
use crate::periodic::{PeriodicTask, Tick};
use crate::transactions::remove_old_players;

const ORIGIN: &str = "data-cleanup";

/// Background thread running retention cleanup every interval.
///
/// A failed run is reported as an error and the task cancels itself.
#[derive(Debug)]
pub struct CleanupTask {
    task: PeriodicTask,
}

impl CleanupTask {
    /// Start cleaning `db` every `interval`, removing players inactive for
    /// longer than `keep_inactive`.
    pub fn start(db: Database, keep_inactive: Duration, interval: Duration) -> std::io::Result<Self> {
        let task = PeriodicTask::spawn("tally-cleanup", interval, move || run_once(&db, keep_inactive))?;
        Ok(Self { task })
    }

    /// Start with the retention settings.
    pub fn from_settings(db: Database, settings: &DataSettings) -> std::io::Result<Self> {
        Self::start(db, settings.keep_inactive(), settings.cleanup_interval())
    }

    /// Whether the task is still scheduled.
    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Stop the thread.
    pub fn stop(&mut self) {
        self.task.stop();
    }
}

fn run_once(db: &Database, keep_inactive: Duration) -> Tick {
    let now = Utc::now().timestamp_millis();
    match db.execute(&remove_old_players(now, keep_inactive)) {
        Ok(outcome) => {
            debug!(?outcome, "retention cleanup finished");
            Tick::Continue
        }
        Err(e) => {
            db.reporter().report(Severity::Error, ORIGIN, &e);
            Tick::Cancel
        }
    }
}
