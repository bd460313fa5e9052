//! The two-lane processor and its shutdown sequence.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tally_core::{ErrorReporter, Severity, TracingReporter};
use tally_settings::TaskSettings;
use tally_store::{Database, Outcome, Transaction};
use tracing::{debug, info, warn};

use crate::errors::WorkError;
use crate::handle::TaskHandle;
use crate::job::{Job, Unit};
use crate::lane::Lane;

/// Which lane a task runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Priority {
    /// Losing the work loses user data. Runs at least once even across
    /// shutdown; failures are reported as errors.
    Critical,
    /// Best effort. Discarded on shutdown; failures are reported as warnings.
    NonCritical,
}

impl Priority {
    /// Severity used when work in this lane fails.
    pub fn severity(self) -> Severity {
        match self {
            Self::Critical => Severity::Error,
            Self::NonCritical => Severity::Warn,
        }
    }
}

/// Lane sizes and shutdown timing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Critical lane workers.
    pub critical_workers: usize,
    /// Non-critical lane workers.
    pub non_critical_workers: usize,
    /// How long critical work may keep running normally after shutdown starts.
    pub critical_grace: Duration,
    /// Final wait for worker threads.
    pub termination_check: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from(&TaskSettings::default())
    }
}

impl From<&TaskSettings> for ProcessorConfig {
    fn from(settings: &TaskSettings) -> Self {
        Self {
            critical_workers: settings.critical_workers,
            non_critical_workers: settings.non_critical_workers,
            critical_grace: settings.critical_grace(),
            termination_check: settings.termination_check(),
        }
    }
}

/// What shutdown had to do.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Non-critical tasks discarded from the queue.
    pub cancelled: usize,
    /// Whether critical work finished within the grace period.
    pub drained: bool,
    /// Critical tasks that succeeded on the shutdown thread.
    pub finished_inline: usize,
    /// Worker threads still busy after the termination check.
    pub detached: usize,
}

struct Inner {
    critical: Lane,
    non_critical: Lane,
    config: ProcessorConfig,
    reporter: Arc<dyn ErrorReporter>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

impl Inner {
    fn lane(&self, priority: Priority) -> &Lane {
        match priority {
            Priority::Critical => &self.critical,
            Priority::NonCritical => &self.non_critical,
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }
        warn!("task processor dropped without shutdown, discarding queued work");
        for lane in [&self.non_critical, &self.critical] {
            for job in lane.stop().queued {
                job.cancel();
            }
        }
    }
}

/// Two-lane executor. Cloning shares the same lanes.
///
/// Work submitted to a lane runs on one of its worker threads. Work must be
/// safe to run more than once: critical work that is still in flight when the
/// grace period ends is run again on the shutdown thread.
#[derive(Clone)]
pub struct TaskProcessor {
    inner: Arc<Inner>,
}

impl TaskProcessor {
    /// Spawn both lanes.
    pub fn start(config: ProcessorConfig, reporter: Arc<dyn ErrorReporter>) -> std::io::Result<Self> {
        let critical = Lane::spawn(
            "critical",
            config.critical_workers,
            Priority::Critical.severity(),
            Arc::clone(&reporter),
        )?;
        let non_critical = Lane::spawn(
            "background",
            config.non_critical_workers,
            Priority::NonCritical.severity(),
            Arc::clone(&reporter),
        )?;
        info!(
            critical = config.critical_workers,
            non_critical = config.non_critical_workers,
            "task processor started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                critical,
                non_critical,
                config,
                reporter,
                next_id: AtomicU64::new(0),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Spawn both lanes from settings, reporting through `tracing`.
    pub fn from_settings(settings: &TaskSettings) -> std::io::Result<Self> {
        Self::start(ProcessorConfig::from(settings), Arc::new(TracingReporter))
    }

    /// Lane sizes and timings in use.
    pub fn config(&self) -> &ProcessorConfig {
        &self.inner.config
    }

    /// Whether shutdown has started.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    /// Queue `work` on the lane for `priority`.
    ///
    /// After shutdown the handle completes with `Rejected` immediately.
    pub fn submit<T, F>(&self, priority: Priority, name: impl Into<String>, work: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T, WorkError> + Send + Sync + 'static,
    {
        let name = name.into();
        let (reply, handle) = TaskHandle::channel(&name);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let job: Arc<dyn Job> = Arc::new(Unit::new(id, name, work, reply));

        let lane = self.inner.lane(priority);
        if let Err(job) = lane.push(job) {
            debug!(lane = lane.name(), task = job.name(), "submission rejected");
            job.reject();
        }
        handle
    }

    /// Queue `transaction` for execution against `db`.
    pub fn submit_transaction(
        &self,
        priority: Priority,
        db: &Database,
        transaction: Transaction,
    ) -> TaskHandle<Outcome> {
        let db = db.clone();
        let name = transaction.name().to_string();
        self.submit(priority, name, move || Ok(db.execute(&transaction)?))
    }

    /// Stop both lanes.
    ///
    /// 1. Non-critical submissions are refused and queued non-critical work is
    ///    cancelled. In-flight non-critical work is not waited for.
    /// 2. Critical submissions are refused. Queued and in-flight critical work
    ///    gets the grace period to finish on its workers.
    /// 3. Whatever critical work is left is run on this thread. Work that was
    ///    in flight runs again. Failures are reported and never abort shutdown.
    /// 4. In-flight critical work is waited for until its worker finishes it,
    ///    with no deadline. Critical work has completed when this returns.
    /// 5. Workers get the termination check to exit; busy ones are detached.
    ///
    /// Only the first call does anything.
    pub fn shutdown(&self) -> ShutdownReport {
        let inner = &self.inner;
        if inner.shut_down.swap(true, Ordering::AcqRel) {
            return ShutdownReport::default();
        }
        info!("task processor shutting down");
        let mut report = ShutdownReport::default();

        let background = inner.non_critical.stop();
        for job in &background.queued {
            job.cancel();
        }
        report.cancelled = background.queued.len();
        if !background.running.is_empty() {
            debug!(in_flight = background.running.len(), "abandoning in-flight background work");
        }

        inner.critical.close();
        report.drained = inner.critical.await_idle(inner.config.critical_grace);
        let leftover = inner.critical.stop();
        if !report.drained {
            warn!(
                queued = leftover.queued.len(),
                in_flight = leftover.running.len(),
                grace = ?inner.config.critical_grace,
                "critical grace period elapsed, finishing work inline"
            );
        }
        let severity = Priority::Critical.severity();
        for job in leftover.queued {
            if job.try_start() && job.run(inner.reporter.as_ref(), severity) {
                report.finished_inline += 1;
            }
        }
        for job in leftover.running {
            if !job.is_done() {
                debug!(task = job.name(), "re-running in-flight critical task");
                if job.rerun() {
                    report.finished_inline += 1;
                }
            }
        }
        inner.critical.await_running();

        report.detached = inner.critical.join(inner.config.termination_check)
            + inner.non_critical.join(Duration::ZERO);
        info!(
            cancelled = report.cancelled,
            finished_inline = report.finished_inline,
            detached = report.detached,
            "task processor stopped"
        );
        report
    }
}

impl std::fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("config", &self.inner.config)
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
