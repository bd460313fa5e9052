//! Connection keep-alive.
//!
//! The keeper periodically runs a liveness probe against the current
//! connection. On failure it makes exactly one reconnect attempt and, if that
//! succeeds, swaps the new connection into the shared [`ConnectionSlot`]. If the
//! reconnect also fails, a fatal fault is reported and the keeper cancels
//! itself; it never tries again.
//!
//! The keeper is generic over the connection type so the probe and reconnect
//! behaviour can be exercised with fakes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tally_core::{ErrorReporter, Severity};
use tracing::{debug, info, warn};

use crate::errors::{DbOpError, StoreError};
use crate::periodic::{PeriodicTask, Tick};

const ORIGIN: &str = "connection-keeper";

/// Shared holder for the connection every operation checks out from.
///
/// Readers clone the current value; the keeper replaces it atomically.
#[derive(Debug)]
pub struct ConnectionSlot<C> {
    current: RwLock<C>,
}

impl<C: Clone> ConnectionSlot<C> {
    /// Create a slot holding `initial`.
    pub fn new(initial: C) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// Clone of the current connection.
    pub fn current(&self) -> C {
        self.current.read().clone()
    }

    /// Install `next` and return the connection it replaced.
    pub fn replace(&self, next: C) -> C {
        std::mem::replace(&mut *self.current.write(), next)
    }
}

/// Result of one keeper check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe succeeded.
    Alive,
    /// The probe failed and a new connection was installed.
    Reconnected,
    /// The probe and the reconnect both failed; the keeper is cancelled.
    Cancelled,
}

type ProbeFn<C> = dyn Fn(&C) -> Result<(), DbOpError> + Send + Sync;
type ReconnectFn<C> = dyn Fn() -> Result<C, DbOpError> + Send + Sync;

struct KeeperCore<C> {
    slot: Arc<ConnectionSlot<C>>,
    probe: Box<ProbeFn<C>>,
    reconnect: Box<ReconnectFn<C>>,
    reporter: Arc<dyn ErrorReporter>,
    reconnects: AtomicU64,
    cancelled: AtomicBool,
}

impl<C: Clone> KeeperCore<C> {
    fn check_once(&self) -> ProbeOutcome {
        if self.cancelled.load(Ordering::Acquire) {
            return ProbeOutcome::Cancelled;
        }
        let current = self.slot.current();
        let Err(probe_error) = (self.probe)(&current) else {
            debug!("connection probe ok");
            return ProbeOutcome::Alive;
        };
        drop(current);
        warn!(error = %probe_error, "connection probe failed, reconnecting");

        let _ = self.reconnects.fetch_add(1, Ordering::Relaxed);
        match (self.reconnect)() {
            Ok(fresh) => {
                drop(self.slot.replace(fresh));
                info!("reconnected after failed probe");
                ProbeOutcome::Reconnected
            }
            Err(source) => {
                self.cancelled.store(true, Ordering::Release);
                let fault = StoreError::Liveness { source };
                self.reporter.report(Severity::Fatal, ORIGIN, &fault);
                ProbeOutcome::Cancelled
            }
        }
    }
}

/// Periodic liveness probe with a single reconnect attempt.
pub struct ConnectionKeeper<C> {
    core: Arc<KeeperCore<C>>,
    task: Option<PeriodicTask>,
}

impl<C> ConnectionKeeper<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Create a keeper over `slot`. Nothing runs until [`start`](Self::start).
    pub fn new<P, R>(
        slot: Arc<ConnectionSlot<C>>,
        probe: P,
        reconnect: R,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self
    where
        P: Fn(&C) -> Result<(), DbOpError> + Send + Sync + 'static,
        R: Fn() -> Result<C, DbOpError> + Send + Sync + 'static,
    {
        Self {
            core: Arc::new(KeeperCore {
                slot,
                probe: Box::new(probe),
                reconnect: Box::new(reconnect),
                reporter,
                reconnects: AtomicU64::new(0),
                cancelled: AtomicBool::new(false),
            }),
            task: None,
        }
    }

    /// Run one probe (and reconnect, if needed) on the calling thread.
    pub fn check_once(&self) -> ProbeOutcome {
        self.core.check_once()
    }

    /// Start probing every `interval` on a background thread.
    pub fn start(&mut self, interval: Duration) -> std::io::Result<()> {
        if self.task.is_some() {
            return Ok(());
        }
        let core = Arc::clone(&self.core);
        let task = PeriodicTask::spawn("tally-keep-alive", interval, move || {
            match core.check_once() {
                ProbeOutcome::Alive | ProbeOutcome::Reconnected => Tick::Continue,
                ProbeOutcome::Cancelled => Tick::Cancel,
            }
        })?;
        self.task = Some(task);
        Ok(())
    }

    /// Stop the background thread, if running.
    pub fn stop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop();
        }
    }

    /// Whether the keeper gave up after a failed reconnect.
    pub fn is_cancelled(&self) -> bool {
        self.core.cancelled.load(Ordering::Acquire)
    }

    /// Number of reconnect attempts made so far.
    pub fn reconnect_attempts(&self) -> u64 {
        self.core.reconnects.load(Ordering::Relaxed)
    }

    /// Whether the background thread is running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(PeriodicTask::is_running)
    }
}

impl<C> Drop for ConnectionKeeper<C> {
    fn drop(&mut self) {
        if let Some(mut task) = self.task.take() {
            task.stop();
        }
    }
}

impl<C> std::fmt::Debug for ConnectionKeeper<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionKeeper")
            .field("cancelled", &self.core.cancelled.load(Ordering::Relaxed))
            .field("running", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    use assert_matches::assert_matches;
    use tally_core::MemoryReporter;

    use super::*;

    /// Fake connection: a generation number plus a shared health flag.
    #[derive(Clone, Debug)]
    struct FakeConn {
        generation: usize,
        healthy: Arc<AtomicBool>,
    }

    fn fake(generation: usize, healthy: bool) -> FakeConn {
        FakeConn {
            generation,
            healthy: Arc::new(AtomicBool::new(healthy)),
        }
    }

    fn probe(conn: &FakeConn) -> Result<(), DbOpError> {
        if conn.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbOpError::InvalidData("connection closed".into()))
        }
    }

    #[test]
    fn slot_replace_returns_previous() {
        let slot = ConnectionSlot::new(1);
        assert_eq!(slot.replace(2), 1);
        assert_eq!(slot.current(), 2);
    }

    #[test]
    fn healthy_probe_keeps_connection() {
        let slot = Arc::new(ConnectionSlot::new(fake(0, true)));
        let reporter = Arc::new(MemoryReporter::new());
        let keeper = ConnectionKeeper::new(
            Arc::clone(&slot),
            probe,
            || Ok(fake(1, true)),
            reporter.clone(),
        );

        assert_eq!(keeper.check_once(), ProbeOutcome::Alive);
        assert_eq!(slot.current().generation, 0);
        assert_eq!(keeper.reconnect_attempts(), 0);
        assert!(reporter.is_empty());
    }

    #[test]
    fn failed_probe_swaps_in_new_connection() {
        let slot = Arc::new(ConnectionSlot::new(fake(0, false)));
        let reporter = Arc::new(MemoryReporter::new());
        let keeper = ConnectionKeeper::new(
            Arc::clone(&slot),
            probe,
            || Ok(fake(1, true)),
            reporter.clone(),
        );

        assert_eq!(keeper.check_once(), ProbeOutcome::Reconnected);
        assert_eq!(slot.current().generation, 1);
        assert_eq!(keeper.check_once(), ProbeOutcome::Alive);
        assert_eq!(keeper.reconnect_attempts(), 1);
        assert!(!keeper.is_cancelled());
        assert!(reporter.is_empty());
    }

    #[test]
    fn failed_reconnect_reports_fatal_and_cancels() {
        let slot = Arc::new(ConnectionSlot::new(fake(0, false)));
        let reporter = Arc::new(MemoryReporter::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&attempts);
        let keeper = ConnectionKeeper::new(
            Arc::clone(&slot),
            probe,
            move || {
                let _ = counted.fetch_add(1, Ordering::SeqCst);
                Err(DbOpError::InvalidData("server unreachable".into()))
            },
            reporter.clone(),
        );

        assert_eq!(keeper.check_once(), ProbeOutcome::Cancelled);
        assert!(keeper.is_cancelled());
        assert_eq!(reporter.count(Severity::Fatal), 1);
        assert_matches!(reporter.reports()[0].origin.as_str(), "connection-keeper");

        // Cancelled keepers never retry.
        assert_eq!(keeper.check_once(), ProbeOutcome::Cancelled);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(slot.current().generation, 0);
    }

    #[test]
    fn background_thread_cancels_itself() {
        let slot = Arc::new(ConnectionSlot::new(fake(0, false)));
        let reporter = Arc::new(MemoryReporter::new());
        let mut keeper = ConnectionKeeper::new(
            slot,
            probe,
            || Err(DbOpError::InvalidData("down".into())),
            reporter.clone(),
        );
        keeper.start(Duration::from_millis(5)).unwrap();

        let start = Instant::now();
        while keeper.is_running() && start.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!keeper.is_running());
        assert!(keeper.is_cancelled());
        assert_eq!(reporter.count(Severity::Fatal), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let slot = Arc::new(ConnectionSlot::new(fake(0, true)));
        let mut keeper = ConnectionKeeper::new(
            slot,
            probe,
            || Ok(fake(1, true)),
            Arc::new(MemoryReporter::new()),
        );
        keeper.start(Duration::from_secs(3600)).unwrap();
        assert!(keeper.is_running());
        keeper.stop();
        keeper.stop();
        assert!(!keeper.is_running());
    }
}
