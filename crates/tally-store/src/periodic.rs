//! Named background thread that runs a tick at a fixed interval.
//!
//! The sleep between ticks is interruptible: [`PeriodicTask::stop`] wakes the
//! thread immediately and joins it. A tick may also cancel the task by
//! returning [`Tick::Cancel`].

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

/// What a tick asks the scheduler to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Sleep for another interval and tick again.
    Continue,
    /// Stop ticking; the thread exits.
    Cancel,
}

#[derive(Default)]
struct Signal {
    stopped: Mutex<bool>,
    wake: Condvar,
    cancelled: AtomicBool,
    finished: AtomicBool,
}

/// Handle to a running periodic thread. Dropping the handle stops the thread.
pub struct PeriodicTask {
    name: String,
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn a thread named `name` that calls `tick` every `interval`.
    ///
    /// The first tick happens one interval after spawning.
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() -> Tick + Send + 'static,
    {
        let name = name.into();
        let signal = Arc::new(Signal::default());
        let thread_signal = Arc::clone(&signal);
        let thread_name = name.clone();

        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            loop {
                {
                    let mut stopped = thread_signal.stopped.lock();
                    let _ = thread_signal
                        .wake
                        .wait_while_for(&mut stopped, |stopped| !*stopped, interval);
                    if *stopped {
                        break;
                    }
                }
                if tick() == Tick::Cancel {
                    debug!(task = %thread_name, "periodic task cancelled itself");
                    thread_signal.cancelled.store(true, Ordering::Release);
                    break;
                }
            }
            thread_signal.finished.store(true, Ordering::Release);
        })?;

        Ok(Self {
            name,
            signal,
            handle: Some(handle),
        })
    }

    /// Thread name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the thread is still ticking.
    pub fn is_running(&self) -> bool {
        self.handle.is_some() && !self.signal.finished.load(Ordering::Acquire)
    }

    /// Whether a tick returned [`Tick::Cancel`].
    pub fn was_cancelled(&self) -> bool {
        self.signal.cancelled.load(Ordering::Acquire)
    }

    /// Wake the thread, ask it to exit, and join it.
    ///
    /// A tick in progress is allowed to finish. Calling `stop` more than once
    /// is harmless.
    pub fn stop(&mut self) {
        {
            let mut stopped = self.signal.stopped.lock();
            *stopped = true;
        }
        let _ = self.signal.wake.notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!(task = %self.name, "periodic task panicked");
            }
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeriodicTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
