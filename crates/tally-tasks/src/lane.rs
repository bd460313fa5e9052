//! One fixed-size worker pool.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tally_core::{ErrorReporter, Severity};
use tracing::{debug, warn};

use crate::job::Job;

#[derive(Default)]
struct LaneState {
    queue: VecDeque<Arc<dyn Job>>,
    running: HashMap<u64, Arc<dyn Job>>,
    accepting: bool,
    stopped: bool,
}

impl LaneState {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.running.is_empty()
    }
}

struct Shared {
    name: &'static str,
    severity: Severity,
    reporter: Arc<dyn ErrorReporter>,
    state: Mutex<LaneState>,
    work_available: Condvar,
    idle: Condvar,
}

/// Work left behind when a lane is stopped.
pub(crate) struct Leftover {
    pub(crate) queued: Vec<Arc<dyn Job>>,
    pub(crate) running: Vec<Arc<dyn Job>>,
}

pub(crate) struct Lane {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Lane {
    pub(crate) fn spawn(
        name: &'static str,
        workers: usize,
        severity: Severity,
        reporter: Arc<dyn ErrorReporter>,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            name,
            severity,
            reporter,
            state: Mutex::new(LaneState {
                accepting: true,
                ..LaneState::default()
            }),
            work_available: Condvar::new(),
            idle: Condvar::new(),
        });
        let lane = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(workers)),
        };
        for index in 0..workers.max(1) {
            let shared = Arc::clone(&lane.shared);
            let spawned = thread::Builder::new()
                .name(format!("tally-{name}-{index}"))
                .spawn(move || worker_loop(&shared));
            match spawned {
                Ok(handle) => lane.workers.lock().push(handle),
                Err(e) => {
                    warn!(lane = name, index, error = %e, "cannot spawn worker, stopping lane");
                    let _ = lane.stop();
                    let _ = lane.join(Duration::from_secs(1));
                    return Err(e);
                }
            }
        }
        debug!(lane = name, workers, "lane started");
        Ok(lane)
    }

    pub(crate) fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Queue `job`, or hand it back if the lane no longer accepts work.
    pub(crate) fn push(&self, job: Arc<dyn Job>) -> Result<(), Arc<dyn Job>> {
        let mut state = self.shared.state.lock();
        if !state.accepting {
            return Err(job);
        }
        state.queue.push_back(job);
        drop(state);
        let _ = self.shared.work_available.notify_one();
        Ok(())
    }

    /// Refuse further submissions. Queued work keeps running.
    pub(crate) fn close(&self) {
        self.shared.state.lock().accepting = false;
    }

    /// Wait until nothing is queued or running, up to `timeout`.
    pub(crate) fn await_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.is_idle() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.is_idle();
            }
        }
        true
    }

    /// Block until no job is running. Queued work is not waited for.
    pub(crate) fn await_running(&self) {
        let mut state = self.shared.state.lock();
        while !state.running.is_empty() {
            self.shared.idle.wait(&mut state);
        }
    }

    /// Stop the workers and return everything they had not finished.
    ///
    /// Workers exit after their current job. Running jobs stay owned by their
    /// worker and are returned as shared references.
    pub(crate) fn stop(&self) -> Leftover {
        let mut state = self.shared.state.lock();
        state.accepting = false;
        state.stopped = true;
        let queued: Vec<_> = state.queue.drain(..).collect();
        let running: Vec<_> = state.running.values().cloned().collect();
        drop(state);
        let _ = self.shared.work_available.notify_all();
        Leftover { queued, running }
    }

    /// Join workers that finish within `timeout`; detach the rest.
    ///
    /// Returns how many were detached.
    pub(crate) fn join(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        let mut workers = std::mem::take(&mut *self.workers.lock());
        while Instant::now() < deadline && !workers.iter().all(JoinHandle::is_finished) {
            thread::sleep(Duration::from_millis(5));
        }
        let mut detached = 0;
        for handle in workers.drain(..) {
            if handle.is_finished() {
                if handle.join().is_err() {
                    warn!(lane = self.shared.name, "worker thread panicked");
                }
            } else {
                detached += 1;
            }
        }
        if detached > 0 {
            warn!(lane = self.shared.name, detached, "workers still busy, detaching");
        }
        detached
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if state.stopped {
                    return;
                }
                match state.queue.pop_front() {
                    Some(job) if job.try_start() => {
                        let _ = state.running.insert(job.id(), Arc::clone(&job));
                        break job;
                    }
                    Some(_) => {}
                    None => shared.work_available.wait(&mut state),
                }
            }
        };

        let _ = job.run(shared.reporter.as_ref(), shared.severity);

        let mut state = shared.state.lock();
        let _ = state.running.remove(&job.id());
        if state.running.is_empty() {
            let _ = shared.idle.notify_all();
        }
    }
}
