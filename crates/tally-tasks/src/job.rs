//! Type-erased units of work held by the lanes.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;
use tally_core::{ErrorReporter, Severity};
use tracing::{debug, warn};

use crate::errors::{TaskError, WorkError};
use crate::handle::Reply;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const DONE: u8 = 2;

/// Origin used when reporting task failures.
pub(crate) const ORIGIN: &str = "task-processor";

/// A queued or running unit, independent of its result type.
pub(crate) trait Job: Send + Sync {
    fn id(&self) -> u64;

    fn name(&self) -> &str;

    /// Move from queued to running. Only one caller wins.
    fn try_start(&self) -> bool;

    fn is_done(&self) -> bool;

    /// Run the work and complete the handle if nothing has completed it yet.
    /// Failures are reported at `severity`. Returns whether the work succeeded.
    fn run(&self, reporter: &dyn ErrorReporter, severity: Severity) -> bool;

    /// Run work that is already running elsewhere.
    ///
    /// Only a success completes the handle. A failure is left for the
    /// original run to settle and is not reported.
    fn rerun(&self) -> bool;

    /// Complete the handle with `Cancelled` without running.
    fn cancel(&self);

    /// Complete the handle with `Rejected` without running.
    fn reject(&self);
}

pub(crate) struct Unit<T, F> {
    id: u64,
    name: String,
    work: F,
    state: AtomicU8,
    reply: Mutex<Option<Reply<T>>>,
}

impl<T, F> Unit<T, F>
where
    T: Send + 'static,
    F: Fn() -> Result<T, WorkError> + Send + Sync + 'static,
{
    pub(crate) fn new(id: u64, name: String, work: F, reply: Reply<T>) -> Self {
        Self {
            id,
            name,
            work,
            state: AtomicU8::new(QUEUED),
            reply: Mutex::new(Some(reply)),
        }
    }

    fn attempt(&self) -> Result<T, TaskError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.work)())) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(source)) => Err(TaskError::Failed {
                task: self.name.clone(),
                source,
            }),
            Err(payload) => Err(TaskError::Panicked {
                task: self.name.clone(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    fn complete(&self, result: Result<T, TaskError>) {
        self.state.store(DONE, Ordering::Release);
        if let Some(reply) = self.reply.lock().take() {
            // receiver gone means nobody is waiting
            let _ = reply.send(result);
        }
    }
}

impl<T, F> Job for Unit<T, F>
where
    T: Send + 'static,
    F: Fn() -> Result<T, WorkError> + Send + Sync + 'static,
{
    fn id(&self) -> u64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn try_start(&self) -> bool {
        self.state
            .compare_exchange(QUEUED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn is_done(&self) -> bool {
        self.state.load(Ordering::Acquire) == DONE
    }

    fn run(&self, reporter: &dyn ErrorReporter, severity: Severity) -> bool {
        debug!(task = %self.name, id = self.id, "task started");
        let result = self.attempt();
        let succeeded = result.is_ok();
        if let Err(e) = &result {
            reporter.report(severity, ORIGIN, e);
        }
        self.complete(result);
        succeeded
    }

    fn rerun(&self) -> bool {
        debug!(task = %self.name, id = self.id, "task re-run");
        match self.attempt() {
            Ok(value) => {
                self.complete(Ok(value));
                true
            }
            Err(e) => {
                warn!(task = %self.name, error = %e, "re-run failed, waiting on the running copy");
                false
            }
        }
    }

    fn cancel(&self) {
        self.complete(Err(TaskError::Cancelled {
            task: self.name.clone(),
        }));
    }

    fn reject(&self) {
        self.complete(Err(TaskError::Rejected {
            task: self.name.clone(),
        }));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
