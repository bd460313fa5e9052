//! Completion handles.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::errors::TaskError;

pub(crate) type Reply<T> = oneshot::Sender<Result<T, TaskError>>;

/// Completion of one submitted task.
///
/// Block with [`TaskHandle::wait`] or `.await` it from async code. Dropping
/// the handle does not cancel the task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: String,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn channel(name: &str) -> (Reply<T>, Self) {
        let (tx, rx) = oneshot::channel();
        let handle = Self {
            name: name.to_string(),
            rx,
        };
        (tx, handle)
    }

    /// Task name given at submission.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Block the current thread until the task completes.
    ///
    /// Must not be called from inside an async runtime; `.await` the handle
    /// there instead.
    pub fn wait(self) -> Result<T, TaskError> {
        let Self { name, rx } = self;
        rx.blocking_recv()
            .unwrap_or_else(|_| Err(TaskError::Cancelled { task: name }))
    }

    /// The result, if the task has already completed.
    pub fn try_result(&mut self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TaskError::Cancelled {
                task: self.name.clone(),
            })),
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(TaskError::Cancelled {
                    task: this.name.clone(),
                })
            })
        })
    }
}
