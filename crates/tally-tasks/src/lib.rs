//! # tally-tasks
//!
//! Two-lane task processor. Work is tagged [`Priority::Critical`] or
//! [`Priority::NonCritical`] at submission and runs on that lane's worker
//! threads. Every submission returns a [`TaskHandle`].
//!
//! [`TaskProcessor::shutdown`] discards queued non-critical work, gives
//! critical work a grace period, then runs whatever critical work is left on
//! the calling thread so none of it is lost.

#![deny(unsafe_code)]

pub mod errors;
pub mod handle;
mod job;
mod lane;
pub mod processor;

pub use errors::TaskError;
pub use handle::TaskHandle;
pub use processor::{Priority, ProcessorConfig, ShutdownReport, TaskProcessor};
