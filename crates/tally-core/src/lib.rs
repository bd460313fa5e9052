//! # tally-core
//!
//! Types shared by every tally crate:
//!
//! - **Logging**: [`logging::init_subscriber`] installs the `tracing` subscriber
//! - **Error reporting**: [`ErrorReporter`] is the `report(severity, origin, fault)`
//!   sink every component uses to surface failures without crashing the host
//! - **Identification**: [`ServerUuid`] scopes reads and writes to one server

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod report;

pub use ids::ServerUuid;
pub use report::{ErrorReporter, MemoryReporter, Report, Severity, TracingReporter};
