//! Error-reporting interface consumed by every component.
//!
//! Components never crash the host on a storage or task failure. They hand the
//! fault to an [`ErrorReporter`] together with a [`Severity`] and the name of
//! the component or task it originated from.

use std::error::Error;
use std::fmt;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// How serious a reported fault is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational; nothing was lost.
    Info,
    /// Best-effort work failed; no user-visible data loss.
    Warn,
    /// Work whose loss is user-visible failed.
    Error,
    /// The subsystem cannot continue (init, migration, liveness).
    Fatal,
}

impl Severity {
    /// Lowercase label used in log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for faults that must be surfaced but not propagated.
pub trait ErrorReporter: Send + Sync {
    /// Report a fault raised by `origin`.
    fn report(&self, severity: Severity, origin: &str, fault: &(dyn Error + 'static));
}

/// Reporter that writes every fault to the `tracing` subscriber.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, severity: Severity, origin: &str, fault: &(dyn Error + 'static)) {
        let chain = error_chain(fault);
        match severity {
            Severity::Info => info!(origin, error = %chain, "reported"),
            Severity::Warn => warn!(origin, error = %chain, "reported failure"),
            Severity::Error => error!(origin, error = %chain, "reported failure"),
            Severity::Fatal => error!(origin, error = %chain, fatal = true, "reported fatal failure"),
        }
    }
}

/// One fault captured by a [`MemoryReporter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    /// Severity the fault was reported with.
    pub severity: Severity,
    /// Component or task name.
    pub origin: String,
    /// Rendered error chain.
    pub message: String,
}

/// Reporter that keeps every fault in memory.
///
/// Useful for hosts that display recent failures and for tests.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReporter {
    /// Create an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Number of reports with exactly `severity`.
    pub fn count(&self, severity: Severity) -> usize {
        self.reports
            .lock()
            .iter()
            .filter(|r| r.severity == severity)
            .count()
    }

    /// Whether nothing has been reported.
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, severity: Severity, origin: &str, fault: &(dyn Error + 'static)) {
        self.reports.lock().push(Report {
            severity,
            origin: origin.to_string(),
            message: error_chain(fault),
        });
    }
}

/// Render an error and all of its sources as `outer: inner: root`.
pub fn error_chain(fault: &(dyn Error + 'static)) -> String {
    let mut rendered = fault.to_string();
    let mut source = fault.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        // thiserror `{0}` formats often repeat the source text verbatim
        if !rendered.ends_with(&text) {
            rendered.push_str(": ");
            rendered.push_str(&text);
        }
        source = cause.source();
    }
    rendered
}
