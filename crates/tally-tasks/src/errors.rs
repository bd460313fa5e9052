//! Task failure taxonomy.

use std::error::Error;

use thiserror::Error;

/// Boxed error returned by submitted work.
pub type WorkError = Box<dyn Error + Send + Sync + 'static>;

/// Why a task did not produce a value.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The work ran and returned an error.
    #[error("task `{task}` failed")]
    Failed {
        /// Task name.
        task: String,
        /// Error returned by the work.
        #[source]
        source: WorkError,
    },

    /// The work panicked.
    #[error("task `{task}` panicked: {message}")]
    Panicked {
        /// Task name.
        task: String,
        /// Panic payload, when it was a string.
        message: String,
    },

    /// Submitted after the lane stopped accepting work.
    #[error("task `{task}` rejected: processor is shut down")]
    Rejected {
        /// Task name.
        task: String,
    },

    /// Discarded before it ran.
    #[error("task `{task}` cancelled")]
    Cancelled {
        /// Task name.
        task: String,
    },
}

impl TaskError {
    /// Name of the task this error belongs to.
    pub fn task(&self) -> &str {
        match self {
            Self::Failed { task, .. }
            | Self::Panicked { task, .. }
            | Self::Rejected { task }
            | Self::Cancelled { task } => task,
        }
    }

    /// Whether the work itself ran and did not succeed.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Panicked { .. })
    }
}
