//! Unified error handling for appctl-core
//!
//! Every failure the orchestration layer can surface is a [`CoreError`].
//! Remote job failures are carried verbatim, rollout failures keep their
//! cause (crash vs. timeout) distinct, and configuration errors are raised
//! before any remote call is made.
//!
//! # Example
//!
//! ```rust
//! use appctl_core::{CoreError, JobError};
//!
//! let err: CoreError = JobError::new("boom").into();
//! assert_eq!(err.to_string(), "boom");
//! assert!(!err.is_retryable());
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::event::JobError;
use crate::operation::JobRef;
use crate::rollout::RolloutConfigError;

/// Core error type for operation tracking and rollouts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The remote job reported failure
    #[error(transparent)]
    Job(#[from] JobError),

    /// The job poller gave up before the job reached a terminal state
    #[error("Job {job} did not finish within {}s", timeout.as_secs())]
    JobTimeout { job: JobRef, timeout: Duration },

    /// Invalid combination of rollout flags
    #[error(transparent)]
    RolloutConfig(#[from] RolloutConfigError),

    /// Every instance of a process crashed while waiting for health
    #[error("All instances of app '{app}' crashed")]
    AllInstancesCrashed { app: String },

    /// Instances did not become healthy inside the startup window
    #[error("Timed out after {}s waiting for app '{app}' to start", timeout.as_secs())]
    StartupTimeout { app: String, timeout: Duration },

    /// Staging did not finish inside the staging window
    #[error("Timed out after {}s waiting for app '{app}' to stage", timeout.as_secs())]
    StagingTimeout { app: String, timeout: Duration },

    /// The stager reported that the package could not be staged
    #[error("Staging app '{app}' failed: {reason}")]
    StagingFailed { app: String, reason: String },

    /// The platform API rejected a request
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The platform answered with something we could not interpret
    #[error("Unexpected response from the platform: {0}")]
    UnexpectedResponse(String),

    /// The request never reached the platform
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Returns true for any of the timeout causes
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            CoreError::JobTimeout { .. }
                | CoreError::StartupTimeout { .. }
                | CoreError::StagingTimeout { .. }
        )
    }

    /// Returns true if every instance of a process crashed
    #[must_use]
    pub fn is_crashed(&self) -> bool {
        matches!(self, CoreError::AllInstancesCrashed { .. })
    }

    /// Returns true for locally detected configuration errors
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, CoreError::RolloutConfig(_))
    }

    /// Returns true if the failure aborts an in-flight rollout
    #[must_use]
    pub fn aborts_rollout(&self) -> bool {
        matches!(
            self,
            CoreError::AllInstancesCrashed { .. } | CoreError::StartupTimeout { .. }
        )
    }

    /// Returns true if this error is potentially retryable
    ///
    /// Job failures, rollout failures and configuration errors are never
    /// retried; the user has to re-invoke the command.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::Transport(_) => true,
            CoreError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
