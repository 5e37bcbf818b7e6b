//! Handles for server-side asynchronous operations

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::event::Warnings;

/// Opaque server-assigned reference to an asynchronous job (a URL or a GUID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobRef(String);

impl JobRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobRef {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for JobRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Reference to one accepted asynchronous job plus the names used in messages
///
/// Owned by the command invocation that created it and dropped once a
/// terminal event is observed or the caller stops waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationHandle {
    job: JobRef,
    resource_name: String,
    action: Option<String>,
    status_command: Option<String>,
}

impl OperationHandle {
    pub fn new(job: impl Into<JobRef>, resource_name: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            resource_name: resource_name.into(),
            action: None,
            status_command: None,
        }
    }

    /// Prefix the resource in the in-progress message with an action
    /// ("Unbinding of my-db", "Delete of my-db").
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Command the user can run later to check on the operation.
    #[must_use]
    pub fn with_status_command(mut self, command: impl Into<String>) -> Self {
        self.status_command = Some(command.into());
        self
    }

    pub fn job(&self) -> &JobRef {
        &self.job
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn status_command(&self) -> String {
        self.status_command
            .clone()
            .unwrap_or_else(|| format!("appctl job {}", self.job))
    }

    /// Line printed when the caller returns before the job finished
    pub fn in_progress_message(&self) -> String {
        let label = match &self.action {
            Some(action) => format!("{} of {}", action, self.resource_name),
            None => self.resource_name.clone(),
        };
        format!(
            "{} in progress. Use '{}' to check operation status.",
            label,
            self.status_command()
        )
    }
}

/// Result of a state-changing call as seen by the orchestration layer
///
/// Either the operation completed synchronously (no events to consume) or the
/// platform accepted an asynchronous job whose progress arrives on `events`.
/// `warnings` are the ones accumulated before the job was accepted.
#[derive(Debug)]
pub struct OperationStart<S> {
    pub warnings: Warnings,
    pub tracked: Option<TrackedJob<S>>,
}

/// An accepted job together with its live event source
#[derive(Debug)]
pub struct TrackedJob<S> {
    pub handle: OperationHandle,
    pub events: S,
}

impl<S> OperationStart<S> {
    pub fn synchronous(warnings: Warnings) -> Self {
        Self {
            warnings,
            tracked: None,
        }
    }

    pub fn tracked(handle: OperationHandle, events: S, warnings: Warnings) -> Self {
        Self {
            warnings,
            tracked: Some(TrackedJob { handle, events }),
        }
    }

    pub fn is_synchronous(&self) -> bool {
        self.tracked.is_none()
    }
}
