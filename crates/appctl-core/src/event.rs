//! Progress events for server-side asynchronous jobs
//!
//! A job is described by an ordered sequence of [`ProgressEvent`]s delivered
//! through a [`futures::Stream`]. Every producer honours one termination
//! contract: it either emits exactly one terminal event (`Complete` or
//! `Failed`) and then ends the stream, or it ends the stream without a
//! terminal event. Nothing is ever emitted after a terminal event.
//!
//! Any stream satisfying that contract can be consumed, whether it is backed
//! by a channel, a callback adapter or a fixed list of events.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use futures::Stream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::CoreError;

/// Ordered warnings accumulated by one step of an operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Warnings(Vec<String>);

impl Warnings {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, warning: impl Into<String>) {
        self.0.push(warning.into());
    }

    pub fn extend(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl From<Vec<String>> for Warnings {
    fn from(value: Vec<String>) -> Self {
        Self(value)
    }
}

impl From<Vec<&str>> for Warnings {
    fn from(value: Vec<&str>) -> Self {
        Self(value.into_iter().map(String::from).collect())
    }
}

impl FromIterator<String> for Warnings {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Warnings {
    type Item = String;
    type IntoIter = std::vec::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Warnings {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Error reported by the platform for a failed job
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{detail}")]
pub struct JobError {
    pub detail: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

impl JobError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            title: None,
            code: None,
        }
    }
}

/// Textual job state as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Processing,
    Polling,
    Complete,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROCESSING" => Ok(JobStatus::Processing),
            "POLLING" => Ok(JobStatus::Polling),
            "COMPLETE" => Ok(JobStatus::Complete),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(CoreError::UnexpectedResponse(format!(
                "unknown job state '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            JobStatus::Processing => "PROCESSING",
            JobStatus::Polling => "POLLING",
            JobStatus::Complete => "COMPLETE",
            JobStatus::Failed => "FAILED",
        };
        f.write_str(tag)
    }
}

/// State carried by one progress event; only `Failed` carries a cause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState<E> {
    /// Accepted and running on the platform
    Processing,
    /// Accepted, the platform is waiting on a third party
    Polling,
    Complete,
    Failed(E),
}

impl<E> JobState<E> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete | JobState::Failed(_))
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Processing => JobStatus::Processing,
            JobState::Polling => JobStatus::Polling,
            JobState::Complete => JobStatus::Complete,
            JobState::Failed(_) => JobStatus::Failed,
        }
    }
}

/// One update in the ordered sequence describing a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent<E = CoreError> {
    pub state: JobState<E>,
    pub warnings: Warnings,
}

impl<E> ProgressEvent<E> {
    pub fn processing(warnings: impl Into<Warnings>) -> Self {
        Self {
            state: JobState::Processing,
            warnings: warnings.into(),
        }
    }

    pub fn polling(warnings: impl Into<Warnings>) -> Self {
        Self {
            state: JobState::Polling,
            warnings: warnings.into(),
        }
    }

    pub fn complete(warnings: impl Into<Warnings>) -> Self {
        Self {
            state: JobState::Complete,
            warnings: warnings.into(),
        }
    }

    pub fn failed(error: E, warnings: impl Into<Warnings>) -> Self {
        Self {
            state: JobState::Failed(error),
            warnings: warnings.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Boxed event source handed from a producer to the consumer
pub type EventStream<E = CoreError> = Pin<Box<dyn Stream<Item = ProgressEvent<E>> + Send>>;

/// Event source over a fixed, already-known sequence of events
pub fn event_stream<E: Send + 'static>(events: Vec<ProgressEvent<E>>) -> EventStream<E> {
    Box::pin(futures::stream::iter(events))
}
