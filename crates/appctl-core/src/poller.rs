//! Background job polling
//!
//! [`spawn_job_poller`] turns a [`JobFetcher`] into an [`EventStream`] that
//! honours the producer termination contract: it emits at most one terminal
//! event and closes right after it. The poller stops as soon as the consumer
//! drops the stream, so returning early under a no-wait preference never
//! leaves a task polling in the background.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, trace, warn};

use crate::error::{CoreError, Result};
use crate::event::{EventStream, JobError, JobStatus, ProgressEvent, Warnings};
use crate::operation::JobRef;
use crate::timeouts::Timeouts;

/// One observation of a remote job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    /// Every warning the job has reported so far, oldest first
    pub warnings: Warnings,
    /// Errors reported by a failed job
    pub errors: Vec<JobError>,
}

impl JobSnapshot {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            warnings: Warnings::new(),
            errors: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_warnings(mut self, warnings: impl Into<Warnings>) -> Self {
        self.warnings = warnings.into();
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: JobError) -> Self {
        self.errors.push(error);
        self
    }
}

/// Reads the current state of a job from the platform
#[async_trait]
pub trait JobFetcher: Send + Sync + 'static {
    async fn fetch_job(&self, job: &JobRef) -> Result<JobSnapshot>;
}

/// Poll `job` in a background task and expose its progress as a stream
///
/// Must be called from within a tokio runtime.
pub fn spawn_job_poller<F>(fetcher: Arc<F>, job: JobRef, timeouts: &Timeouts) -> EventStream
where
    F: JobFetcher + ?Sized,
{
    let (tx, rx) = mpsc::channel(1);
    let interval = timeouts.polling_interval;
    let limit = timeouts.job_polling;

    tokio::spawn(async move {
        poll_job(fetcher.as_ref(), job, interval, limit, tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

async fn poll_job<F>(
    fetcher: &F,
    job: JobRef,
    interval: Duration,
    limit: Option<Duration>,
    tx: mpsc::Sender<ProgressEvent>,
) where
    F: JobFetcher + ?Sized,
{
    let start = Instant::now();
    let mut last_status: Option<JobStatus> = None;
    let mut warnings_seen = 0usize;

    loop {
        if let Some(limit) = limit
            && start.elapsed() > limit
        {
            warn!(job = %job, "Job did not finish within {}s", limit.as_secs());
            let timeout = CoreError::JobTimeout {
                job: job.clone(),
                timeout: limit,
            };
            let _ = tx.send(ProgressEvent::failed(timeout, Warnings::new())).await;
            return;
        }

        let snapshot = match fetcher.fetch_job(&job).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(job = %job, error = %err, "Polling job failed");
                let _ = tx.send(ProgressEvent::failed(err, Warnings::new())).await;
                return;
            }
        };

        let fresh: Warnings = snapshot
            .warnings
            .iter()
            .skip(warnings_seen)
            .cloned()
            .collect();
        warnings_seen = warnings_seen.max(snapshot.warnings.len());

        let status = snapshot.status;
        if last_status != Some(status) || !fresh.is_empty() {
            trace!(job = %job, %status, new_warnings = fresh.len(), "Job progress");
            let event = match status {
                JobStatus::Processing => ProgressEvent::processing(fresh),
                JobStatus::Polling => ProgressEvent::polling(fresh),
                JobStatus::Complete => ProgressEvent::complete(fresh),
                JobStatus::Failed => {
                    let cause = snapshot
                        .errors
                        .into_iter()
                        .next()
                        .unwrap_or_else(|| JobError::new(format!("Job {} failed", job)));
                    ProgressEvent::failed(CoreError::Job(cause), fresh)
                }
            };
            if tx.send(event).await.is_err() {
                debug!(job = %job, "Event stream dropped, stopping poller");
                return;
            }
        }

        if status.is_terminal() {
            debug!(job = %job, %status, "Job reached a terminal state");
            return;
        }
        last_status = Some(status);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tx.closed() => {
                debug!(job = %job, "Event stream dropped, stopping poller");
                return;
            }
        }
    }
}
