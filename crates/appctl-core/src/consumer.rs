//! Draining a job's progress events into user-facing output
//!
//! [`EventStreamConsumer`] is the single drain loop shared by every command
//! that triggers a long-running job (service creation, binding, buildpack
//! upload, ...). It is generic over the failure payload carried by `Failed`
//! events, so commands reuse it by composition instead of re-implementing
//! the loop.
//!
//! Warnings of every event are written immediately and in order, whatever
//! state the event carries. A `Failed` event's error is returned only after
//! its warnings were written.

use futures::{Stream, StreamExt};
use tracing::{debug, trace, warn};

use crate::event::{JobState, ProgressEvent};
use crate::ui::Ui;

/// How far to drain before handing control back to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainUntil {
    /// Stop only at `Complete`, `Failed` or the end of the stream
    Terminal,
    /// Additionally stop at the first `Polling` event: the job was accepted
    /// but has not finished
    Accepted,
}

/// How draining ended when it did not end in failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// There was no stream; the operation completed synchronously
    Synchronous,
    /// A `Complete` event was observed
    Complete,
    /// A `Polling` event was observed while draining with [`DrainUntil::Accepted`]
    Pending,
    /// The producer ended the stream without a terminal event
    ///
    /// Treated as success, but kept distinct so callers and logs can tell a
    /// silent close apart from an explicit `Complete`.
    Closed,
}

impl StreamOutcome {
    /// Returns true when the operation is known to be done
    pub fn is_finished(&self) -> bool {
        !matches!(self, StreamOutcome::Pending)
    }
}

/// Folds a sequence of [`ProgressEvent`]s into UI output and an outcome
pub struct EventStreamConsumer<'a> {
    ui: &'a dyn Ui,
}

impl<'a> EventStreamConsumer<'a> {
    pub fn new(ui: &'a dyn Ui) -> Self {
        Self { ui }
    }

    /// Drain `source` until `until` is satisfied
    ///
    /// An absent source is an immediate success with no warnings. A `Failed`
    /// event ends draining and its error becomes the result.
    pub async fn drain<S, E>(&self, source: Option<S>, until: DrainUntil) -> Result<StreamOutcome, E>
    where
        S: Stream<Item = ProgressEvent<E>> + Unpin,
    {
        let Some(mut stream) = source else {
            debug!("No event stream, operation completed synchronously");
            return Ok(StreamOutcome::Synchronous);
        };

        while let Some(event) = stream.next().await {
            self.ui.display_warnings(&event.warnings);

            match event.state {
                JobState::Processing => {
                    trace!("Job processing");
                }
                JobState::Polling => {
                    trace!("Job polling");
                    if until == DrainUntil::Accepted {
                        debug!("Job accepted and still running, stopping drain");
                        return Ok(StreamOutcome::Pending);
                    }
                }
                JobState::Complete => {
                    debug!("Job complete");
                    return Ok(StreamOutcome::Complete);
                }
                JobState::Failed(err) => {
                    debug!("Job failed");
                    return Err(err);
                }
            }
        }

        warn!("Event stream closed without a terminal event, treating as success");
        Ok(StreamOutcome::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::event::{EventStream, JobError, Warnings, event_stream};
    use crate::ui::BufferedUi;
    use pretty_assertions::assert_eq;

    fn no_stream() -> Option<EventStream> {
        None
    }

    #[tokio::test]
    async fn test_absent_stream_is_synchronous_success() {
        let ui = BufferedUi::new();
        let consumer = EventStreamConsumer::new(&ui);

        let outcome = consumer.drain(no_stream(), DrainUntil::Terminal).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Synchronous);
        assert!(ui.lines().is_empty());
    }

    #[tokio::test]
    async fn test_drains_to_complete_displaying_all_warnings() {
        let ui = BufferedUi::new();
        let consumer = EventStreamConsumer::new(&ui);
        let events = event_stream(vec![
            ProgressEvent::<CoreError>::processing(vec!["processing warning"]),
            ProgressEvent::polling(vec!["polling warning 1", "polling warning 2"]),
            ProgressEvent::complete(vec!["complete warning"]),
        ]);

        let outcome = consumer.drain(Some(events), DrainUntil::Terminal).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Complete);
        assert_eq!(
            ui.err(),
            vec![
                "processing warning",
                "polling warning 1",
                "polling warning 2",
                "complete warning"
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_event_returns_error_after_warnings() {
        let ui = BufferedUi::new();
        let consumer = EventStreamConsumer::new(&ui);
        let events = event_stream(vec![
            ProgressEvent::processing(vec!["processing warning"]),
            ProgressEvent::failed(
                CoreError::Job(JobError::new("boom")),
                vec!["failed warning"],
            ),
        ]);

        let err = consumer
            .drain(Some(events), DrainUntil::Terminal)
            .await
            .unwrap_err();

        assert_eq!(err, CoreError::Job(JobError::new("boom")));
        assert_eq!(ui.err(), vec!["processing warning", "failed warning"]);
    }

    #[tokio::test]
    async fn test_accepted_mode_stops_at_first_polling_event() {
        let ui = BufferedUi::new();
        let consumer = EventStreamConsumer::new(&ui);
        let events = event_stream(vec![
            ProgressEvent::<CoreError>::processing(vec!["p"]),
            ProgressEvent::polling(vec!["first poll"]),
            ProgressEvent::polling(vec!["second poll"]),
            ProgressEvent::complete(vec!["never seen"]),
        ]);

        let outcome = consumer.drain(Some(events), DrainUntil::Accepted).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Pending);
        assert!(!outcome.is_finished());
        assert_eq!(ui.err(), vec!["p", "first poll"]);
    }

    #[tokio::test]
    async fn test_terminal_mode_continues_through_polling() {
        let ui = BufferedUi::new();
        let consumer = EventStreamConsumer::new(&ui);
        let events = event_stream(vec![
            ProgressEvent::<CoreError>::polling(Warnings::new()),
            ProgressEvent::complete(Warnings::new()),
        ]);

        let outcome = consumer.drain(Some(events), DrainUntil::Terminal).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Complete);
    }

    #[tokio::test]
    async fn test_silent_close_is_success() {
        let ui = BufferedUi::new();
        let consumer = EventStreamConsumer::new(&ui);
        let events = event_stream(vec![ProgressEvent::<CoreError>::processing(vec![
            "only warning",
        ])]);

        let outcome = consumer.drain(Some(events), DrainUntil::Terminal).await.unwrap();

        assert_eq!(outcome, StreamOutcome::Closed);
        assert!(outcome.is_finished());
        assert_eq!(ui.err(), vec!["only warning"]);
    }

    #[tokio::test]
    async fn test_consumer_is_generic_over_failure_payload() {
        let ui = BufferedUi::new();
        let consumer = EventStreamConsumer::new(&ui);
        let events = event_stream(vec![ProgressEvent::failed(
            JobError::new("bad plan"),
            Warnings::new(),
        )]);

        let err: JobError = consumer
            .drain(Some(events), DrainUntil::Terminal)
            .await
            .unwrap_err();

        assert_eq!(err.detail, "bad plan");
    }
}
