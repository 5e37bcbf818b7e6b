//! Reconciling a running job with the user's wait preference
//!
//! Every command that starts a server-side job hands the resulting
//! [`OperationStart`] to a [`WaitPolicyController`]. The controller prints
//! exactly one terminal line per invocation: `OK`, the handle's
//! "in progress" hint, or nothing at all when an error is returned.
//!
//! # Example
//!
//! ```rust
//! use appctl_core::{BufferedUi, OperationStart, WaitOutcome, WaitPolicyController, WaitPreference};
//! use appctl_core::{EventStream, Warnings};
//!
//! # tokio_test_block_on(async {
//! let ui = BufferedUi::new();
//! let controller = WaitPolicyController::new(&ui, WaitPreference::NoWait);
//! let start: OperationStart<EventStream> = OperationStart::synchronous(Warnings::from(vec!["careful"]));
//!
//! let outcome = controller.resolve(start).await.unwrap();
//! assert_eq!(outcome, WaitOutcome::Succeeded);
//! assert_eq!(ui.transcript(), vec!["careful", "OK"]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use futures::Stream;
use tracing::{debug, info};

use crate::consumer::{DrainUntil, EventStreamConsumer, StreamOutcome};
use crate::event::ProgressEvent;
use crate::operation::OperationStart;
use crate::ui::Ui;

/// Whether the user asked to block until the job reaches a terminal state
///
/// Set once per invocation from `--wait`/`-w`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitPreference {
    Wait,
    #[default]
    NoWait,
}

impl From<bool> for WaitPreference {
    fn from(wait: bool) -> Self {
        if wait {
            WaitPreference::Wait
        } else {
            WaitPreference::NoWait
        }
    }
}

/// Terminal outcome reported to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// `OK` was printed
    Succeeded,
    /// The job is still running remotely; the in-progress hint was printed
    InProgress,
}

pub struct WaitPolicyController<'a> {
    ui: &'a dyn Ui,
    preference: WaitPreference,
}

impl<'a> WaitPolicyController<'a> {
    pub fn new(ui: &'a dyn Ui, preference: impl Into<WaitPreference>) -> Self {
        Self {
            ui,
            preference: preference.into(),
        }
    }

    pub fn preference(&self) -> WaitPreference {
        self.preference
    }

    /// Display the start warnings, drain the job per the preference and
    /// print the terminal line
    ///
    /// A `Failed` event is returned as the error whatever the preference;
    /// in that case no terminal line is printed so the caller can render
    /// the error as the only one.
    pub async fn resolve<S, E>(&self, start: OperationStart<S>) -> Result<WaitOutcome, E>
    where
        S: Stream<Item = ProgressEvent<E>> + Unpin,
    {
        self.ui.display_warnings(&start.warnings);

        let Some(tracked) = start.tracked else {
            debug!("Operation completed synchronously");
            self.ui.display_ok();
            return Ok(WaitOutcome::Succeeded);
        };

        let consumer = EventStreamConsumer::new(self.ui);
        let job = tracked.handle.job();

        match self.preference {
            WaitPreference::Wait => {
                info!(job = %job, "Waiting for job to reach a terminal state");
                self.ui.display_text("Waiting for the operation to complete...");
                let outcome = consumer
                    .drain(Some(tracked.events), DrainUntil::Terminal)
                    .await?;
                debug!(job = %job, ?outcome, "Job finished");
                self.ui.display_new_line();
                self.ui.display_ok();
                Ok(WaitOutcome::Succeeded)
            }
            WaitPreference::NoWait => {
                let outcome = consumer
                    .drain(Some(tracked.events), DrainUntil::Accepted)
                    .await?;
                match outcome {
                    StreamOutcome::Pending => {
                        info!(job = %job, "Job accepted, not waiting for completion");
                        self.ui.display_text(&tracked.handle.in_progress_message());
                        Ok(WaitOutcome::InProgress)
                    }
                    _ => {
                        debug!(job = %job, ?outcome, "Job finished before any wait decision");
                        self.ui.display_ok();
                        Ok(WaitOutcome::Succeeded)
                    }
                }
            }
        }
    }
}
