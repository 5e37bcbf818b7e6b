//! # appctl-core
//!
//! Asynchronous operation tracking and rollout orchestration for `appctl`.
//!
//! Most platform commands are a single request and a single response. The
//! ones that are not (service creation and deletion, bindings, buildpack
//! uploads, restarts) all start a server-side job and then have to follow
//! it. This crate is the part they share:
//!
//! - **Operation handles** ([`OperationHandle`], [`OperationStart`]) - what a
//!   state-changing call hands back: nothing to follow, or a job plus its
//!   live [`EventStream`]
//! - **Event stream consumer** ([`EventStreamConsumer`]) - drains
//!   [`ProgressEvent`]s into warnings on the [`Ui`] and a terminal outcome
//! - **Wait policy controller** ([`WaitPolicyController`]) - applies the
//!   user's `--wait` preference and prints exactly one terminal line
//! - **Job poller** ([`spawn_job_poller`]) - a background producer turning
//!   any [`JobFetcher`] into an event stream
//! - **Deployment roller** ([`DeploymentRoller`]) - stages, restarts or
//!   deploys an app with the default, rolling or canary strategy and polls
//!   instance health until it is healthy, crashed or timed out
//!
//! Platform access is behind traits ([`JobFetcher`], [`Platform`]); the
//! wire format belongs to the caller.
//!
//! ## Crate Structure
//!
//! ```text
//! appctl-core/
//! ├── src/
//! │   ├── lib.rs
//! │   ├── error.rs        # CoreError and classification helpers
//! │   ├── event.rs        # ProgressEvent, JobState, Warnings
//! │   ├── operation.rs    # JobRef, OperationHandle, OperationStart
//! │   ├── consumer.rs     # EventStreamConsumer
//! │   ├── wait.rs         # WaitPolicyController
//! │   ├── poller.rs       # JobFetcher, spawn_job_poller
//! │   ├── timeouts.rs     # Timeouts read from the environment
//! │   ├── ui.rs           # Ui trait, BufferedUi
//! │   └── rollout/
//! │       ├── config.rs   # flag validation
//! │       ├── plan.rs     # canary and rolling step targets
//! │       ├── instances.rs
//! │       ├── backend.rs  # Platform traits
//! │       └── roller.rs   # DeploymentRoller
//! ```

pub mod consumer;
pub mod error;
pub mod event;
pub mod operation;
pub mod poller;
pub mod rollout;
pub mod timeouts;
pub mod ui;
pub mod wait;

pub use consumer::{DrainUntil, EventStreamConsumer, StreamOutcome};
pub use error::{CoreError, Result};
pub use event::{EventStream, JobError, JobState, JobStatus, ProgressEvent, Warnings, event_stream};
pub use operation::{JobRef, OperationHandle, OperationStart, TrackedJob};
pub use poller::{JobFetcher, JobSnapshot, spawn_job_poller};
pub use rollout::{
    AppLifecycle, AppRef, AppState, Deployment, DeploymentRequest, DeploymentRollout,
    DeploymentRoller, DropletRef, InstanceSource, InstanceState, InstanceSummary, Platform,
    Process, ProcessInstance, ProcessReport, RolloutCallback, RolloutConfigError, RolloutEvent,
    RolloutFlags, RolloutReport, RolloutSettings, RolloutState, RolloutStep, Stager, Strategy,
};
pub use rollout::{InstanceSteps, PackageRef, WEB_PROCESS_TYPE, plan_steps};
pub use timeouts::Timeouts;
pub use ui::{BufferedUi, Ui, UiLine, UiStream};
pub use wait::{WaitOutcome, WaitPolicyController, WaitPreference};
