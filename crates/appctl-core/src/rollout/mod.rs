//! Application restart and rollout orchestration
//!
//! A rollout goes through `Validating → Staging (optional) → RollingOut` and
//! ends `Healthy`, `Crashed`, `TimedOut` or `Failed`:
//!
//! - [`config`] turns the raw flags into validated [`RolloutSettings`]
//! - [`plan`] derives the ordered health targets for rolling and canary
//!   strategies
//! - [`instances`] summarises instance health reported by the platform
//! - [`backend`] declares what the roller needs from the platform
//! - [`roller`] drives the state machine

pub mod backend;
pub mod config;
pub mod instances;
pub mod plan;
pub mod roller;

pub use backend::{
    AppLifecycle, AppRef, AppState, Deployment, DeploymentRequest, DropletRef, InstanceSource,
    PackageRef, Platform, Stager,
};
pub use config::{
    DeploymentRollout, InstanceSteps, RolloutConfigError, RolloutFlags, RolloutSettings, Strategy,
};
pub use instances::{
    InstanceState, InstanceSummary, Process, ProcessInstance, ProcessReport, WEB_PROCESS_TYPE,
};
pub use plan::{RolloutStep, plan_steps};
pub use roller::{
    DeploymentRoller, RolloutCallback, RolloutEvent, RolloutReport, RolloutState,
};
