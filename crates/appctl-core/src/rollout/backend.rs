//! Platform operations the deployment roller depends on
//!
//! The roller never talks to an API directly. Anything implementing
//! [`Platform`] (an HTTP client, or an in-memory fake in tests) can drive a
//! rollout.

use async_trait::async_trait;

use super::config::Strategy;
use super::instances::{Process, ProcessInstance};
use super::plan::RolloutStep;
use crate::error::Result;
use crate::event::Warnings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Started,
    Stopped,
}

/// Application targeted by a rollout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRef {
    pub guid: String,
    pub name: String,
    pub state: AppState,
}

impl AppRef {
    pub fn new(guid: impl Into<String>, name: impl Into<String>, state: AppState) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            state,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRef {
    pub guid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropletRef {
    pub guid: String,
}

/// A server-side deployment created for a rolling or canary rollout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub guid: String,
    /// The web process that replaces the running one
    pub web_process: Process,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub strategy: Strategy,
    pub max_in_flight: Option<u32>,
    pub canary_steps: Vec<u8>,
    /// Droplet to deploy; the current one when `None`
    pub droplet: Option<DropletRef>,
}

/// Staging of packages into droplets
#[async_trait]
pub trait Stager: Send + Sync {
    /// Newest package of the app if it has not been staged yet
    async fn unstaged_package(&self, app: &AppRef) -> Result<(Option<PackageRef>, Warnings)>;

    /// Stage `package`, resolving once the droplet is ready
    async fn stage(&self, app: &AppRef, package: &PackageRef) -> Result<(DropletRef, Warnings)>;
}

/// Starting, stopping and deploying applications
#[async_trait]
pub trait AppLifecycle: Send + Sync {
    async fn stop_app(&self, app: &AppRef) -> Result<Warnings>;

    /// Start the app, switching to `droplet` first when given
    async fn start_app(&self, app: &AppRef, droplet: Option<&DropletRef>) -> Result<Warnings>;

    async fn create_deployment(
        &self,
        app: &AppRef,
        request: &DeploymentRequest,
    ) -> Result<(Deployment, Warnings)>;

    /// Let the deployment proceed to `step`
    async fn apply_step(&self, deployment: &Deployment, step: &RolloutStep) -> Result<Warnings>;

    async fn cancel_deployment(&self, deployment: &Deployment) -> Result<Warnings>;
}

/// Process and instance health
#[async_trait]
pub trait InstanceSource: Send + Sync {
    async fn processes(&self, app: &AppRef) -> Result<(Vec<Process>, Warnings)>;

    async fn instances(&self, process: &Process) -> Result<(Vec<ProcessInstance>, Warnings)>;
}

/// Everything a rollout needs from the platform
pub trait Platform: AppLifecycle + InstanceSource + Stager {}

impl<T> Platform for T where T: AppLifecycle + InstanceSource + Stager {}
