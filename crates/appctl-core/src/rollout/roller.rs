//! The deployment roller state machine
//!
//! ```text
//! Validating ──► Staging (only with an unstaged package) ──► RollingOut ──► Healthy
//!                   │                                            ├──► Crashed
//!                   ├──► TimedOut                                ├──► TimedOut
//!                   └──► Failed                                  └──► Failed
//! ```
//!
//! `Failed` covers every other abort: a stager that reports failure or a
//! platform call that errors. Every return from
//! [`DeploymentRoller::roll_out`] leaves the roller in a terminal state.
//!
//! Validation itself happens in [`RolloutFlags::validate`](super::RolloutFlags::validate);
//! the roller is only ever built from settings that passed it, and leaves
//! `Validating` on its first remote call.
//!
//! Health is polled at the configured interval inside one startup window that
//! starts when the roller enters `RollingOut`. Every poll first checks the
//! window, so a rollout whose instances are merely slow ends `TimedOut`,
//! while a process whose instances all crashed ends `Crashed` straight away.

use std::num::NonZeroU32;

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::backend::{AppRef, AppState, Deployment, DeploymentRequest, DropletRef, Platform};
use super::config::{DeploymentRollout, RolloutSettings, Strategy};
use super::instances::{InstanceSummary, Process, ProcessReport};
use super::plan::{RolloutStep, plan_steps};
use crate::error::{CoreError, Result};
use crate::timeouts::Timeouts;
use crate::ui::Ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutState {
    Validating,
    Staging,
    RollingOut,
    Healthy,
    Crashed,
    TimedOut,
    /// Aborted for any reason other than a crash or a timeout
    Failed,
}

impl RolloutState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutState::Healthy
                | RolloutState::Crashed
                | RolloutState::TimedOut
                | RolloutState::Failed
        )
    }
}

/// Progress reported while a rollout runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutEvent {
    StateChanged {
        from: RolloutState,
        to: RolloutState,
    },
    /// The platform was told to proceed to `step`
    StepApplied { index: usize, step: RolloutStep },
    /// The target of step `index` is running
    StepHealthy { index: usize, healthy_instances: u32 },
    /// One health observation of a process
    InstancesPolled {
        process_type: String,
        summary: InstanceSummary,
    },
}

/// Callback type for rollout progress
pub type RolloutCallback = Box<dyn Fn(RolloutEvent) + Send + Sync>;

/// Summary of a rollout that ended `Healthy`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutReport {
    pub app_name: String,
    pub strategy: Strategy,
    pub healthy_instances: u32,
    pub steps_completed: usize,
    /// Last observed health of every polled process
    pub processes: Vec<ProcessReport>,
    /// Droplet produced when the rollout had to stage first
    pub staged: Option<DropletRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HealthGoal {
    /// Every instance of every process is running
    AllInstances,
    /// At least one instance of every process is running
    FirstInstance,
    /// At least this many instances of every process are running
    AtLeast(u32),
}

impl HealthGoal {
    fn is_met(&self, summary: &InstanceSummary) -> bool {
        match self {
            HealthGoal::AllInstances => summary.all_running(),
            HealthGoal::FirstInstance => summary.total == 0 || summary.any_running(),
            HealthGoal::AtLeast(target) => summary.running >= *target,
        }
    }
}

/// Drives one restart of one application
pub struct DeploymentRoller<'a, P: Platform + ?Sized> {
    platform: &'a P,
    ui: &'a dyn Ui,
    timeouts: Timeouts,
    on_progress: Option<RolloutCallback>,
    state: RolloutState,
    healthy_instances: u32,
    steps_completed: usize,
    processes: Vec<ProcessReport>,
}

impl<'a, P: Platform + ?Sized> DeploymentRoller<'a, P> {
    pub fn new(platform: &'a P, ui: &'a dyn Ui, timeouts: Timeouts) -> Self {
        Self {
            platform,
            ui,
            timeouts,
            on_progress: None,
            state: RolloutState::Validating,
            healthy_instances: 0,
            steps_completed: 0,
            processes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, callback: RolloutCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn state(&self) -> RolloutState {
        self.state
    }

    /// Instances observed running by the latest poll
    pub fn healthy_instances(&self) -> u32 {
        self.healthy_instances
    }

    /// Stage if needed, roll the app out and wait until it is healthy
    ///
    /// Crashed and timed-out rollouts return
    /// [`CoreError::AllInstancesCrashed`] and [`CoreError::StartupTimeout`]
    /// respectively; a rolling or canary deployment is cancelled first.
    pub async fn roll_out(&mut self, rollout: &DeploymentRollout) -> Result<RolloutReport> {
        let app = &rollout.app;
        let settings = &rollout.settings;
        info!(app = %app.name, strategy = %settings.strategy, "Starting rollout");

        let staged = match self.stage_if_needed(app).await {
            Ok(staged) => staged,
            Err(err) => return Err(self.abort(err)),
        };

        self.transition(RolloutState::RollingOut);
        let deadline = Instant::now() + self.timeouts.startup;

        let result = match settings.strategy {
            Strategy::Default => {
                self.restart_in_place(app, settings, staged.as_ref(), deadline)
                    .await
            }
            Strategy::Rolling | Strategy::Canary => {
                self.deploy(app, settings, staged.as_ref(), deadline).await
            }
        };

        match result {
            Ok(()) => {
                self.transition(RolloutState::Healthy);
                Ok(RolloutReport {
                    app_name: app.name.clone(),
                    strategy: settings.strategy,
                    healthy_instances: self.healthy_instances,
                    steps_completed: self.steps_completed,
                    processes: self.processes.clone(),
                    staged,
                })
            }
            Err(err) => Err(self.abort(err)),
        }
    }

    async fn stage_if_needed(&mut self, app: &AppRef) -> Result<Option<DropletRef>> {
        let (package, warnings) = self.platform.unstaged_package(app).await?;
        self.ui.display_warnings(&warnings);

        let Some(package) = package else {
            debug!(app = %app.name, "No unstaged package, skipping staging");
            return Ok(None);
        };

        self.transition(RolloutState::Staging);
        self.ui.display_text("Staging app and tracing logs...");

        let limit = self.timeouts.staging;
        let staged = tokio::time::timeout(limit, self.platform.stage(app, &package)).await;
        let (droplet, warnings) = match staged {
            Ok(result) => result?,
            Err(_) => {
                return Err(CoreError::StagingTimeout {
                    app: app.name.clone(),
                    timeout: limit,
                });
            }
        };
        self.ui.display_warnings(&warnings);
        info!(app = %app.name, droplet = %droplet.guid, "Staged package");

        Ok(Some(droplet))
    }

    /// Immediate cutover: stop if running, then start
    async fn restart_in_place(
        &mut self,
        app: &AppRef,
        settings: &RolloutSettings,
        droplet: Option<&DropletRef>,
        deadline: Instant,
    ) -> Result<()> {
        if app.state == AppState::Started {
            self.ui.display_text("Stopping app...");
            let warnings = self.platform.stop_app(app).await?;
            self.ui.display_warnings(&warnings);
        }

        self.ui.display_text("Waiting for app to start...");
        let warnings = self.platform.start_app(app, droplet).await?;
        self.ui.display_warnings(&warnings);

        let (mut processes, warnings) = self.platform.processes(app).await?;
        self.ui.display_warnings(&warnings);

        let goal = if settings.no_wait {
            processes.retain(Process::is_web);
            HealthGoal::FirstInstance
        } else {
            HealthGoal::AllInstances
        };

        self.wait_for_health(app, &processes, goal, deadline).await
    }

    /// Rolling or canary: create a deployment and follow it, cancelling it
    /// when the rollout aborts
    async fn deploy(
        &mut self,
        app: &AppRef,
        settings: &RolloutSettings,
        droplet: Option<&DropletRef>,
        deadline: Instant,
    ) -> Result<()> {
        self.ui
            .display_text(&format!("Creating deployment for app {}...", app.name));

        let request = DeploymentRequest {
            strategy: settings.strategy,
            max_in_flight: settings.max_in_flight.map(NonZeroU32::get),
            canary_steps: settings
                .instance_steps
                .as_ref()
                .map(|steps| steps.weights().to_vec())
                .unwrap_or_default(),
            droplet: droplet.cloned(),
        };
        let (deployment, warnings) = self.platform.create_deployment(app, &request).await?;
        self.ui.display_warnings(&warnings);
        debug!(app = %app.name, deployment = %deployment.guid, "Created deployment");

        self.ui.display_text("Waiting for app to deploy...");
        let result = self
            .follow_deployment(app, settings, &deployment, deadline)
            .await;

        if let Err(err) = &result
            && err.aborts_rollout()
        {
            warn!(deployment = %deployment.guid, error = %err, "Cancelling deployment");
            match self.platform.cancel_deployment(&deployment).await {
                Ok(warnings) => self.ui.display_warnings(&warnings),
                Err(cancel_err) => {
                    warn!(deployment = %deployment.guid, error = %cancel_err, "Failed to cancel deployment");
                }
            }
        }

        result
    }

    async fn follow_deployment(
        &mut self,
        app: &AppRef,
        settings: &RolloutSettings,
        deployment: &Deployment,
        deadline: Instant,
    ) -> Result<()> {
        let web = std::slice::from_ref(&deployment.web_process);

        if settings.no_wait {
            return self
                .wait_for_health(app, web, HealthGoal::FirstInstance, deadline)
                .await;
        }

        let steps = plan_steps(settings, deployment.web_process.desired_instances);
        if steps.is_empty() {
            return self
                .wait_for_health(app, web, HealthGoal::AllInstances, deadline)
                .await;
        }

        for (index, step) in steps.iter().enumerate() {
            let warnings = self.platform.apply_step(deployment, step).await?;
            self.ui.display_warnings(&warnings);
            info!(
                app = %app.name,
                index,
                weight = ?step.weight,
                target = step.target_instances,
                "Applied rollout step"
            );
            self.emit(RolloutEvent::StepApplied { index, step: *step });

            self.wait_for_health(
                app,
                web,
                HealthGoal::AtLeast(step.target_instances),
                deadline,
            )
            .await?;

            self.steps_completed += 1;
            self.emit(RolloutEvent::StepHealthy {
                index,
                healthy_instances: self.healthy_instances,
            });
        }

        Ok(())
    }

    /// Poll `processes` until `goal` holds for each of them
    async fn wait_for_health(
        &mut self,
        app: &AppRef,
        processes: &[Process],
        goal: HealthGoal,
        deadline: Instant,
    ) -> Result<()> {
        let interval = self.timeouts.polling_interval;

        loop {
            if Instant::now() >= deadline {
                return Err(CoreError::StartupTimeout {
                    app: app.name.clone(),
                    timeout: self.timeouts.startup,
                });
            }

            let mut reports = Vec::with_capacity(processes.len());
            let mut healthy_instances = 0;
            let mut goal_met = true;

            for process in processes {
                let (instances, warnings) = self.platform.instances(process).await?;
                self.ui.display_warnings(&warnings);

                let summary = InstanceSummary::from_instances(&instances);
                trace!(process = %process.process_type, %summary, "Polled instances");
                self.emit(RolloutEvent::InstancesPolled {
                    process_type: process.process_type.clone(),
                    summary,
                });

                if summary.all_crashed() {
                    warn!(app = %app.name, process = %process.process_type, "All instances crashed");
                    return Err(CoreError::AllInstancesCrashed {
                        app: app.name.clone(),
                    });
                }

                goal_met &= goal.is_met(&summary);
                healthy_instances += summary.running;
                reports.push(ProcessReport {
                    process_type: process.process_type.clone(),
                    summary,
                });
            }

            self.healthy_instances = healthy_instances;
            self.processes = reports;

            if goal_met {
                debug!(app = %app.name, ?goal, healthy_instances, "Health goal reached");
                return Ok(());
            }

            tokio::time::sleep_until((Instant::now() + interval).min(deadline)).await;
        }
    }

    fn abort(&mut self, err: CoreError) -> CoreError {
        if err.is_crashed() {
            self.transition(RolloutState::Crashed);
        } else if err.is_timeout() {
            self.transition(RolloutState::TimedOut);
        } else {
            warn!(state = ?self.state, error = %err, "Rollout aborted");
            self.transition(RolloutState::Failed);
        }
        err
    }

    fn transition(&mut self, to: RolloutState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!(?from, ?to, "Rollout state changed");
        self.state = to;
        self.emit(RolloutEvent::StateChanged { from, to });
    }

    fn emit(&self, event: RolloutEvent) {
        if let Some(callback) = &self.on_progress {
            callback(event);
        }
    }
}
