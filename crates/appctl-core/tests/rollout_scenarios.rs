//! Deployment roller scenarios against an in-memory platform
//!
//! The fake brings instances up one per poll after a step is applied (the
//! first poll after a change still shows the previous count), which makes
//! the ordering between step application and health checks observable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use appctl_core::{
    AppLifecycle, AppRef, AppState, BufferedUi, CoreError, Deployment, DeploymentRequest,
    DeploymentRollout, DeploymentRoller, DropletRef, InstanceSource, InstanceState, PackageRef,
    Process, ProcessInstance, Result, RolloutEvent, RolloutFlags, RolloutState, RolloutStep,
    Stager, Strategy, Timeouts, Warnings,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Health {
    /// Instances come up one per poll
    Progressive,
    /// Every instance crashes
    Crashing,
    /// Instances stay starting forever
    Stuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Staging {
    NothingToStage,
    Succeeds,
    Fails,
    Hangs,
}

#[derive(Debug, Default, Clone, Copy)]
struct ProcessProgress {
    previous: u32,
    target: u32,
    polls: u32,
    last_running: u32,
}

struct FakePlatform {
    health: Health,
    staging: Staging,
    cancel_fails: bool,
    processes: Vec<Process>,
    deployment_instances: u32,
    progress: Mutex<HashMap<String, ProcessProgress>>,
    calls: Mutex<Vec<String>>,
}

impl FakePlatform {
    fn new(health: Health) -> Self {
        Self {
            health,
            staging: Staging::NothingToStage,
            cancel_fails: false,
            processes: vec![
                Process::new("web-guid", "web", 3),
                Process::new("worker-guid", "worker", 1),
            ],
            deployment_instances: 5,
            progress: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_staging(mut self, staging: Staging) -> Self {
        self.staging = staging;
        self
    }

    fn with_failing_cancel(mut self) -> Self {
        self.cancel_fails = true;
        self
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn called(&self, prefix: &str) -> bool {
        self.calls().iter().any(|call| call.starts_with(prefix))
    }

    fn reset_progress(&self, guid: &str, target: u32) {
        let mut progress = self.progress.lock().unwrap();
        let entry = progress.entry(guid.to_string()).or_default();
        entry.previous = entry.last_running;
        entry.target = target;
        entry.polls = 0;
    }
}

#[async_trait]
impl Stager for FakePlatform {
    async fn unstaged_package(&self, _app: &AppRef) -> Result<(Option<PackageRef>, Warnings)> {
        let package = match self.staging {
            Staging::NothingToStage => None,
            _ => Some(PackageRef {
                guid: "pkg-1".to_string(),
            }),
        };
        Ok((package, Warnings::new()))
    }

    async fn stage(&self, app: &AppRef, package: &PackageRef) -> Result<(DropletRef, Warnings)> {
        self.record(format!("stage {}", package.guid));
        match self.staging {
            Staging::Fails => Err(CoreError::StagingFailed {
                app: app.name.clone(),
                reason: "buildpack compile failed".to_string(),
            }),
            Staging::Hangs => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                unreachable!("staging never finishes")
            }
            _ => Ok((
                DropletRef {
                    guid: "droplet-1".to_string(),
                },
                Warnings::from(vec!["staging warning"]),
            )),
        }
    }
}

#[async_trait]
impl AppLifecycle for FakePlatform {
    async fn stop_app(&self, _app: &AppRef) -> Result<Warnings> {
        self.record("stop");
        Ok(Warnings::new())
    }

    async fn start_app(&self, _app: &AppRef, droplet: Option<&DropletRef>) -> Result<Warnings> {
        match droplet {
            Some(droplet) => self.record(format!("start {}", droplet.guid)),
            None => self.record("start"),
        }
        for process in &self.processes {
            self.reset_progress(&process.guid, process.desired_instances);
        }
        Ok(Warnings::from(vec!["start warning"]))
    }

    async fn create_deployment(
        &self,
        _app: &AppRef,
        request: &DeploymentRequest,
    ) -> Result<(Deployment, Warnings)> {
        self.record(format!(
            "create_deployment {} {:?} {:?}",
            request.strategy, request.canary_steps, request.max_in_flight
        ));
        self.reset_progress("new-web-guid", self.deployment_instances);
        Ok((
            Deployment {
                guid: "deployment-1".to_string(),
                web_process: Process::new("new-web-guid", "web", self.deployment_instances),
            },
            Warnings::new(),
        ))
    }

    async fn apply_step(&self, deployment: &Deployment, step: &RolloutStep) -> Result<Warnings> {
        self.record(format!("apply {}", step.target_instances));
        self.reset_progress(&deployment.web_process.guid, step.target_instances);
        Ok(Warnings::new())
    }

    async fn cancel_deployment(&self, deployment: &Deployment) -> Result<Warnings> {
        self.record(format!("cancel {}", deployment.guid));
        if self.cancel_fails {
            return Err(CoreError::Api {
                status: 422,
                message: "deployment already finalized".to_string(),
            });
        }
        Ok(Warnings::new())
    }
}

#[async_trait]
impl InstanceSource for FakePlatform {
    async fn processes(&self, _app: &AppRef) -> Result<(Vec<Process>, Warnings)> {
        Ok((self.processes.clone(), Warnings::new()))
    }

    async fn instances(&self, process: &Process) -> Result<(Vec<ProcessInstance>, Warnings)> {
        let running = {
            let mut progress = self.progress.lock().unwrap();
            let entry = progress.entry(process.guid.clone()).or_default();
            entry.polls += 1;
            let running = match self.health {
                Health::Progressive => entry
                    .target
                    .min(entry.previous + entry.polls.saturating_sub(1)),
                Health::Crashing | Health::Stuck => 0,
            };
            entry.last_running = running;
            running
        };
        self.record(format!("poll {} {}", process.process_type, running));

        let instances = (0..process.desired_instances)
            .map(|index| {
                let state = if index < running {
                    InstanceState::Running
                } else if self.health == Health::Crashing {
                    InstanceState::Crashed
                } else {
                    InstanceState::Starting
                };
                ProcessInstance::new(index, state)
            })
            .collect();
        Ok((instances, Warnings::new()))
    }
}

fn timeouts() -> Timeouts {
    Timeouts::default()
        .with_startup(Duration::from_secs(60))
        .with_staging(Duration::from_secs(120))
        .with_polling_interval(Duration::from_secs(1))
}

fn rollout(state: AppState, flags: RolloutFlags) -> DeploymentRollout {
    let settings = flags.validate().expect("valid flags");
    DeploymentRollout::new(AppRef::new("app-guid", "billing", state), settings)
}

fn strategy(strategy: Strategy) -> RolloutFlags {
    RolloutFlags {
        strategy,
        ..Default::default()
    }
}

fn recorder() -> (Arc<Mutex<Vec<RolloutEvent>>>, appctl_core::RolloutCallback) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    (
        events,
        Box::new(move |event| sink.lock().unwrap().push(event)),
    )
}

fn state_changes(events: &[RolloutEvent]) -> Vec<RolloutState> {
    events
        .iter()
        .filter_map(|event| match event {
            RolloutEvent::StateChanged { to, .. } => Some(*to),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Canary and rolling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_canary_applies_weights_in_order_waiting_for_each_step() {
    let platform = FakePlatform::new(Health::Progressive);
    let ui = BufferedUi::new();
    let (events, callback) = recorder();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts()).with_progress(callback);

    let flags = RolloutFlags {
        strategy: Strategy::Canary,
        instance_steps: Some("20,40,60".to_string()),
        ..Default::default()
    };
    let report = roller
        .roll_out(&rollout(AppState::Started, flags))
        .await
        .unwrap();

    assert_eq!(
        platform.calls(),
        vec![
            "create_deployment canary [20, 40, 60] None",
            "apply 1",
            "poll web 0",
            "poll web 1",
            "apply 2",
            "poll web 1",
            "poll web 2",
            "apply 3",
            "poll web 2",
            "poll web 3",
        ]
    );
    assert_eq!(roller.state(), RolloutState::Healthy);
    assert_eq!(report.steps_completed, 3);
    assert_eq!(report.healthy_instances, 3);
    assert_eq!(report.app_name, "billing");

    let events = events.lock().unwrap();
    assert_eq!(
        state_changes(&events),
        vec![RolloutState::RollingOut, RolloutState::Healthy]
    );
    let applied: Vec<Option<u8>> = events
        .iter()
        .filter_map(|event| match event {
            RolloutEvent::StepApplied { step, .. } => Some(step.weight),
            _ => None,
        })
        .collect();
    assert_eq!(applied, vec![Some(20), Some(40), Some(60)]);

    assert_eq!(
        ui.out(),
        vec![
            "Creating deployment for app billing...",
            "Waiting for app to deploy..."
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_canary_step_is_split_by_max_in_flight() {
    let platform = FakePlatform::new(Health::Progressive);
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    let flags = RolloutFlags {
        strategy: Strategy::Canary,
        instance_steps: Some("20,100".to_string()),
        max_in_flight: Some(2),
        ..Default::default()
    };
    roller
        .roll_out(&rollout(AppState::Started, flags))
        .await
        .unwrap();

    let applies: Vec<String> = platform
        .calls()
        .into_iter()
        .filter(|call| call.starts_with("apply"))
        .collect();
    assert_eq!(applies, vec!["apply 1", "apply 3", "apply 5"]);
}

#[tokio::test(start_paused = true)]
async fn test_rolling_rollout_reaches_every_instance() {
    let platform = FakePlatform::new(Health::Progressive);
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    let flags = RolloutFlags {
        max_in_flight: Some(3),
        ..strategy(Strategy::Rolling)
    };
    let report = roller
        .roll_out(&rollout(AppState::Started, flags))
        .await
        .unwrap();

    assert!(platform.called("create_deployment rolling [] Some(3)"));
    assert_eq!(report.steps_completed, 2);
    assert_eq!(report.healthy_instances, 5);
    assert_eq!(report.strategy, Strategy::Rolling);
}

#[tokio::test(start_paused = true)]
async fn test_no_wait_returns_once_first_web_instance_is_healthy() {
    let platform = FakePlatform::new(Health::Progressive);
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    let flags = RolloutFlags {
        no_wait: true,
        ..strategy(Strategy::Rolling)
    };
    let report = roller
        .roll_out(&rollout(AppState::Started, flags))
        .await
        .unwrap();

    assert_eq!(report.healthy_instances, 1);
    assert!(!platform.called("apply"));
    assert_eq!(
        platform.calls().last().map(String::as_str),
        Some("poll web 1")
    );
}

// ============================================================================
// Crashed vs timed out
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_crashed_rollout_names_the_app_and_cancels_the_deployment() {
    let platform = FakePlatform::new(Health::Crashing);
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    let err = roller
        .roll_out(&rollout(AppState::Started, strategy(Strategy::Rolling)))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CoreError::AllInstancesCrashed {
            app: "billing".to_string()
        }
    );
    assert!(err.to_string().contains("billing"));
    assert_eq!(roller.state(), RolloutState::Crashed);
    assert_eq!(platform.calls().last().map(String::as_str), Some("cancel deployment-1"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_instances_time_out_distinctly_from_crashes() {
    let platform = FakePlatform::new(Health::Stuck);
    let ui = BufferedUi::new();
    let (events, callback) = recorder();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts()).with_progress(callback);

    let started = tokio::time::Instant::now();
    let err = roller
        .roll_out(&rollout(AppState::Started, strategy(Strategy::Rolling)))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CoreError::StartupTimeout {
            app: "billing".to_string(),
            timeout: Duration::from_secs(60)
        }
    );
    assert!(err.is_timeout());
    assert!(!err.is_crashed());
    assert_eq!(roller.state(), RolloutState::TimedOut);
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(platform.called("cancel deployment-1"));
    assert_eq!(
        state_changes(&events.lock().unwrap()),
        vec![RolloutState::RollingOut, RolloutState::TimedOut]
    );
}

#[tokio::test(start_paused = true)]
async fn test_failing_cancel_still_reports_the_primary_cause() {
    let platform = FakePlatform::new(Health::Crashing).with_failing_cancel();
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    let err = roller
        .roll_out(&rollout(AppState::Started, strategy(Strategy::Canary)))
        .await
        .unwrap_err();

    assert!(err.is_crashed());
    assert!(platform.called("cancel deployment-1"));
}

#[tokio::test(start_paused = true)]
async fn test_default_strategy_crash_does_not_cancel_anything() {
    let platform = FakePlatform::new(Health::Crashing);
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    let err = roller
        .roll_out(&rollout(AppState::Started, strategy(Strategy::Default)))
        .await
        .unwrap_err();

    assert!(err.is_crashed());
    assert!(!platform.called("cancel"));
}

// ============================================================================
// Default strategy and staging
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_default_strategy_stops_stages_and_starts() {
    let platform = FakePlatform::new(Health::Progressive).with_staging(Staging::Succeeds);
    let ui = BufferedUi::new();
    let (events, callback) = recorder();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts()).with_progress(callback);

    let report = roller
        .roll_out(&rollout(AppState::Started, strategy(Strategy::Default)))
        .await
        .unwrap();

    let calls = platform.calls();
    assert_eq!(&calls[..3], &["stage pkg-1", "stop", "start droplet-1"]);
    assert_eq!(report.healthy_instances, 4);
    assert_eq!(report.steps_completed, 0);
    assert_eq!(
        report.staged,
        Some(DropletRef {
            guid: "droplet-1".to_string()
        })
    );
    assert_eq!(report.processes.len(), 2);
    assert!(report.processes.iter().all(|p| p.summary.all_running()));

    assert_eq!(
        ui.out(),
        vec![
            "Staging app and tracing logs...",
            "Stopping app...",
            "Waiting for app to start..."
        ]
    );
    assert_eq!(ui.err(), vec!["staging warning", "start warning"]);
    assert_eq!(
        state_changes(&events.lock().unwrap()),
        vec![
            RolloutState::Staging,
            RolloutState::RollingOut,
            RolloutState::Healthy
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_default_strategy_starts_stopped_app_without_stopping() {
    let platform = FakePlatform::new(Health::Progressive);
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    roller
        .roll_out(&rollout(AppState::Stopped, strategy(Strategy::Default)))
        .await
        .unwrap();

    assert!(!platform.called("stop"));
    assert_eq!(platform.calls()[0], "start");
    assert!(!ui.out().contains(&"Stopping app...".to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_default_strategy_no_wait_only_watches_web() {
    let platform = FakePlatform::new(Health::Progressive);
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    let flags = RolloutFlags {
        no_wait: true,
        ..Default::default()
    };
    let report = roller
        .roll_out(&rollout(AppState::Started, flags))
        .await
        .unwrap();

    assert!(!platform.called("poll worker"));
    assert_eq!(report.healthy_instances, 1);
    assert_eq!(report.processes.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_staging_failure_aborts_before_rolling_out() {
    let platform = FakePlatform::new(Health::Progressive).with_staging(Staging::Fails);
    let ui = BufferedUi::new();
    let (events, callback) = recorder();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts()).with_progress(callback);

    let err = roller
        .roll_out(&rollout(AppState::Started, strategy(Strategy::Canary)))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::StagingFailed { .. }));
    assert_eq!(platform.calls(), vec!["stage pkg-1"]);
    assert_eq!(roller.state(), RolloutState::Failed);
    assert!(roller.state().is_terminal());
    assert_eq!(
        state_changes(&events.lock().unwrap()),
        vec![RolloutState::Staging, RolloutState::Failed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_staging_timeout_is_reported_as_timed_out() {
    let platform = FakePlatform::new(Health::Progressive).with_staging(Staging::Hangs);
    let ui = BufferedUi::new();
    let mut roller = DeploymentRoller::new(&platform, &ui, timeouts());

    let err = roller
        .roll_out(&rollout(AppState::Started, strategy(Strategy::Default)))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CoreError::StagingTimeout {
            app: "billing".to_string(),
            timeout: Duration::from_secs(120)
        }
    );
    assert_eq!(roller.state(), RolloutState::TimedOut);
    assert!(!platform.called("start"));
}
