//! Instance health as reported by the platform

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Process type that receives routed traffic
pub const WEB_PROCESS_TYPE: &str = "web";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstanceState {
    Starting,
    Running,
    Crashed,
    Down,
}

impl FromStr for InstanceState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "STARTING" => Ok(InstanceState::Starting),
            "RUNNING" => Ok(InstanceState::Running),
            "CRASHED" => Ok(InstanceState::Crashed),
            "DOWN" => Ok(InstanceState::Down),
            _ => Err(CoreError::UnexpectedResponse(format!(
                "unknown instance state '{}'",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInstance {
    pub index: u32,
    pub state: InstanceState,
    pub details: Option<String>,
}

impl ProcessInstance {
    pub fn new(index: u32, state: InstanceState) -> Self {
        Self {
            index,
            state,
            details: None,
        }
    }
}

/// A process of an application (web, worker, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Process {
    pub guid: String,
    pub process_type: String,
    pub desired_instances: u32,
}

impl Process {
    pub fn new(guid: impl Into<String>, process_type: impl Into<String>, desired_instances: u32) -> Self {
        Self {
            guid: guid.into(),
            process_type: process_type.into(),
            desired_instances,
        }
    }

    pub fn is_web(&self) -> bool {
        self.process_type == WEB_PROCESS_TYPE
    }
}

/// Instance counts per state for one process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceSummary {
    pub running: u32,
    pub starting: u32,
    pub crashed: u32,
    pub down: u32,
    pub total: u32,
}

impl InstanceSummary {
    pub fn from_instances(instances: &[ProcessInstance]) -> Self {
        instances.iter().fold(Self::default(), |mut summary, instance| {
            match instance.state {
                InstanceState::Running => summary.running += 1,
                InstanceState::Starting => summary.starting += 1,
                InstanceState::Crashed => summary.crashed += 1,
                InstanceState::Down => summary.down += 1,
            }
            summary.total += 1;
            summary
        })
    }

    pub fn any_running(&self) -> bool {
        self.running > 0
    }

    /// Every listed instance is running; a process with no instances counts
    /// as healthy
    pub fn all_running(&self) -> bool {
        self.running == self.total
    }

    /// At least one instance exists and all of them crashed
    pub fn all_crashed(&self) -> bool {
        self.total > 0 && self.crashed == self.total
    }
}

impl fmt::Display for InstanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} running", self.running, self.total)?;
        if self.starting > 0 {
            write!(f, ", {} starting", self.starting)?;
        }
        if self.crashed > 0 {
            write!(f, ", {} crashed", self.crashed)?;
        }
        if self.down > 0 {
            write!(f, ", {} down", self.down)?;
        }
        Ok(())
    }
}

/// Last observed health of one process, reported when a rollout ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub process_type: String,
    pub summary: InstanceSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instances(states: &[InstanceState]) -> Vec<ProcessInstance> {
        states
            .iter()
            .enumerate()
            .map(|(i, state)| ProcessInstance::new(i as u32, *state))
            .collect()
    }

    #[test]
    fn test_summary_counts() {
        use InstanceState::*;
        let summary = InstanceSummary::from_instances(&instances(&[Running, Starting, Crashed, Running, Down]));

        assert_eq!(summary.running, 2);
        assert_eq!(summary.starting, 1);
        assert_eq!(summary.crashed, 1);
        assert_eq!(summary.down, 1);
        assert_eq!(summary.total, 5);
        assert!(summary.any_running());
        assert!(!summary.all_running());
        assert!(!summary.all_crashed());
        assert_eq!(summary.to_string(), "2/5 running, 1 starting, 1 crashed, 1 down");
    }

    #[test]
    fn test_empty_process_is_healthy_and_not_crashed() {
        let summary = InstanceSummary::from_instances(&[]);
        assert!(summary.all_running());
        assert!(!summary.all_crashed());
    }

    #[test]
    fn test_all_crashed() {
        use InstanceState::*;
        assert!(InstanceSummary::from_instances(&instances(&[Crashed, Crashed])).all_crashed());
        assert!(!InstanceSummary::from_instances(&instances(&[Crashed, Starting])).all_crashed());
    }

    #[test]
    fn test_instance_state_parsing() {
        assert_eq!("RUNNING".parse::<InstanceState>().unwrap(), InstanceState::Running);
        assert_eq!("crashed".parse::<InstanceState>().unwrap(), InstanceState::Crashed);
        assert!("UNKNOWN".parse::<InstanceState>().is_err());
    }

    #[test]
    fn test_web_process() {
        assert!(Process::new("p1", "web", 3).is_web());
        assert!(!Process::new("p2", "worker", 1).is_web());
    }
}
