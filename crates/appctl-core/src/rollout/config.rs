//! Rollout flag validation
//!
//! Every check here runs before the first remote call. A rejected combination
//! is a local, non-retryable [`RolloutConfigError`].

use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;

use clap::ValueEnum;
use thiserror::Error;
use tracing::debug;

use super::backend::AppRef;

/// How the new version of an app replaces the running one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum)]
pub enum Strategy {
    /// Stop then start; all instances are replaced at once
    #[default]
    #[value(skip)]
    Default,
    /// Replace instances progressively
    Rolling,
    /// Bring up instances following ordered percentage weights
    Canary,
}

impl Strategy {
    pub fn is_default(&self) -> bool {
        matches!(self, Strategy::Default)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Default => "default",
            Strategy::Rolling => "rolling",
            Strategy::Canary => "canary",
        };
        f.write_str(name)
    }
}

/// Invalid combination of rollout flags
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RolloutConfigError {
    #[error("--max-in-flight must be used in combination with a non-default strategy flag")]
    MaxInFlightWithoutStrategy,

    #[error("--instance-steps must be used in combination with --strategy=canary (got '{strategy}')")]
    InstanceStepsWithoutCanary { strategy: Strategy },

    #[error("--max-in-flight must be greater than or equal to 1 (got {0})")]
    MaxInFlightTooSmall(i64),

    #[error(
        "Invalid value for --instance-steps: '{value}'. Expected a comma-separated list of whole percentages between 1 and 100"
    )]
    MalformedInstanceSteps { value: String },
}

/// Ordered canary weights in percent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSteps(Vec<u8>);

impl InstanceSteps {
    pub fn weights(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for InstanceSteps {
    type Err = RolloutConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || RolloutConfigError::MalformedInstanceSteps {
            value: s.to_string(),
        };

        if s.trim().is_empty() {
            return Err(malformed());
        }

        let weights = s
            .split(',')
            .map(|piece| {
                piece
                    .trim()
                    .parse::<u8>()
                    .ok()
                    .filter(|weight| (1..=100).contains(weight))
                    .ok_or_else(malformed)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self(weights))
    }
}

/// Raw rollout flags exactly as the user supplied them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolloutFlags {
    pub strategy: Strategy,
    pub instance_steps: Option<String>,
    pub max_in_flight: Option<i64>,
    pub no_wait: bool,
}

impl RolloutFlags {
    /// Reject invalid flag combinations and parse the step list
    ///
    /// Checks run in a fixed order so the reported error is stable when
    /// several flags are wrong at once.
    pub fn validate(&self) -> Result<RolloutSettings, RolloutConfigError> {
        if self.strategy.is_default() && self.max_in_flight.is_some() {
            return Err(RolloutConfigError::MaxInFlightWithoutStrategy);
        }

        if self.instance_steps.is_some() && self.strategy != Strategy::Canary {
            return Err(RolloutConfigError::InstanceStepsWithoutCanary {
                strategy: self.strategy,
            });
        }

        let max_in_flight = match self.max_in_flight {
            None => None,
            Some(value) => {
                let converted = u32::try_from(value).ok().and_then(NonZeroU32::new);
                Some(converted.ok_or(RolloutConfigError::MaxInFlightTooSmall(value))?)
            }
        };

        let instance_steps = self
            .instance_steps
            .as_deref()
            .map(str::parse::<InstanceSteps>)
            .transpose()?;

        debug!(
            strategy = %self.strategy,
            ?instance_steps,
            ?max_in_flight,
            no_wait = self.no_wait,
            "Rollout flags validated"
        );

        Ok(RolloutSettings {
            strategy: self.strategy,
            instance_steps,
            max_in_flight,
            no_wait: self.no_wait,
        })
    }
}

/// Validated rollout configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloutSettings {
    pub strategy: Strategy,
    /// Only ever set for [`Strategy::Canary`]
    pub instance_steps: Option<InstanceSteps>,
    /// Only ever set for a non-default strategy
    pub max_in_flight: Option<NonZeroU32>,
    pub no_wait: bool,
}

impl Default for RolloutSettings {
    fn default() -> Self {
        Self {
            strategy: Strategy::Default,
            instance_steps: None,
            max_in_flight: None,
            no_wait: false,
        }
    }
}

/// One restart invocation: which app, and how to roll it out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRollout {
    pub app: AppRef,
    pub settings: RolloutSettings,
}

impl DeploymentRollout {
    pub fn new(app: AppRef, settings: RolloutSettings) -> Self {
        Self { app, settings }
    }
}
