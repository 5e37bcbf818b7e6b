//! Health targets for progressive rollouts
//!
//! A plan is the ordered list of instance counts that must be healthy before
//! the roller moves on. Canary weights become targets of
//! `ceil(weight * desired / 100)` instances, at least 1 and at most
//! `desired`. No two consecutive targets differ by more than `max-in-flight`.

use super::config::{RolloutSettings, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolloutStep {
    /// Canary weight completed by this step; `None` for intermediate and
    /// rolling batches
    pub weight: Option<u8>,
    /// Instances of the new web process that must be running
    pub target_instances: u32,
}

/// Derive the ordered step targets for `desired` instances
///
/// The default strategy has no steps. A canary rollout without explicit
/// weights gets a single step with one instance.
pub fn plan_steps(settings: &RolloutSettings, desired: u32) -> Vec<RolloutStep> {
    let max_in_flight = settings.max_in_flight.map_or(1, |n| n.get());

    match settings.strategy {
        Strategy::Default => Vec::new(),
        Strategy::Rolling => {
            let mut steps = Vec::new();
            let mut current = 0;
            while current < desired {
                current = desired.min(current.saturating_add(max_in_flight));
                steps.push(RolloutStep {
                    weight: None,
                    target_instances: current,
                });
            }
            steps
        }
        Strategy::Canary => {
            let Some(instance_steps) = &settings.instance_steps else {
                return vec![RolloutStep {
                    weight: None,
                    target_instances: desired.min(1),
                }];
            };

            let mut steps = Vec::new();
            let mut current = 0;
            for &weight in instance_steps.weights() {
                let target = canary_target(weight, desired);
                if target <= current {
                    // Same instance count as the previous weight; the weight
                    // still has to be applied and checked.
                    steps.push(RolloutStep {
                        weight: Some(weight),
                        target_instances: current,
                    });
                    continue;
                }
                while target - current > max_in_flight {
                    current += max_in_flight;
                    steps.push(RolloutStep {
                        weight: None,
                        target_instances: current,
                    });
                }
                current = target;
                steps.push(RolloutStep {
                    weight: Some(weight),
                    target_instances: target,
                });
            }
            steps
        }
    }
}

fn canary_target(weight: u8, desired: u32) -> u32 {
    if desired == 0 {
        return 0;
    }
    let scaled = (u64::from(weight) * u64::from(desired)).div_ceil(100);
    u32::try_from(scaled).unwrap_or(desired).clamp(1, desired)
}
