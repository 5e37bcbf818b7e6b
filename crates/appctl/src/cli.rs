//! CLI structure and command definitions

use appctl_core::{RolloutFlags, Strategy, WaitPreference};
use clap::{Args, Parser, Subcommand};

/// Command-line client for an application platform control plane
#[derive(Parser, Debug)]
#[command(name = "appctl")]
#[command(version, about = "Command-line client for an application platform control plane")]
#[command(long_about = "
Command-line client for an application platform control plane

Commands that start a server-side job return as soon as the platform has
accepted it. Pass --wait to block until the job finishes.

EXAMPLES:
    # Delete a service instance and wait for the broker to finish
    appctl delete-service 6b3c1c9e --name orders-db --wait

    # Check on a job later
    appctl job /v3/jobs/2b4f6a0e

    # Restart with a canary rollout
    appctl restart 1f0d8c2a --strategy canary --instance-steps 20,40,60

ENVIRONMENT:
    APPCTL_STARTUP_TIMEOUT     minutes to wait for instances to start (default 5)
    APPCTL_STAGING_TIMEOUT     minutes to wait for staging (default 15)
    APPCTL_POLLING_INTERVAL    seconds between polls (default 3)
    APPCTL_ASYNC_TIMEOUT       minutes to poll a job, 0 for no limit (default 0)
")]
pub struct Cli {
    /// Control plane API endpoint
    #[arg(long, global = true, env = "APPCTL_API_URL")]
    pub api_url: Option<String>,

    /// Bearer token for the API
    #[arg(long, global = true, env = "APPCTL_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow an asynchronous job
    #[command(after_help = "EXAMPLES:
    # Show the job state once it has been accepted
    appctl job /v3/jobs/2b4f6a0e

    # Block until the job completes or fails
    appctl job /v3/jobs/2b4f6a0e --wait
")]
    Job {
        /// Job URL or GUID
        job: String,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Delete a service instance
    DeleteService {
        /// Service instance GUID
        guid: String,

        /// Service instance name used in messages
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Delete a service binding
    UnbindService {
        /// Service binding GUID
        guid: String,

        /// Service instance name used in messages
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        wait: WaitArgs,
    },

    /// Restart an application, optionally with a rolling or canary rollout
    #[command(after_help = "EXAMPLES:
    # Stop and start every instance at once
    appctl restart 1f0d8c2a

    # Replace two instances at a time
    appctl restart 1f0d8c2a --strategy rolling --max-in-flight 2

    # Bring up 20%, 40% then 60% of the instances, waiting on each step
    appctl restart 1f0d8c2a --strategy canary --instance-steps 20,40,60

    # Return once the first web instance is healthy
    appctl restart 1f0d8c2a --strategy rolling --no-wait
")]
    Restart {
        /// Application GUID
        app_guid: String,

        #[command(flatten)]
        rollout: RolloutArgs,
    },
}

/// Flags for commands that start an asynchronous job
#[derive(Args, Debug, Clone, Copy)]
pub struct WaitArgs {
    /// Wait for the operation to complete
    #[arg(long, short = 'w')]
    pub wait: bool,
}

impl From<WaitArgs> for WaitPreference {
    fn from(args: WaitArgs) -> Self {
        args.wait.into()
    }
}

/// Rollout flags for restart
#[derive(Args, Debug, Clone)]
pub struct RolloutArgs {
    /// Deployment strategy; omit for an immediate stop and start
    #[arg(long, value_enum)]
    pub strategy: Option<Strategy>,

    /// Comma-separated canary weights in percent, e.g. 20,40,60
    #[arg(long)]
    pub instance_steps: Option<String>,

    /// Maximum number of instances replaced at once
    #[arg(long, allow_negative_numbers = true)]
    pub max_in_flight: Option<i64>,

    /// Exit once the first instance of the web process is healthy
    #[arg(long)]
    pub no_wait: bool,
}

impl From<&RolloutArgs> for RolloutFlags {
    fn from(args: &RolloutArgs) -> Self {
        RolloutFlags {
            strategy: args.strategy.unwrap_or_default(),
            instance_steps: args.instance_steps.clone(),
            max_in_flight: args.max_in_flight,
            no_wait: args.no_wait,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rollout_args_map_to_flags() {
        let cli = Cli::parse_from([
            "appctl",
            "restart",
            "app-1",
            "--strategy",
            "canary",
            "--instance-steps",
            "20,40",
            "--max-in-flight",
            "-1",
        ]);
        let Commands::Restart { rollout, .. } = cli.command else {
            panic!("expected restart");
        };

        let flags = RolloutFlags::from(&rollout);
        assert_eq!(flags.strategy, Strategy::Canary);
        assert_eq!(flags.instance_steps.as_deref(), Some("20,40"));
        assert_eq!(flags.max_in_flight, Some(-1));
        assert!(!flags.no_wait);
    }

    #[test]
    fn test_default_strategy_cannot_be_named() {
        let result = Cli::try_parse_from(["appctl", "restart", "app-1", "--strategy", "default"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_short_wait_flag() {
        let cli = Cli::parse_from(["appctl", "job", "job-1", "-w"]);
        let Commands::Job { wait, .. } = cli.command else {
            panic!("expected job");
        };
        assert_eq!(WaitPreference::from(wait), WaitPreference::Wait);
    }
}
