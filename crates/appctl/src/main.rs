use anyhow::Result;
use appctl_core::{RolloutFlags, Timeouts};
use clap::Parser;
use tracing::{debug, info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod client;
mod commands;
mod error;
mod ui;

use cli::{Cli, Commands};
use commands::CommandContext;
use error::AppCtlError;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level
    init_tracing(cli.verbose);

    let timeouts = Timeouts::from_env();
    debug!(?timeouts, "Loaded timeouts");
    let ctx = CommandContext::new(cli.api_url.clone(), cli.token.clone(), timeouts);

    if let Err(e) = execute_command(&cli, &ctx).await {
        e.print_diagnostic();
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    // Check for RUST_LOG env var first, then fall back to verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "appctl=warn,appctl_core=warn",
            1 => "appctl=info,appctl_core=info",
            2 => "appctl=debug,appctl_core=debug",
            _ => "appctl=trace,appctl_core=trace",
        };
        tracing_subscriber::EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .compact(),
        )
        .init();

    debug!("Tracing initialized with verbosity level: {}", verbose);
}

async fn execute_command(cli: &Cli, ctx: &CommandContext) -> Result<(), AppCtlError> {
    trace!("Executing command: {:?}", cli.command);

    let start = std::time::Instant::now();
    let result = match &cli.command {
        Commands::Job { job, wait } => {
            debug!("Executing job command");
            commands::job::handle_job(ctx, job, (*wait).into()).await
        }
        Commands::DeleteService { guid, name, wait } => {
            debug!("Executing delete-service command");
            commands::service::delete_service(ctx, guid, name.as_deref(), (*wait).into()).await
        }
        Commands::UnbindService { guid, name, wait } => {
            debug!("Executing unbind-service command");
            commands::service::unbind_service(ctx, guid, name.as_deref(), (*wait).into()).await
        }
        Commands::Restart { app_guid, rollout } => {
            debug!("Executing restart command");
            commands::restart::handle_restart(ctx, app_guid, RolloutFlags::from(rollout)).await
        }
    };

    let duration = start.elapsed();
    match &result {
        Ok(_) => info!("Command completed successfully in {:?}", duration),
        Err(e) => info!("Command failed after {:?}: {}", duration, e),
    }

    result
}
