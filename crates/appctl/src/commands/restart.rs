//! Restart an application with the default, rolling or canary strategy

use appctl_core::{
    DeploymentRollout, DeploymentRoller, RolloutFlags, RolloutReport, RolloutSettings, Ui,
};
use tracing::debug;

use super::CommandContext;
use crate::error::Result;
use crate::ui::TerminalUi;

pub async fn handle_restart(ctx: &CommandContext, app_guid: &str, flags: RolloutFlags) -> Result<()> {
    // Flag combinations are rejected before any connection is attempted
    let settings: RolloutSettings = flags.validate()?;
    debug!(?settings, "Rollout flags validated");

    let client = ctx.client()?;
    let ui = TerminalUi;

    let (app, warnings) = client.get_app(app_guid).await?;
    ui.display_warnings(&warnings);
    ui.display_text(&format!("Restarting app {}...", app.name));

    let rollout = DeploymentRollout::new(app, settings);
    let mut roller = DeploymentRoller::new(client.as_ref(), &ui, ctx.timeouts).with_progress(
        Box::new(|event| debug!(?event, "Rollout progress")),
    );
    let report = roller.roll_out(&rollout).await?;

    print_report(&ui, &report);
    Ok(())
}

fn print_report(ui: &dyn Ui, report: &RolloutReport) {
    ui.display_new_line();
    ui.display_text(&format!("name: {}", report.app_name));
    if let Some(droplet) = &report.staged {
        ui.display_text(&format!("droplet: {}", droplet.guid));
    }
    for process in &report.processes {
        ui.display_text(&format!("{}: {}", process.process_type, process.summary));
    }
    ui.display_new_line();
    ui.display_ok();
}
