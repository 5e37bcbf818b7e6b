//! Follow an already accepted job

use appctl_core::{
    JobRef, OperationHandle, OperationStart, WaitPolicyController, WaitPreference, Warnings,
    spawn_job_poller,
};
use tracing::info;

use super::CommandContext;
use crate::error::Result;
use crate::ui::TerminalUi;

pub async fn handle_job(ctx: &CommandContext, job: &str, wait: WaitPreference) -> Result<()> {
    let client = ctx.client()?;
    let job = JobRef::new(job);
    info!(%job, ?wait, "Tracking job");

    let events = spawn_job_poller(client, job.clone(), &ctx.timeouts);
    let handle = OperationHandle::new(job, "Job");
    let start = OperationStart::tracked(handle, events, Warnings::new());

    WaitPolicyController::new(&TerminalUi, wait)
        .resolve(start)
        .await?;
    Ok(())
}
