//! Service instance and binding deletion
//!
//! Both deletions may be accepted by the platform as an asynchronous job
//! (the broker has to deprovision or unbind first). The job is followed by
//! the wait policy controller, so `--wait` behaves the same for both.

use appctl_core::{
    EventStream, OperationHandle, OperationStart, Ui, WaitPolicyController, WaitPreference,
    spawn_job_poller,
};
use tracing::{debug, info};

use super::CommandContext;
use crate::error::Result;
use crate::ui::TerminalUi;

/// What is being deleted and how it is described to the user
struct Deletion<'a> {
    path: String,
    resource: &'a str,
    description: String,
    action: &'a str,
}

pub async fn delete_service(
    ctx: &CommandContext,
    guid: &str,
    name: Option<&str>,
    wait: WaitPreference,
) -> Result<()> {
    let deletion = Deletion {
        path: format!("/v3/service_instances/{}", guid),
        resource: name.unwrap_or(guid),
        description: format!("Deleting service instance {}...", name.unwrap_or(guid)),
        action: "Delete",
    };
    run_deletion(ctx, deletion, wait).await
}

pub async fn unbind_service(
    ctx: &CommandContext,
    guid: &str,
    name: Option<&str>,
    wait: WaitPreference,
) -> Result<()> {
    let description = match name {
        Some(name) => format!("Unbinding service instance {}...", name),
        None => format!("Deleting service binding {}...", guid),
    };
    let deletion = Deletion {
        path: format!("/v3/service_credential_bindings/{}", guid),
        resource: name.unwrap_or(guid),
        description,
        action: "Unbinding",
    };
    run_deletion(ctx, deletion, wait).await
}

async fn run_deletion(ctx: &CommandContext, deletion: Deletion<'_>, wait: WaitPreference) -> Result<()> {
    let client = ctx.client()?;
    let ui = TerminalUi;
    ui.display_text(&deletion.description);

    let (job, warnings) = client.delete_async(&deletion.path).await?;
    let start: OperationStart<EventStream> = match job {
        Some(job) => {
            info!(%job, path = %deletion.path, "Deletion accepted as a job");
            let events = spawn_job_poller(client.clone(), job.clone(), &ctx.timeouts);
            let handle = OperationHandle::new(job, deletion.resource).with_action(deletion.action);
            OperationStart::tracked(handle, events, warnings)
        }
        None => {
            debug!(path = %deletion.path, "Deletion completed synchronously");
            OperationStart::synchronous(warnings)
        }
    };

    WaitPolicyController::new(&ui, wait).resolve(start).await?;
    Ok(())
}
