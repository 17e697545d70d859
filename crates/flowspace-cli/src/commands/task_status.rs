use flowspace_core::models::TaskStatus;
use flowspace_core::EntityKind;

use crate::commands::common::{short_id, Context};
use crate::error::CliError;

pub async fn run_task_status(id: &str, status: TaskStatus, ctx: &Context) -> Result<(), CliError> {
    let workspace = ctx.open_workspace().await?;
    let local_id = workspace.resolve_id(EntityKind::Tasks, id).await?;
    let task = workspace.set_task_status(&local_id, status).await?;

    println!("{}  {}", short_id(&task.local_id), task.payload.status);
    Ok(())
}
