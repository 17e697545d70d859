use flowspace_core::models::{Client, Contact, Invoice, Note, Task};
use flowspace_core::EntityKind;

use crate::cli::EntityArg;
use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_delete(entity: EntityArg, id: &str, ctx: &Context) -> Result<(), CliError> {
    let workspace = ctx.open_workspace().await?;
    let kind = EntityKind::from(entity);
    let local_id = workspace.resolve_id(kind, id).await?;

    match entity {
        EntityArg::Client => workspace.delete::<Client>(&local_id).await?,
        EntityArg::Note => workspace.delete::<Note>(&local_id).await?,
        EntityArg::Invoice => workspace.delete::<Invoice>(&local_id).await?,
        EntityArg::Task => workspace.delete::<Task>(&local_id).await?,
        EntityArg::Contact => workspace.delete::<Contact>(&local_id).await?,
    }

    println!("{local_id}");
    Ok(())
}
