use flowspace_core::api::RemoteApi;
use flowspace_core::models::{Client, Contact, Invoice, Note, Payload, Task};
use flowspace_core::services::{DataSource, Workspace};

use crate::cli::EntityArg;
use crate::commands::common::{format_record_lines, Context, Headline};
use crate::error::CliError;

pub async fn run_list(entity: EntityArg, as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let workspace = ctx.open_workspace().await?;
    let lines = match entity {
        EntityArg::Client => list_entity::<_, Client>(&workspace, as_json).await?,
        EntityArg::Note => list_entity::<_, Note>(&workspace, as_json).await?,
        EntityArg::Invoice => list_entity::<_, Invoice>(&workspace, as_json).await?,
        EntityArg::Task => list_entity::<_, Task>(&workspace, as_json).await?,
        EntityArg::Contact => list_entity::<_, Contact>(&workspace, as_json).await?,
    };

    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Load one table and render it as output lines.
///
/// The table's pending records are drained alongside the fetch; the listing
/// is re-read once that drain finishes so sync labels are current.
pub async fn list_entity<A, P>(
    workspace: &Workspace<A>,
    as_json: bool,
) -> Result<Vec<String>, CliError>
where
    A: RemoteApi + 'static,
    P: Payload + Headline,
{
    let drain = workspace.mount::<P>();
    let mut loaded = workspace.load::<P>().await?;
    if let Err(e) = drain.await {
        tracing::warn!("Drain of {} did not finish: {e}", P::KIND);
    }
    loaded.records = workspace.store().select_all::<P>().await?;

    if as_json {
        return Ok(vec![serde_json::to_string_pretty(&loaded)?]);
    }

    if loaded.source == DataSource::Cache {
        eprintln!("API unreachable; showing local data.");
    }
    if loaded.records.is_empty() {
        return Ok(vec![format!("No {} yet.", P::KIND)]);
    }
    Ok(format_record_lines(&loaded.records))
}
