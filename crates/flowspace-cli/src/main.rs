//! FlowSpace CLI - offline-first client for the FlowSpace API
//!
//! Records are written to the local store first and pushed to the API when
//! it is reachable.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::common::Context;
use crate::commands::completions::run_completions;
use crate::commands::delete::run_delete;
use crate::commands::list::run_list;
use crate::commands::pending::run_pending;
use crate::commands::sync::run_sync;
use crate::commands::task_status::run_task_status;
use crate::commands::watch::run_watch;
use crate::error::CliError;

const DEFAULT_LOG_FILTER: &str = "flowspace=info,flowspace_core=info";

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let ctx = Context::load(cli.config.as_deref(), cli.db_path, cli.api_url)?;

    match cli.command {
        Commands::Add { record } => run_add(record, &ctx).await?,
        Commands::List { entity, json } => run_list(entity, json, &ctx).await?,
        Commands::Pending { json } => run_pending(json, &ctx).await?,
        Commands::Sync {
            retry_stalled,
            json,
        } => run_sync(retry_stalled, json, &ctx).await?,
        Commands::TaskStatus { id, status } => {
            run_task_status(&id, status.into(), &ctx).await?;
        }
        Commands::Delete { entity, id } => run_delete(entity, &id, &ctx).await?,
        Commands::Watch { interval } => run_watch(interval, &ctx).await?,
        Commands::Completions { .. } => {}
    }

    Ok(())
}
