use flowspace_core::db::PendingCount;

use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_pending(as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let store = ctx.open_store().await?;
    let counts = store
        .pending_counts(ctx.config.retry.policy().max_attempts)
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    for line in format_pending_lines(&counts) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_pending_lines(counts: &[PendingCount]) -> Vec<String> {
    if counts.iter().all(|count| count.unsynced == 0) {
        return vec!["Everything is synced.".to_string()];
    }

    counts
        .iter()
        .filter(|count| count.unsynced > 0)
        .map(|count| {
            if count.stalled > 0 {
                format!(
                    "{:<10}  {} pending, {} stalled",
                    count.kind, count.unsynced, count.stalled
                )
            } else {
                format!("{:<10}  {} pending", count.kind, count.unsynced)
            }
        })
        .collect()
}
