use flowspace_core::sync::SyncReport;

use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_sync(retry_stalled: bool, as_json: bool, ctx: &Context) -> Result<(), CliError> {
    let workspace = ctx.open_connected_workspace().await?;
    let engine = workspace.engine();

    if retry_stalled {
        let requeued = engine.retry_all_stalled().await?;
        if !as_json {
            println!("Re-queued {requeued} stalled records");
        }
    }

    let report = engine.sync_all().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_report_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = report
        .drains
        .iter()
        .filter(|drain| drain.pushed + drain.remaining() > 0)
        .map(|drain| {
            format!(
                "{:<10}  pushed {}  failed {}  deferred {}  stalled {}",
                drain.kind, drain.pushed, drain.failed, drain.deferred, drain.stalled
            )
        })
        .collect::<Vec<_>>();

    if report.is_clean() {
        lines.push("Sync completed".to_string());
    } else if report.stalled() > 0 {
        lines.push(
            "Some records stopped retrying; run `flowspace sync --retry-stalled`".to_string(),
        );
    } else {
        lines.push("Some records are still pending; they will be retried".to_string());
    }
    lines
}
