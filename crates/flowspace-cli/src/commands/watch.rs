use std::time::Duration;

use flowspace_core::sync::{probe, NetworkMonitor, OnlineSyncListener};

use crate::commands::common::Context;
use crate::error::CliError;

pub async fn run_watch(interval_secs: u64, ctx: &Context) -> Result<(), CliError> {
    let workspace = ctx.open_connected_workspace().await?;
    let engine = workspace.engine().clone();
    let interval = Duration::from_secs(interval_secs.max(1));

    let monitor = NetworkMonitor::new(false);
    let listener = OnlineSyncListener::spawn(engine.clone(), &monitor);
    println!(
        "Watching {} every {}s (Ctrl-C to stop)",
        engine.api().base_url(),
        interval.as_secs()
    );

    loop {
        let was_online = monitor.is_online();
        let online = probe(engine.api(), &monitor).await;
        if online != was_online {
            println!("{}", if online { "Online" } else { "Offline" });
        }

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            () = tokio::time::sleep(interval) => {}
        }
    }

    listener.shutdown();
    Ok(())
}
