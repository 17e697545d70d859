//! Online/offline signal and the listener that syncs on reconnect

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::SyncEngine;
use crate::api::RemoteApi;

/// Events buffered per subscriber before it lags
const EVENT_CAPACITY: usize = 16;

/// Connectivity transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkEvent {
    Online,
    Offline,
}

/// Event bus for connectivity changes.
///
/// Injected into whatever needs to react to reconnects; clones share the
/// same channel and status.
#[derive(Clone)]
pub struct NetworkMonitor {
    sender: broadcast::Sender<NetworkEvent>,
    online: Arc<AtomicBool>,
}

impl NetworkMonitor {
    pub fn new(online: bool) -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sender,
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record the current status; emits an event only on a transition.
    /// Returns whether the status changed.
    pub fn set_online(&self, online: bool) -> bool {
        if self.online.swap(online, Ordering::SeqCst) == online {
            return false;
        }

        let event = if online {
            NetworkEvent::Online
        } else {
            NetworkEvent::Offline
        };
        tracing::debug!("Network is now {event:?}");
        // No subscribers is fine
        let _ = self.sender.send(event);
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NetworkEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

/// Runs a full sync on every offline-to-online transition, pushing records
/// that are still inside a backoff window.
///
/// Unsubscribes when dropped or shut down.
pub struct OnlineSyncListener {
    handle: JoinHandle<()>,
}

impl OnlineSyncListener {
    pub fn spawn<A: RemoteApi + 'static>(engine: SyncEngine<A>, monitor: &NetworkMonitor) -> Self {
        let mut events = monitor.subscribe();
        let monitor = monitor.clone();

        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(NetworkEvent::Online) => run_pass(&engine).await,
                    Ok(NetworkEvent::Offline) => engine.mark_offline(),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Network listener skipped {skipped} events");
                        if monitor.is_online() {
                            run_pass(&engine).await;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop listening
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for OnlineSyncListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn run_pass<A: RemoteApi>(engine: &SyncEngine<A>) {
    tracing::info!("Back online, syncing");
    if let Err(e) = engine.resume().await {
        tracing::warn!("Sync after reconnect failed: {e}");
    }
}

/// Check reachability of the API and feed the result into `monitor`.
/// Returns the observed status.
pub async fn probe<A: RemoteApi>(api: &A, monitor: &NetworkMonitor) -> bool {
    let online = match api.probe().await {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!("API probe failed: {e}");
            false
        }
    };
    monitor.set_online(online);
    online
}
