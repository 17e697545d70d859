//! Shared cross-client state types.

use serde::Serialize;

/// Unified sync state published by the sync engine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No pass has completed since the last offline transition.
    #[default]
    Offline,
    Syncing,
    Synced,
    /// The last pass left at least one record unsynced.
    Error,
}
