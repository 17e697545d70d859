//! Sync engine: drains locally created records to the remote API.
//!
//! Sync is one-directional. Each pass re-reads the unsynced rows of a table
//! and pushes them one at a time to the creation endpoint. A success records
//! the server identity and flips the row to synced. A failure is logged and
//! the pass moves on; only server rejections count toward the retry policy,
//! so time spent offline never defers or stalls a record.

mod network;
mod retry;

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::api::RemoteApi;
use crate::db::{LocalStore, PendingCount, RecordPatch};
use crate::error::{Error, Result};
use crate::models::{Client, Contact, EntityKind, Invoice, Note, Payload, Record, Task};
use crate::state::SyncState;
use crate::util::{compact_text, unix_millis_now};

pub use network::{probe, NetworkEvent, NetworkMonitor, OnlineSyncListener};
pub use retry::{Attempt, RetryPolicy};

/// Outcome of one drain of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub kind: EntityKind,
    /// Records acknowledged by the server in this pass
    pub pushed: usize,
    /// Records whose push failed in this pass
    pub failed: usize,
    /// Records skipped because their backoff window is still open
    pub deferred: usize,
    /// Records skipped because they reached the attempt cap
    pub stalled: usize,
}

impl DrainReport {
    pub const fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            pushed: 0,
            failed: 0,
            deferred: 0,
            stalled: 0,
        }
    }

    /// Records still unsynced after this pass
    pub const fn remaining(&self) -> usize {
        self.failed + self.deferred + self.stalled
    }
}

/// Outcome of a full pass, one report per table in sync order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub drains: Vec<DrainReport>,
}

impl SyncReport {
    pub fn pushed(&self) -> usize {
        self.drains.iter().map(|drain| drain.pushed).sum()
    }

    pub fn failed(&self) -> usize {
        self.drains.iter().map(|drain| drain.failed).sum()
    }

    pub fn stalled(&self) -> usize {
        self.drains.iter().map(|drain| drain.stalled).sum()
    }

    /// Whether every table was fully drained
    pub fn is_clean(&self) -> bool {
        self.drains.iter().all(|drain| drain.remaining() == 0)
    }
}

/// Which backoff rules a pass honours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Scheduled,
    /// Connectivity just came back; open backoff windows are ignored
    Reconnect,
}

/// Pushes unsynced records of every table to a [`RemoteApi`].
///
/// Cheap to clone; clones share the store, the API client, and the published
/// [`SyncState`]. Concurrent passes are allowed: each one re-reads the
/// unsynced rows, so a row pushed by one pass is skipped by the next once its
/// flag has flipped.
pub struct SyncEngine<A> {
    store: LocalStore,
    api: Arc<A>,
    policy: RetryPolicy,
    state: Arc<watch::Sender<SyncState>>,
}

impl<A> Clone for SyncEngine<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            api: Arc::clone(&self.api),
            policy: self.policy,
            state: Arc::clone(&self.state),
        }
    }
}

impl<A: RemoteApi> SyncEngine<A> {
    pub fn new(store: LocalStore, api: Arc<A>) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            store,
            api,
            policy: RetryPolicy::default(),
            state: Arc::new(state),
        }
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Current engine state
    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    /// Observe state changes
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Publish that the API is unreachable
    pub fn mark_offline(&self) {
        self.state.send_replace(SyncState::Offline);
    }

    /// Push every eligible unsynced record of one table.
    ///
    /// Push failures are logged and recorded on the row; only storage errors
    /// are returned.
    pub async fn drain<P: Payload>(&self) -> Result<DrainReport> {
        self.drain_pass::<P>(Pass::Scheduled).await
    }

    async fn drain_pass<P: Payload>(&self, pass: Pass) -> Result<DrainReport> {
        let pending = self.store.select_unsynced::<P>().await?;
        let mut report = DrainReport::new(P::KIND);
        if pending.is_empty() {
            return Ok(report);
        }

        tracing::debug!("Draining {} unsynced {} records", pending.len(), P::KIND);
        let now = unix_millis_now();
        for record in pending {
            match self.policy.classify(&record, now) {
                Attempt::Push => {}
                Attempt::Deferred if pass == Pass::Reconnect => {}
                Attempt::Deferred => {
                    report.deferred += 1;
                    continue;
                }
                Attempt::Stalled => {
                    report.stalled += 1;
                    continue;
                }
            }

            match self.push(&record).await {
                Ok(server_id) => {
                    self.store
                        .mark_synced::<P>(&record.local_id, server_id)
                        .await?;
                    tracing::debug!("Synced {} {} as {server_id}", P::KIND, record.local_id);
                    report.pushed += 1;
                }
                Err(error) if !counts_as_attempt(&error) => {
                    tracing::warn!(
                        "Could not push {} {}, will retry: {error}",
                        P::KIND,
                        record.local_id
                    );
                    let patch = RecordPatch::push_interrupted(compact_text(&error.to_string()));
                    self.store.update::<P>(&record.local_id, &patch).await?;
                    report.failed += 1;
                }
                Err(error) => {
                    let attempts = record.sync_attempts.saturating_add(1);
                    tracing::warn!(
                        "Failed to push {} {} (attempt {attempts}): {error}",
                        P::KIND,
                        record.local_id
                    );
                    if self.policy.is_stalled(attempts) {
                        tracing::warn!(
                            "{} {} stalled after {attempts} attempts",
                            P::KIND,
                            record.local_id
                        );
                    }
                    let patch = RecordPatch::push_failed(
                        compact_text(&error.to_string()),
                        self.policy.next_attempt_at(attempts, unix_millis_now()),
                    );
                    self.store.update::<P>(&record.local_id, &patch).await?;
                    report.failed += 1;
                }
            }
        }

        if report.pushed > 0 || report.failed > 0 {
            tracing::info!(
                "Drained {}: {} pushed, {} failed",
                P::KIND,
                report.pushed,
                report.failed
            );
        }
        Ok(report)
    }

    async fn push<P: Payload>(&self, record: &Record<P>) -> Result<i64> {
        let body = serde_json::to_value(&record.payload)?;
        Ok(self.api.create(P::KIND, &body).await?)
    }

    /// Drain one table chosen at runtime
    pub async fn sync_entity(&self, kind: EntityKind) -> Result<DrainReport> {
        self.sync_entity_pass(kind, Pass::Scheduled).await
    }

    async fn sync_entity_pass(&self, kind: EntityKind, pass: Pass) -> Result<DrainReport> {
        match kind {
            EntityKind::Clients => self.drain_pass::<Client>(pass).await,
            EntityKind::Notes => self.drain_pass::<Note>(pass).await,
            EntityKind::Invoices => self.drain_pass::<Invoice>(pass).await,
            EntityKind::Tasks => self.drain_pass::<Task>(pass).await,
            EntityKind::Contacts => self.drain_pass::<Contact>(pass).await,
        }
    }

    /// Drain every table in order (clients, notes, invoices, tasks,
    /// contacts), each one fully before the next.
    pub async fn sync_all(&self) -> Result<SyncReport> {
        self.sync_all_pass(Pass::Scheduled).await
    }

    /// Full pass after an offline-to-online transition. Records waiting out
    /// a backoff window are pushed now; stalled records stay stalled.
    pub async fn resume(&self) -> Result<SyncReport> {
        self.sync_all_pass(Pass::Reconnect).await
    }

    async fn sync_all_pass(&self, pass: Pass) -> Result<SyncReport> {
        self.state.send_replace(SyncState::Syncing);

        let mut report = SyncReport::default();
        for kind in EntityKind::ALL {
            match self.sync_entity_pass(kind, pass).await {
                Ok(drain) => report.drains.push(drain),
                Err(error) => {
                    self.state.send_replace(SyncState::Error);
                    return Err(error);
                }
            }
        }

        let state = if report.is_clean() {
            SyncState::Synced
        } else {
            SyncState::Error
        };
        self.state.send_replace(state);
        tracing::info!(
            "Sync pass finished: {} pushed, {} failed, {} stalled",
            report.pushed(),
            report.failed(),
            report.stalled()
        );
        Ok(report)
    }

    /// Unsynced records of one table that reached the attempt cap
    pub async fn stalled<P: Payload>(&self) -> Result<Vec<Record<P>>> {
        let Some(max_attempts) = self.policy.max_attempts else {
            return Ok(Vec::new());
        };
        let records = self.store.select_unsynced::<P>().await?;
        Ok(records
            .into_iter()
            .filter(|record| record.sync_attempts >= max_attempts)
            .collect())
    }

    /// Reset the bookkeeping of stalled records so the next pass pushes them
    pub async fn retry_stalled<P: Payload>(&self) -> Result<usize> {
        let stalled = self.stalled::<P>().await?;
        for record in &stalled {
            self.store
                .update::<P>(&record.local_id, &RecordPatch::reset_retry())
                .await?;
        }
        if !stalled.is_empty() {
            tracing::info!("Re-queued {} stalled {} records", stalled.len(), P::KIND);
        }
        Ok(stalled.len())
    }

    /// [`Self::retry_stalled`] for every table
    pub async fn retry_all_stalled(&self) -> Result<usize> {
        Ok(self.retry_stalled::<Client>().await?
            + self.retry_stalled::<Note>().await?
            + self.retry_stalled::<Invoice>().await?
            + self.retry_stalled::<Task>().await?
            + self.retry_stalled::<Contact>().await?)
    }

    /// Unsynced and stalled counts per table, in sync order
    pub async fn pending_counts(&self) -> Result<Vec<PendingCount>> {
        self.store.pending_counts(self.policy.max_attempts).await
    }
}

/// Whether a failed push counts toward backoff and the attempt cap.
/// Only a verdict on the payload does; an unreachable or failing server
/// says nothing about the record.
const fn counts_as_attempt(error: &Error) -> bool {
    match error {
        Error::Api(api) => api.is_rejection(),
        Error::Serialization(_) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeApi;
    use crate::models::ServerRecord;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup(api: FakeApi) -> (SyncEngine<FakeApi>, Arc<FakeApi>) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let api = Arc::new(api);
        let engine = SyncEngine::new(store, Arc::clone(&api)).with_policy(RetryPolicy::immediate());
        (engine, api)
    }

    async fn create<P: Payload>(engine: &SyncEngine<FakeApi>, payload: P) -> Record<P> {
        let record = Record::new_local(payload, None);
        engine.store().insert(&record).await.unwrap();
        record
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_client_gets_server_identity() {
        let (engine, api) = setup(FakeApi::starting_at(57)).await;
        api.set_offline(true);
        let record = create(&engine, Client::new("Acme").with_email("a@x.com")).await;

        let report = engine.drain::<Client>().await.unwrap();
        assert_eq!(report.failed, 1);
        let unsynced = engine.store().select_unsynced::<Client>().await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].server_id, None);

        api.set_offline(false);
        engine.sync_all().await.unwrap();

        let all = engine.store().select_all::<Client>().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].local_id, record.local_id);
        assert_eq!(all[0].server_id, Some(57));
        assert!(all[0].is_synced);
        assert_eq!(all[0].sync_attempts, 0);
        assert_eq!(
            api.created(EntityKind::Clients),
            vec![json!({"name": "Acme", "email": "a@x.com", "notes": null})]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_all_makes_every_offline_record_synced() {
        let (engine, api) = setup(FakeApi::new()).await;
        api.set_offline(true);
        create(&engine, Client::new("Acme")).await;
        create(&engine, Note::new("Call back", 1)).await;
        create(&engine, Invoice::new(1, 120.0)).await;
        create(&engine, Task::new("Draft proposal")).await;
        create(&engine, Task::new("Review contract")).await;
        create(&engine, Contact::new("Jane")).await;

        let report = engine.sync_all().await.unwrap();
        assert_eq!(report.failed(), 6);
        assert_eq!(engine.state(), SyncState::Error);

        api.set_offline(false);
        let report = engine.sync_all().await.unwrap();
        assert_eq!(report.pushed(), 6);
        assert!(report.is_clean());
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(
            report.drains.iter().map(|drain| drain.kind).collect::<Vec<_>>(),
            EntityKind::ALL.to_vec()
        );

        for count in engine.pending_counts().await.unwrap() {
            assert_eq!(count.unsynced, 0, "{}", count.kind);
        }
        let tasks = engine.store().select_all::<Task>().await.unwrap();
        assert!(tasks.iter().all(|task| task.server_id.is_some()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resync_without_pending_records_makes_no_requests() {
        let (engine, api) = setup(FakeApi::new()).await;
        create(&engine, Task::new("Ship")).await;
        engine.sync_all().await.unwrap();
        let synced = engine.store().select_all::<Task>().await.unwrap();
        let requests = api.requests();

        engine.sync_all().await.unwrap();
        engine.drain::<Task>().await.unwrap();

        assert_eq!(api.requests(), requests);
        assert_eq!(engine.store().select_all::<Task>().await.unwrap(), synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_one_rejection_does_not_block_others() {
        let (engine, api) = setup(FakeApi::new()).await;
        api.reject_when("name", json!("Broken"));
        let first = create(&engine, Client::new("First")).await;
        let second = create(&engine, Client::new("Broken")).await;
        let third = create(&engine, Client::new("Third")).await;

        let report = engine.drain::<Client>().await.unwrap();
        assert_eq!((report.pushed, report.failed), (2, 1));

        let store = engine.store();
        assert!(store.get::<Client>(&first.local_id).await.unwrap().unwrap().is_synced);
        assert!(store.get::<Client>(&third.local_id).await.unwrap().unwrap().is_synced);

        let failed = store.get::<Client>(&second.local_id).await.unwrap().unwrap();
        assert!(!failed.is_synced);
        assert_eq!(failed.sync_attempts, 1);
        assert!(failed.last_sync_error.unwrap().contains("rejected"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_backoff_defers_rejected_records_until_window_passes() {
        let (engine, api) = setup(FakeApi::new()).await;
        let engine = engine.with_policy(RetryPolicy::default());
        api.reject_when("title", json!("Ship"));
        let record = create(&engine, Task::new("Ship")).await;

        engine.drain::<Task>().await.unwrap();
        let requests = api.requests();
        let failed = engine.store().get::<Task>(&record.local_id).await.unwrap().unwrap();
        assert_eq!(failed.sync_attempts, 1);
        assert!(failed.next_attempt_at.unwrap() > unix_millis_now());

        api.accept_all();
        let report = engine.drain::<Task>().await.unwrap();
        assert_eq!(report.deferred, 1);
        assert_eq!(api.requests(), requests);

        engine
            .store()
            .update::<Task>(&record.local_id, &RecordPatch::reset_retry())
            .await
            .unwrap();
        let report = engine.drain::<Task>().await.unwrap();
        assert_eq!(report.pushed, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_default_policy_pushes_offline_records_on_reconnect() {
        let (engine, api) = setup(FakeApi::starting_at(57)).await;
        let engine = engine.with_policy(RetryPolicy::default());
        api.set_offline(true);
        let record = create(&engine, Client::new("Acme")).await;

        for _ in 0..10 {
            let report = engine.drain::<Client>().await.unwrap();
            assert_eq!((report.failed, report.deferred, report.stalled), (1, 0, 0));
        }
        let waiting = engine.store().get::<Client>(&record.local_id).await.unwrap().unwrap();
        assert_eq!(waiting.sync_attempts, 0);
        assert_eq!(waiting.next_attempt_at, None);
        assert!(waiting.last_sync_error.unwrap().contains("offline"));
        assert!(engine.stalled::<Client>().await.unwrap().is_empty());

        api.set_offline(false);
        let report = engine.sync_all().await.unwrap();
        assert_eq!(report.pushed(), 1);
        assert_eq!(engine.state(), SyncState::Synced);

        let synced = engine.store().get::<Client>(&record.local_id).await.unwrap().unwrap();
        assert!(synced.is_synced);
        assert_eq!(synced.server_id, Some(57));
        assert_eq!(synced.last_sync_error, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resume_ignores_backoff_but_not_stalls() {
        let (engine, api) = setup(FakeApi::new()).await;
        let engine = engine.with_policy(RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::default()
        });
        api.reject_when("title", json!("Waiting"));
        api.reject_when("title", json!("Stuck"));
        let waiting = create(&engine, Task::new("Waiting")).await;
        let stuck = create(&engine, Task::new("Stuck")).await;

        engine.drain::<Task>().await.unwrap();
        engine
            .store()
            .update::<Task>(&stuck.local_id, &RecordPatch::push_failed("rejected", None))
            .await
            .unwrap();
        api.accept_all();

        assert_eq!(engine.drain::<Task>().await.unwrap().deferred, 1);

        let report = engine.resume().await.unwrap();
        assert_eq!(report.pushed(), 1);
        assert_eq!(report.stalled(), 1);
        let store = engine.store();
        assert!(store.get::<Task>(&waiting.local_id).await.unwrap().unwrap().is_synced);
        assert!(!store.get::<Task>(&stuck.local_id).await.unwrap().unwrap().is_synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_push_of_already_hydrated_record_keeps_draining() {
        let (engine, api) = setup(FakeApi::new()).await;
        let first = create(&engine, Client::new("Acme")).await;
        let second = create(&engine, Client::new("Globex")).await;
        create(&engine, Task::new("Ship")).await;
        engine
            .store()
            .bulk_insert(vec![ServerRecord {
                id: 1,
                user_id: None,
                created_at: None,
                payload: Client::new("Acme"),
            }])
            .await
            .unwrap();

        let report = engine.sync_all().await.unwrap();
        assert_eq!(report.pushed(), 3);
        assert!(report.is_clean());

        let clients = engine.store().select_all::<Client>().await.unwrap();
        assert_eq!(clients.len(), 2);
        assert!(clients.iter().all(|client| client.is_synced));
        let acme = engine.store().get::<Client>(&first.local_id).await.unwrap().unwrap();
        assert_eq!(acme.server_id, Some(1));
        let globex = engine.store().get::<Client>(&second.local_id).await.unwrap().unwrap();
        assert_eq!(globex.server_id, Some(2));

        engine.sync_all().await.unwrap();
        assert_eq!(api.created(EntityKind::Clients).len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stalled_records_need_manual_retry() {
        let (engine, api) = setup(FakeApi::new()).await;
        let engine = engine.with_policy(RetryPolicy {
            max_attempts: Some(2),
            ..RetryPolicy::immediate()
        });
        api.reject_when("title", json!("Bad"));
        create(&engine, Task::new("Bad")).await;

        engine.drain::<Task>().await.unwrap();
        engine.drain::<Task>().await.unwrap();
        let requests = api.requests();

        let report = engine.drain::<Task>().await.unwrap();
        assert_eq!(report.stalled, 1);
        assert_eq!(api.requests(), requests);
        assert_eq!(engine.stalled::<Task>().await.unwrap().len(), 1);
        assert_eq!(engine.pending_counts().await.unwrap()[3].stalled, 1);

        api.accept_all();
        assert_eq!(engine.retry_all_stalled().await.unwrap(), 1);
        let report = engine.drain::<Task>().await.unwrap();
        assert_eq!(report.pushed, 1);
        assert!(engine.stalled::<Task>().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_state_is_published() {
        let (engine, _api) = setup(FakeApi::new()).await;
        let mut receiver = engine.subscribe_state();
        assert_eq!(*receiver.borrow(), SyncState::Offline);

        engine.sync_all().await.unwrap();
        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), SyncState::Synced);

        engine.mark_offline();
        assert_eq!(engine.state(), SyncState::Offline);
    }
}
