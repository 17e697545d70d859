//! Page-level flows shared by every client: load with offline fallback,
//! create-and-sync, direct edits and deletes of synced records.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::api::{ApiError, RemoteApi};
use crate::db::values::text;
use crate::db::{LocalStore, RecordPatch};
use crate::error::{Error, Result};
use crate::models::{EntityKind, LocalId, Payload, Record, ServerRecord, Task, TaskStatus};
use crate::sync::{DrainReport, RetryPolicy, SyncEngine};

/// Where the records returned by [`Workspace::load`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Fresh from the server; the mirror was refreshed
    Remote,
    /// The server was unreachable; served from the local mirror
    Cache,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loaded<P> {
    pub records: Vec<Record<P>>,
    pub source: DataSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Created<P> {
    pub local_id: LocalId,
    pub report: DrainReport,
    /// The table re-read after the drain
    pub records: Vec<Record<P>>,
}

/// Store, engine and API wired together for callers
pub struct Workspace<A> {
    engine: SyncEngine<A>,
    user_id: Option<String>,
}

impl<A> Clone for Workspace<A> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

impl<A: RemoteApi + 'static> Workspace<A> {
    pub fn new(store: LocalStore, api: Arc<A>, policy: RetryPolicy) -> Self {
        Self {
            engine: SyncEngine::new(store, api).with_policy(policy),
            user_id: None,
        }
    }

    /// Stamp locally created records with this user reference
    #[must_use]
    pub fn with_user_id(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    pub const fn engine(&self) -> &SyncEngine<A> {
        &self.engine
    }

    pub const fn store(&self) -> &LocalStore {
        self.engine.store()
    }

    fn api(&self) -> &A {
        self.engine.api()
    }

    /// Fetch a table from the server and refresh the mirror, falling back to
    /// the mirror when the server cannot be reached or answers garbage.
    ///
    /// Storage errors are returned.
    pub async fn load<P: Payload>(&self) -> Result<Loaded<P>> {
        let source = match self.fetch::<P>().await {
            Ok(records) => {
                self.refresh::<P>(records).await?;
                DataSource::Remote
            }
            Err(e) => {
                tracing::warn!("Failed to fetch {}, using local data: {e}", P::KIND);
                DataSource::Cache
            }
        };

        Ok(Loaded {
            records: self.store().select_all::<P>().await?,
            source,
        })
    }

    async fn fetch<P: Payload>(&self) -> Result<Vec<ServerRecord<P>>> {
        let items = self.api().list(P::KIND).await?;
        let records = items
            .into_iter()
            .map(serde_json::from_value::<ServerRecord<P>>)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Drop synced rows gone upstream and upsert the listed ones.
    /// Pending rows are left alone.
    async fn refresh<P: Payload>(&self, records: Vec<ServerRecord<P>>) -> Result<()> {
        let keep = records.iter().map(|record| record.id).collect::<Vec<_>>();
        let pruned = self.store().prune_synced(P::KIND, &keep).await?;
        let inserted = self.store().bulk_insert(records).await?;
        tracing::debug!(
            "Refreshed {}: {inserted} from server, {pruned} pruned",
            P::KIND
        );
        Ok(())
    }

    /// Insert a record as unsynced, drain its table, and re-read the table
    pub async fn create<P: Payload>(&self, payload: P) -> Result<Created<P>> {
        let record = Record::new_local(payload, self.user_id.clone());
        self.store().insert(&record).await?;
        tracing::debug!("Created {} {}", P::KIND, record.local_id);

        let report = self.engine.drain::<P>().await?;
        Ok(Created {
            local_id: record.local_id,
            report,
            records: self.store().select_all::<P>().await?,
        })
    }

    /// Apply a payload patch locally. Synced records are also patched on the
    /// server; a failure there is logged and not queued.
    pub async fn update_synced<P: Payload>(
        &self,
        local_id: &LocalId,
        patch: &RecordPatch,
    ) -> Result<Record<P>> {
        if !patch.touches_payload() {
            return Err(Error::InvalidInput(
                "Patch does not change any field".to_string(),
            ));
        }

        let existing = self.require::<P>(local_id).await?;
        self.store().update::<P>(local_id, patch).await?;

        if let Some(server_id) = synced_identity(&existing) {
            if let Err(e) = self
                .api()
                .update(P::KIND, server_id, &patch.payload_json())
                .await
            {
                tracing::warn!(
                    "Failed to update {} {server_id} on the server: {e}",
                    P::KIND
                );
            }
        }

        self.require::<P>(local_id).await
    }

    /// Change a task's status
    pub async fn set_task_status(
        &self,
        local_id: &LocalId,
        status: TaskStatus,
    ) -> Result<Record<Task>> {
        let patch = RecordPatch::new().set("status", text(status.as_str()));
        self.update_synced::<Task>(local_id, &patch).await
    }

    /// Delete a record. Synced records are deleted on the server first and
    /// only removed locally once the server agrees.
    pub async fn delete<P: Payload>(&self, local_id: &LocalId) -> Result<()> {
        let existing = self.require::<P>(local_id).await?;

        if let Some(server_id) = synced_identity(&existing) {
            match self.api().delete(P::KIND, server_id).await {
                Ok(()) => {}
                Err(ApiError::Status { status: 404, .. }) => {
                    tracing::debug!("{} {server_id} already gone upstream", P::KIND);
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.store().delete(P::KIND, local_id).await
    }

    /// Fire-and-forget drain of one table
    pub fn mount<P: Payload>(&self) -> JoinHandle<()> {
        let engine = self.engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.drain::<P>().await {
                tracing::warn!("Background drain of {} failed: {e}", P::KIND);
            }
        })
    }

    /// Resolve a full local key or a unique prefix of one
    pub async fn resolve_id(&self, kind: EntityKind, query: &str) -> Result<LocalId> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("Record ID cannot be empty".to_string()));
        }
        if let Ok(local_id) = query.parse::<LocalId>() {
            return Ok(local_id);
        }

        let matches = self.store().find_ids_by_prefix(kind, query, 3).await?;
        match matches.as_slice() {
            [] => Err(Error::NotFound(format!("{kind} matching '{query}'"))),
            [local_id] => Ok(*local_id),
            _ => {
                let options = matches
                    .iter()
                    .map(|id| id.to_string().chars().take(13).collect::<String>())
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(Error::InvalidInput(format!(
                    "ID prefix '{query}' is ambiguous; matches: {options}"
                )))
            }
        }
    }

    async fn require<P: Payload>(&self, local_id: &LocalId) -> Result<Record<P>> {
        self.store()
            .get::<P>(local_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {local_id}", P::KIND)))
    }
}

fn synced_identity<P>(record: &Record<P>) -> Option<i64> {
    record.server_id.filter(|_| record.is_synced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeApi;
    use crate::models::Client;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup(api: FakeApi) -> (Workspace<FakeApi>, Arc<FakeApi>) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let api = Arc::new(api);
        let workspace = Workspace::new(store, Arc::clone(&api), RetryPolicy::immediate())
            .with_user_id(Some("user-1".into()));
        (workspace, api)
    }

    fn server_client(id: i64, name: &str) -> serde_json::Value {
        json!({
            "id": id,
            "name": name,
            "email": null,
            "notes": null,
            "user_id": "user-1",
            "created_at": "2024-01-01T00:00:00.000Z"
        })
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_falls_back_to_cache_unchanged() {
        let (workspace, api) = setup(FakeApi::new()).await;
        api.set_list(
            EntityKind::Clients,
            vec![
                server_client(1, "Acme"),
                server_client(2, "Globex"),
                server_client(3, "Initech"),
            ],
        );
        let fresh = workspace.load::<Client>().await.unwrap();
        assert_eq!(fresh.source, DataSource::Remote);
        assert_eq!(fresh.records.len(), 3);

        api.set_offline(true);
        let cached = workspace.load::<Client>().await.unwrap();
        assert_eq!(cached.source, DataSource::Cache);
        assert_eq!(cached.records, fresh.records);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_treats_malformed_payload_as_unreachable() {
        let (workspace, api) = setup(FakeApi::new()).await;
        api.set_list(EntityKind::Clients, vec![json!({"id": "nope"})]);
        let loaded = workspace.load::<Client>().await.unwrap();
        assert_eq!(loaded.source, DataSource::Cache);
        assert!(loaded.records.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_load_keeps_pending_records_and_stable_keys() {
        let (workspace, api) = setup(FakeApi::new()).await;
        api.set_list(
            EntityKind::Clients,
            vec![server_client(1, "Acme"), server_client(2, "Gone")],
        );
        let first = workspace.load::<Client>().await.unwrap();
        let acme = first
            .records
            .iter()
            .find(|record| record.server_id == Some(1))
            .unwrap()
            .local_id;

        api.set_offline(true);
        let created = workspace.create(Client::new("Pending")).await.unwrap();
        api.set_offline(false);

        api.set_list(EntityKind::Clients, vec![server_client(1, "Acme Corp")]);
        let second = workspace.load::<Client>().await.unwrap();
        assert_eq!(second.source, DataSource::Remote);
        assert_eq!(second.records.len(), 2);

        let refreshed = second
            .records
            .iter()
            .find(|record| record.server_id == Some(1))
            .unwrap();
        assert_eq!(refreshed.local_id, acme);
        assert_eq!(refreshed.payload.name, "Acme Corp");
        assert!(second
            .records
            .iter()
            .any(|record| record.local_id == created.local_id && !record.is_synced));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_syncs_immediately_when_online() {
        let (workspace, api) = setup(FakeApi::starting_at(57)).await;
        let created = workspace
            .create(Client::new("Acme").with_email("a@x.com"))
            .await
            .unwrap();

        assert_eq!(created.report.pushed, 1);
        assert_eq!(created.records.len(), 1);
        let record = &created.records[0];
        assert_eq!(record.local_id, created.local_id);
        assert_eq!(record.server_id, Some(57));
        assert_eq!(record.user_id.as_deref(), Some("user-1"));
        assert_eq!(api.created(EntityKind::Clients).len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_offline_keeps_record_pending() {
        let (workspace, api) = setup(FakeApi::new()).await;
        api.set_offline(true);
        let created = workspace.create(Task::new("Draft proposal")).await.unwrap();

        assert_eq!(created.report.failed, 1);
        assert_eq!(created.records.len(), 1);
        assert!(!created.records[0].is_synced);
        assert_eq!(created.records[0].server_id, None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_workspace_without_server_keeps_everything_local() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let workspace = Workspace::new(store, Arc::new(None::<FakeApi>), RetryPolicy::default());

        let created = workspace.create(Client::new("Acme")).await.unwrap();
        assert_eq!(created.report.failed, 1);
        assert_eq!(created.records[0].sync_attempts, 0);
        assert_eq!(created.records[0].next_attempt_at, None);

        let loaded = workspace.load::<Client>().await.unwrap();
        assert_eq!(loaded.source, DataSource::Cache);
        assert_eq!(loaded.records, created.records);

        workspace.delete::<Client>(&created.local_id).await.unwrap();
        assert!(workspace.store().select_all::<Client>().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_task_status_patches_synced_record() {
        let (workspace, api) = setup(FakeApi::starting_at(4)).await;
        let created = workspace.create(Task::new("Ship")).await.unwrap();

        let updated = workspace
            .set_task_status(&created.local_id, TaskStatus::Done)
            .await
            .unwrap();
        assert_eq!(updated.payload.status, TaskStatus::Done);
        assert!(updated.is_synced);
        assert_eq!(
            api.updated(),
            vec![(EntityKind::Tasks, 4, json!({"status": "DONE"}))]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_task_status_offline_is_local_only() {
        let (workspace, api) = setup(FakeApi::new()).await;
        let created = workspace.create(Task::new("Ship")).await.unwrap();

        api.set_offline(true);
        let updated = workspace
            .set_task_status(&created.local_id, TaskStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(updated.payload.status, TaskStatus::InProgress);
        assert!(api.updated().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_unsynced_is_local_only() {
        let (workspace, api) = setup(FakeApi::new()).await;
        api.set_offline(true);
        let created = workspace.create(Client::new("Acme")).await.unwrap();

        workspace.delete::<Client>(&created.local_id).await.unwrap();
        assert!(workspace
            .store()
            .get::<Client>(&created.local_id)
            .await
            .unwrap()
            .is_none());
        assert!(api.deleted().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_delete_synced_requires_server() {
        let (workspace, api) = setup(FakeApi::starting_at(9)).await;
        let created = workspace.create(Client::new("Acme")).await.unwrap();

        api.set_offline(true);
        let result = workspace.delete::<Client>(&created.local_id).await;
        assert!(matches!(result, Err(Error::Api(_))));
        assert!(workspace
            .store()
            .get::<Client>(&created.local_id)
            .await
            .unwrap()
            .is_some());

        api.set_offline(false);
        workspace.delete::<Client>(&created.local_id).await.unwrap();
        assert_eq!(api.deleted(), vec![(EntityKind::Clients, 9)]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mount_drains_in_background() {
        let (workspace, api) = setup(FakeApi::new()).await;
        api.set_offline(true);
        workspace.create(Task::new("Draft proposal")).await.unwrap();
        workspace.create(Task::new("Review contract")).await.unwrap();

        api.set_offline(false);
        workspace.mount::<Task>().await.unwrap();
        assert_eq!(
            workspace.store().count_unsynced(EntityKind::Tasks).await.unwrap(),
            0
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_resolve_id_by_prefix() {
        let (workspace, api) = setup(FakeApi::new()).await;
        api.set_offline(true);
        let created = workspace.create(Client::new("Acme")).await.unwrap();
        let id = created.local_id.to_string();

        assert_eq!(
            workspace
                .resolve_id(EntityKind::Clients, &id[..10])
                .await
                .unwrap(),
            created.local_id
        );
        assert!(matches!(
            workspace.resolve_id(EntityKind::Clients, "zzz").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            workspace.resolve_id(EntityKind::Clients, "  ").await,
            Err(Error::InvalidInput(_))
        ));
    }
}
