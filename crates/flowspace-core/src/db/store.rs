//! Local mirror of the server's entity tables

use std::sync::Arc;

use libsql::params::Params;
use libsql::{Connection, Row, Value};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use super::patch::RecordPatch;
use super::values::{
    get_integer, get_opt_integer, get_opt_text, get_text, integer, opt_integer, opt_text, text,
};
use super::Database;
use crate::error::{Error, Result};
use crate::models::{EntityKind, LocalId, Payload, Record, ServerRecord};

/// Bookkeeping columns shared by every table, in select order
const BOOKKEEPING_COLUMNS: [&str; 8] = [
    "local_id",
    "server_id",
    "user_id",
    "created_at",
    "is_synced",
    "sync_attempts",
    "last_sync_error",
    "next_attempt_at",
];

/// Index of the first payload column in a selected row
#[allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
const PAYLOAD_OFFSET: i32 = BOOKKEEPING_COLUMNS.len() as i32;

/// Pending work for one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PendingCount {
    pub kind: EntityKind,
    pub unsynced: u64,
    pub stalled: u64,
}

/// Persistent on-device mirror of every entity table.
///
/// Cheap to clone; clones share one connection. Writes go through a shared
/// lock so a statement issued by one task never lands inside another task's
/// open transaction. Storage errors are returned to the caller as-is.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Database>,
    writes: Arc<Mutex<()>>,
}

impl LocalStore {
    /// Wrap an open database
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(db),
            writes: Arc::new(Mutex::new(())),
        }
    }

    /// Open (or create) the store at the given path
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Ok(Self::new(Database::open(path).await?))
    }

    /// Open an in-memory store (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory().await?))
    }

    fn conn(&self) -> &Connection {
        self.db.connection()
    }

    async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writes.lock().await
    }

    /// Run `statements` in order inside one transaction, returning the rows
    /// each one affected. Everything is rolled back on the first error.
    async fn transaction(&self, statements: Vec<(String, Vec<Value>)>) -> Result<Vec<u64>> {
        let _guard = self.write_lock().await;
        self.conn().execute("BEGIN TRANSACTION", ()).await?;

        let mut affected = Vec::with_capacity(statements.len());
        for (sql, values) in statements {
            match self.conn().execute(&sql, Params::Positional(values)).await {
                Ok(rows) => affected.push(rows),
                Err(e) => {
                    self.conn().execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
            }
        }

        if let Err(e) = self.conn().execute("COMMIT", ()).await {
            self.conn().execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
        Ok(affected)
    }

    /// Delete every record in a table, synced or not
    pub async fn clear(&self, kind: EntityKind) -> Result<u64> {
        let _guard = self.write_lock().await;
        let removed = self
            .conn()
            .execute(&format!("DELETE FROM {}", kind.table()), ())
            .await?;
        tracing::debug!("Cleared {removed} {kind} records");
        Ok(removed)
    }

    /// Delete synced records whose server identity is not in `keep`.
    ///
    /// Unsynced records are never touched: they are not upstream yet.
    pub async fn prune_synced(&self, kind: EntityKind, keep: &[i64]) -> Result<u64> {
        let _guard = self.write_lock().await;
        let removed = if keep.is_empty() {
            self.conn()
                .execute(
                    &format!("DELETE FROM {} WHERE is_synced = 1", kind.table()),
                    (),
                )
                .await?
        } else {
            let placeholders = vec!["?"; keep.len()].join(", ");
            let values = keep.iter().copied().map(Value::Integer).collect();
            self.conn()
                .execute(
                    &format!(
                        "DELETE FROM {} WHERE is_synced = 1 AND server_id NOT IN ({placeholders})",
                        kind.table()
                    ),
                    Params::Positional(values),
                )
                .await?
        };
        Ok(removed)
    }

    /// Insert a batch of server records, each stamped synced.
    ///
    /// A record whose server identity is already mirrored is refreshed in
    /// place and keeps its local key and creation time.
    pub async fn bulk_insert<P: Payload>(&self, records: Vec<ServerRecord<P>>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let refresh = P::COLUMNS
            .iter()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})
             ON CONFLICT(server_id) DO UPDATE SET
                user_id = excluded.user_id,
                is_synced = 1,
                sync_attempts = 0,
                last_sync_error = NULL,
                next_attempt_at = NULL,
                {refresh}",
            P::KIND.table(),
            all_columns::<P>(),
            placeholders::<P>(),
        );

        let count = records.len();
        let statements = records
            .into_iter()
            .map(|server| (sql.clone(), record_values(&Record::from_server(server))))
            .collect();
        self.transaction(statements).await?;

        tracing::debug!("Hydrated {count} {} records from server", P::KIND);
        Ok(count)
    }

    /// Insert one record with its own sync flag
    pub async fn insert<P: Payload>(&self, record: &Record<P>) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            P::KIND.table(),
            all_columns::<P>(),
            placeholders::<P>(),
        );
        let _guard = self.write_lock().await;
        self.conn()
            .execute(&sql, Params::Positional(record_values(record)))
            .await?;
        Ok(())
    }

    /// Apply a partial update to the record with the given local key
    pub async fn update<P: Payload>(&self, local_id: &LocalId, patch: &RecordPatch) -> Result<()> {
        let (assignments, mut values) = patch.to_assignments::<P>()?;
        values.push(text(&local_id.as_str()));

        let _guard = self.write_lock().await;
        let rows = self
            .conn()
            .execute(
                &format!(
                    "UPDATE {} SET {assignments} WHERE local_id = ?",
                    P::KIND.table()
                ),
                Params::Positional(values),
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{} {local_id}", P::KIND)));
        }
        Ok(())
    }

    /// Record the server identity of a pushed record and flip it to synced.
    ///
    /// A refresh may already have mirrored the same server record under its
    /// own local key; that copy is dropped so the pushed record keeps its key
    /// and `server_id` stays unique.
    pub async fn mark_synced<P: Payload>(&self, local_id: &LocalId, server_id: i64) -> Result<()> {
        let table = P::KIND.table();
        let (assignments, mut values) = RecordPatch::synced_as(server_id).to_assignments::<P>()?;
        values.push(text(&local_id.as_str()));

        let affected = self
            .transaction(vec![
                (
                    format!("DELETE FROM {table} WHERE server_id = ? AND local_id <> ?"),
                    vec![integer(server_id), text(&local_id.as_str())],
                ),
                (
                    format!("UPDATE {table} SET {assignments} WHERE local_id = ?"),
                    values,
                ),
            ])
            .await?;

        match affected.as_slice() {
            [_, 0] => Err(Error::NotFound(format!("{} {local_id}", P::KIND))),
            [merged, _] if *merged > 0 => {
                tracing::debug!(
                    "Merged hydrated copy of {} {server_id} into {local_id}",
                    P::KIND
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Remove one record locally
    pub async fn delete(&self, kind: EntityKind, local_id: &LocalId) -> Result<()> {
        let _guard = self.write_lock().await;
        let rows = self
            .conn()
            .execute(
                &format!("DELETE FROM {} WHERE local_id = ?", kind.table()),
                [local_id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("{kind} {local_id}")));
        }
        Ok(())
    }

    /// Get a record by local key
    pub async fn get<P: Payload>(&self, local_id: &LocalId) -> Result<Option<Record<P>>> {
        let mut records = self
            .select::<P>("WHERE local_id = ?", vec![text(&local_id.as_str())])
            .await?;
        Ok(records.pop())
    }

    /// Get a record by server identity
    #[cfg(test)]
    pub(crate) async fn get_by_server_id<P: Payload>(
        &self,
        server_id: i64,
    ) -> Result<Option<Record<P>>> {
        let mut records = self
            .select::<P>("WHERE server_id = ?", vec![integer(server_id)])
            .await?;
        Ok(records.pop())
    }

    /// Every record still waiting to be pushed
    pub async fn select_unsynced<P: Payload>(&self) -> Result<Vec<Record<P>>> {
        self.select::<P>("WHERE is_synced = 0 ORDER BY rowid", Vec::new())
            .await
    }

    /// The whole mirrored table
    pub async fn select_all<P: Payload>(&self) -> Result<Vec<Record<P>>> {
        self.select::<P>("ORDER BY created_at, rowid", Vec::new())
            .await
    }

    /// Records whose indexed `column` equals `value`
    /// (e.g. invoices by `client_id`, tasks by `status`)
    pub async fn select_where<P: Payload>(
        &self,
        column: &str,
        value: Value,
    ) -> Result<Vec<Record<P>>> {
        if !P::INDEXED.contains(&column) {
            return Err(Error::InvalidInput(format!(
                "Column '{column}' is not indexed on {}",
                P::KIND
            )));
        }
        self.select::<P>(
            &format!("WHERE {column} = ? ORDER BY created_at, rowid"),
            vec![value],
        )
        .await
    }

    /// Number of records waiting to be pushed
    pub async fn count_unsynced(&self, kind: EntityKind) -> Result<u64> {
        self.count(kind, "is_synced = 0", Vec::new()).await
    }

    /// Number of unsynced records that have failed at least `max_attempts` times
    pub async fn count_stalled(&self, kind: EntityKind, max_attempts: u32) -> Result<u64> {
        self.count(
            kind,
            "is_synced = 0 AND sync_attempts >= ?",
            vec![integer(i64::from(max_attempts))],
        )
        .await
    }

    /// Unsynced and stalled counts per table, in sync order.
    /// Nothing counts as stalled without an attempt cap.
    pub async fn pending_counts(&self, max_attempts: Option<u32>) -> Result<Vec<PendingCount>> {
        let mut counts = Vec::with_capacity(EntityKind::ALL.len());
        for kind in EntityKind::ALL {
            let stalled = match max_attempts {
                Some(max_attempts) => self.count_stalled(kind, max_attempts).await?,
                None => 0,
            };
            counts.push(PendingCount {
                kind,
                unsynced: self.count_unsynced(kind).await?,
                stalled,
            });
        }
        Ok(counts)
    }

    /// Local keys starting with `prefix`, for resolving abbreviated IDs
    pub async fn find_ids_by_prefix(
        &self,
        kind: EntityKind,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<LocalId>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT local_id FROM {} WHERE local_id LIKE ? || '%' ORDER BY local_id LIMIT ?",
                    kind.table()
                ),
                Params::Positional(vec![text(prefix), integer(limit)]),
            )
            .await?;

        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(parse_local_id(&get_text(&row, 0)?)?);
        }
        Ok(ids)
    }

    async fn select<P: Payload>(&self, clause: &str, values: Vec<Value>) -> Result<Vec<Record<P>>> {
        let sql = format!(
            "SELECT {} FROM {} {clause}",
            all_columns::<P>(),
            P::KIND.table()
        );
        let mut rows = self
            .conn()
            .query(&sql, Params::Positional(values))
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(parse_record::<P>(&row)?);
        }
        Ok(records)
    }

    async fn count(&self, kind: EntityKind, filter: &str, values: Vec<Value>) -> Result<u64> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT COUNT(*) FROM {} WHERE {filter}", kind.table()),
                Params::Positional(values),
            )
            .await?;

        let count = match rows.next().await? {
            Some(row) => get_integer(&row, 0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn all_columns<P: Payload>() -> String {
    BOOKKEEPING_COLUMNS
        .iter()
        .chain(P::COLUMNS)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholders<P: Payload>() -> String {
    vec!["?"; BOOKKEEPING_COLUMNS.len() + P::COLUMNS.len()].join(", ")
}

fn record_values<P: Payload>(record: &Record<P>) -> Vec<Value> {
    let mut values = vec![
        text(&record.local_id.as_str()),
        opt_integer(record.server_id),
        opt_text(record.user_id.as_deref()),
        text(&record.created_at),
        integer(i64::from(record.is_synced)),
        integer(i64::from(record.sync_attempts)),
        opt_text(record.last_sync_error.as_deref()),
        opt_integer(record.next_attempt_at),
    ];
    values.extend(record.payload.to_values());
    values
}

fn parse_local_id(raw: &str) -> Result<LocalId> {
    raw.parse()
        .map_err(|_| Error::Database(format!("Invalid local id in store: {raw}")))
}

/// Parse a record from a row selected with [`all_columns`]
fn parse_record<P: Payload>(row: &Row) -> Result<Record<P>> {
    let sync_attempts = get_integer(row, 5)?;
    Ok(Record {
        local_id: parse_local_id(&get_text(row, 0)?)?,
        server_id: get_opt_integer(row, 1)?,
        user_id: get_opt_text(row, 2)?,
        created_at: get_text(row, 3)?,
        is_synced: get_integer(row, 4)? != 0,
        sync_attempts: u32::try_from(sync_attempts).unwrap_or(u32::MAX),
        last_sync_error: get_opt_text(row, 6)?,
        next_attempt_at: get_opt_integer(row, 7)?,
        payload: P::from_row(row, PAYLOAD_OFFSET)?,
    })
}
