//! Mirrored record envelope shared by every entity table

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::util::iso_timestamp_now;

/// Stable local key for a mirrored record, using UUID v7 (time-sortable).
///
/// Assigned once at creation (or hydration) and never rewritten. The server's
/// identity lives next to it in [`Record::server_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(Uuid);

impl LocalId {
    /// Create a new unique local ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for LocalId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LocalId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// The mirrored entity tables, in the order a full sync drains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Clients,
    Notes,
    Invoices,
    Tasks,
    Contacts,
}

impl EntityKind {
    /// Every table, in full-sync order.
    pub const ALL: [Self; 5] = [
        Self::Clients,
        Self::Notes,
        Self::Invoices,
        Self::Tasks,
        Self::Contacts,
    ];

    /// Local table name
    pub const fn table(self) -> &'static str {
        match self {
            Self::Clients => "clients",
            Self::Notes => "notes",
            Self::Invoices => "invoices",
            Self::Tasks => "tasks",
            Self::Contacts => "contacts",
        }
    }

    /// Collection path on the remote API (`/clients/`, ...)
    pub fn collection_path(self) -> String {
        format!("/{}/", self.table())
    }

    /// Item path on the remote API (`/clients/57`, ...)
    pub fn item_path(self, server_id: i64) -> String {
        format!("/{}/{server_id}", self.table())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.table())
    }
}

impl FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| {
                kind.table() == normalized || kind.table().trim_end_matches('s') == normalized
            })
            .ok_or_else(|| Error::InvalidInput(format!("Unknown entity type: {s}")))
    }
}

/// Describes one entity's domain payload and how it maps onto its table.
///
/// The serde form of the payload is exactly the body sent to the creation
/// endpoint: no local key, no timestamps, no sync bookkeeping.
pub trait Payload:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Table and endpoint this payload belongs to
    const KIND: EntityKind;

    /// Payload columns, in the order used by [`Payload::to_values`]
    const COLUMNS: &'static [&'static str];

    /// Columns that can be used for lookups with `select_where`
    const INDEXED: &'static [&'static str];

    /// SQL values for [`Payload::COLUMNS`]
    fn to_values(&self) -> Vec<libsql::Value>;

    /// Decode the payload from a row whose payload columns start at `offset`
    fn from_row(row: &libsql::Row, offset: i32) -> Result<Self>;
}

/// A mirrored record: the entity payload plus sync bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record<P> {
    /// Stable local key
    pub local_id: LocalId,
    /// Server-assigned identity, present once synced
    pub server_id: Option<i64>,
    /// Owning user reference
    pub user_id: Option<String>,
    /// Client-assigned creation time (ISO-8601), never overwritten by sync
    pub created_at: String,
    /// Whether the server has acknowledged this record
    pub is_synced: bool,
    /// Failed push attempts since the last success or manual retry
    pub sync_attempts: u32,
    /// Last push failure, compacted
    pub last_sync_error: Option<String>,
    /// Earliest time (Unix ms) the engine may push this record again
    pub next_attempt_at: Option<i64>,
    /// Domain payload
    #[serde(flatten)]
    pub payload: P,
}

impl<P: Payload> Record<P> {
    /// A freshly created, unsynced local record
    #[must_use]
    pub fn new_local(payload: P, user_id: Option<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: None,
            user_id,
            created_at: iso_timestamp_now(),
            is_synced: false,
            sync_attempts: 0,
            last_sync_error: None,
            next_attempt_at: None,
            payload,
        }
    }

    /// A synced record hydrated from a trusted server response
    #[must_use]
    pub fn from_server(server: ServerRecord<P>) -> Self {
        Self {
            local_id: LocalId::new(),
            server_id: Some(server.id),
            user_id: server.user_id,
            created_at: server.created_at.unwrap_or_else(iso_timestamp_now),
            is_synced: true,
            sync_attempts: 0,
            last_sync_error: None,
            next_attempt_at: None,
            payload: server.payload,
        }
    }
}

/// A record as returned by `GET /{entity}/`.
///
/// Fields the mirror does not store are ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServerRecord<P> {
    pub id: i64,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub payload: P,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Client;

    #[test]
    fn test_local_id_unique() {
        let id1 = LocalId::new();
        let id2 = LocalId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_local_id_parse() {
        let id = LocalId::new();
        let parsed: LocalId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_entity_kind_paths() {
        assert_eq!(EntityKind::Invoices.collection_path(), "/invoices/");
        assert_eq!(EntityKind::Clients.item_path(57), "/clients/57");
    }

    #[test]
    fn test_entity_kind_parses_singular_and_plural() {
        assert_eq!("client".parse::<EntityKind>().unwrap(), EntityKind::Clients);
        assert_eq!(" Tasks ".parse::<EntityKind>().unwrap(), EntityKind::Tasks);
        assert!("widgets".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_full_sync_order() {
        assert_eq!(
            EntityKind::ALL.map(EntityKind::table),
            ["clients", "notes", "invoices", "tasks", "contacts"]
        );
    }

    #[test]
    fn test_new_local_record_is_unsynced() {
        let record = Record::new_local(Client::new("Acme"), Some("user-1".into()));
        assert!(!record.is_synced);
        assert_eq!(record.server_id, None);
        assert_eq!(record.sync_attempts, 0);
    }

    #[test]
    fn test_server_record_ignores_unknown_fields() {
        let server: ServerRecord<Client> = serde_json::from_str(
            r#"{"id": 57, "name": "Acme", "email": "a@x.com", "user_id": "u1", "extra": true}"#,
        )
        .unwrap();
        let record = Record::from_server(server);
        assert!(record.is_synced);
        assert_eq!(record.server_id, Some(57));
        assert_eq!(record.user_id.as_deref(), Some("u1"));
        assert_eq!(record.payload.email.as_deref(), Some("a@x.com"));
        assert!(!record.created_at.is_empty());
    }
}
