//! Client model

use serde::{Deserialize, Serialize};

use super::record::{EntityKind, Payload};
use crate::db::values::{get_opt_text, get_text, opt_text, text};
use crate::error::Result;

/// A client (customer) of the workspace owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Client {
    /// Create a client with only a name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            notes: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    #[must_use]
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

impl Payload for Client {
    const KIND: EntityKind = EntityKind::Clients;
    const COLUMNS: &'static [&'static str] = &["name", "email", "notes"];
    const INDEXED: &'static [&'static str] = &["name", "user_id"];

    fn to_values(&self) -> Vec<libsql::Value> {
        vec![
            text(&self.name),
            opt_text(self.email.as_deref()),
            opt_text(self.notes.as_deref()),
        ]
    }

    fn from_row(row: &libsql::Row, offset: i32) -> Result<Self> {
        Ok(Self {
            name: get_text(row, offset)?,
            email: get_opt_text(row, offset + 1)?,
            notes: get_opt_text(row, offset + 2)?,
        })
    }
}
