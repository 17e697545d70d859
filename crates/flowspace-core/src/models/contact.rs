//! Contact model

use serde::{Deserialize, Serialize};

use super::record::{EntityKind, Payload};
use crate::db::values::{get_opt_text, get_text, opt_text, text};
use crate::error::Result;

/// An address-book entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl Contact {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: None,
            company: None,
            notes: None,
        }
    }
}

impl Payload for Contact {
    const KIND: EntityKind = EntityKind::Contacts;
    const COLUMNS: &'static [&'static str] = &["name", "email", "phone", "company", "notes"];
    const INDEXED: &'static [&'static str] = &["name", "user_id"];

    fn to_values(&self) -> Vec<libsql::Value> {
        vec![
            text(&self.name),
            opt_text(self.email.as_deref()),
            opt_text(self.phone.as_deref()),
            opt_text(self.company.as_deref()),
            opt_text(self.notes.as_deref()),
        ]
    }

    fn from_row(row: &libsql::Row, offset: i32) -> Result<Self> {
        Ok(Self {
            name: get_text(row, offset)?,
            email: get_opt_text(row, offset + 1)?,
            phone: get_opt_text(row, offset + 2)?,
            company: get_opt_text(row, offset + 3)?,
            notes: get_opt_text(row, offset + 4)?,
        })
    }
}
