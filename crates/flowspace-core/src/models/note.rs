//! Note model

use serde::{Deserialize, Serialize};

use super::record::{EntityKind, Payload};
use crate::db::values::{get_integer, get_text, integer, text};
use crate::error::Result;

/// A free-text note attached to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    /// Server identity of the client this note belongs to
    pub client_id: i64,
}

impl Note {
    #[must_use]
    pub fn new(content: impl Into<String>, client_id: i64) -> Self {
        Self {
            content: content.into(),
            client_id,
        }
    }

    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.content
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }
}

impl Payload for Note {
    const KIND: EntityKind = EntityKind::Notes;
    const COLUMNS: &'static [&'static str] = &["content", "client_id"];
    const INDEXED: &'static [&'static str] = &["client_id"];

    fn to_values(&self) -> Vec<libsql::Value> {
        vec![text(&self.content), integer(self.client_id)]
    }

    fn from_row(row: &libsql::Row, offset: i32) -> Result<Self> {
        Ok(Self {
            content: get_text(row, offset)?,
            client_id: get_integer(row, offset + 1)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_preview() {
        let note = Note::new("First line\nSecond line", 1);
        assert_eq!(note.title_preview(50), "First line");
        assert_eq!(note.title_preview(5), "First");
    }
}
