//! Partial record updates

use libsql::Value;
use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};
use crate::models::Payload;

/// A partial update applied to one mirrored record by local key.
///
/// Only payload columns, the server identity, the sync flag, and retry
/// bookkeeping can be patched. `local_id` and `created_at` are immutable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    fields: Vec<(String, Value)>,
    server_id: Option<i64>,
    retry: Option<RetryUpdate>,
}

#[derive(Debug, Clone, PartialEq)]
enum RetryUpdate {
    Failed {
        error: String,
        next_attempt_at: Option<i64>,
    },
    Interrupted {
        error: String,
    },
    Reset,
}

impl RecordPatch {
    /// An empty patch
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the server identity and flip the record to synced.
    ///
    /// Also clears retry bookkeeping.
    #[must_use]
    pub fn synced_as(server_id: i64) -> Self {
        Self {
            server_id: Some(server_id),
            retry: Some(RetryUpdate::Reset),
            ..Self::default()
        }
    }

    /// Count one failed push and schedule the next attempt
    #[must_use]
    pub fn push_failed(error: impl Into<String>, next_attempt_at: Option<i64>) -> Self {
        Self {
            retry: Some(RetryUpdate::Failed {
                error: error.into(),
                next_attempt_at,
            }),
            ..Self::default()
        }
    }

    /// Note a push that never reached a verdict (unreachable server, 5xx).
    /// The attempt count is kept and the next pass may push right away.
    #[must_use]
    pub fn push_interrupted(error: impl Into<String>) -> Self {
        Self {
            retry: Some(RetryUpdate::Interrupted {
                error: error.into(),
            }),
            ..Self::default()
        }
    }

    /// Forget previous failures so the next pass pushes immediately
    #[must_use]
    pub fn reset_retry() -> Self {
        Self {
            retry: Some(RetryUpdate::Reset),
            ..Self::default()
        }
    }

    /// Set a payload column
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: Value) -> Self {
        self.fields.push((column.into(), value));
        self
    }

    /// Whether the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.server_id.is_none() && self.retry.is_none()
    }

    /// Whether the patch changes domain payload columns
    pub fn touches_payload(&self) -> bool {
        !self.fields.is_empty()
    }

    /// The payload columns of this patch as a JSON body for `PATCH /{entity}/{id}`
    pub fn payload_json(&self) -> JsonValue {
        let body = self
            .fields
            .iter()
            .map(|(column, value)| (column.clone(), json_value(value)))
            .collect::<Map<_, _>>();
        JsonValue::Object(body)
    }

    /// Build the `SET` clause and its bound values for table `P`
    pub(crate) fn to_assignments<P: Payload>(&self) -> Result<(String, Vec<Value>)> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        for (column, value) in &self.fields {
            if !P::COLUMNS.contains(&column.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "Column '{column}' is not patchable on {}",
                    P::KIND
                )));
            }
            clauses.push(format!("{column} = ?"));
            values.push(value.clone());
        }

        if let Some(server_id) = self.server_id {
            clauses.push("server_id = ?".to_string());
            values.push(Value::Integer(server_id));
            clauses.push("is_synced = 1".to_string());
        }

        match &self.retry {
            Some(RetryUpdate::Failed {
                error,
                next_attempt_at,
            }) => {
                clauses.push("sync_attempts = sync_attempts + 1".to_string());
                clauses.push("last_sync_error = ?".to_string());
                values.push(Value::Text(error.clone()));
                clauses.push("next_attempt_at = ?".to_string());
                values.push(next_attempt_at.map_or(Value::Null, Value::Integer));
            }
            Some(RetryUpdate::Interrupted { error }) => {
                clauses.push("last_sync_error = ?".to_string());
                values.push(Value::Text(error.clone()));
                clauses.push("next_attempt_at = NULL".to_string());
            }
            Some(RetryUpdate::Reset) => {
                clauses.push("sync_attempts = 0".to_string());
                clauses.push("last_sync_error = NULL".to_string());
                clauses.push("next_attempt_at = NULL".to_string());
            }
            None => {}
        }

        if clauses.is_empty() {
            return Err(Error::InvalidInput("Empty record patch".into()));
        }

        Ok((clauses.join(", "), values))
    }
}

fn json_value(value: &Value) -> JsonValue {
    match value {
        Value::Null | Value::Blob(_) => JsonValue::Null,
        Value::Integer(value) => JsonValue::from(*value),
        Value::Real(value) => JsonValue::from(*value),
        Value::Text(value) => JsonValue::from(value.as_str()),
    }
}
