//! Scripted in-process stand-in for the remote API

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value as JsonValue;

use super::{ApiError, ApiResult, RemoteApi};
use crate::models::EntityKind;

#[derive(Default)]
struct FakeState {
    offline: bool,
    next_id: i64,
    listed: HashMap<EntityKind, Vec<JsonValue>>,
    created: Vec<(EntityKind, JsonValue)>,
    updated: Vec<(EntityKind, i64, JsonValue)>,
    deleted: Vec<(EntityKind, i64)>,
    reject: Vec<(String, JsonValue)>,
    requests: usize,
}

/// Fake server: assigns sequential ids, records every request, and can be
/// switched offline or told to reject specific payloads.
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Server ids handed out by `create` start at `first_id`
    pub fn starting_at(first_id: i64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_id: first_id,
                ..FakeState::default()
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_offline(&self, offline: bool) {
        self.with_state(|state| state.offline = offline);
    }

    /// Reject every `POST` whose body has `field == value` with a 422
    pub fn reject_when(&self, field: &str, value: JsonValue) {
        self.with_state(|state| state.reject.push((field.to_string(), value)));
    }

    /// Stop rejecting payloads
    pub fn accept_all(&self) {
        self.with_state(|state| state.reject.clear());
    }

    pub fn set_list(&self, kind: EntityKind, items: Vec<JsonValue>) {
        self.with_state(|state| {
            state.listed.insert(kind, items);
        });
    }

    pub fn requests(&self) -> usize {
        self.with_state(|state| state.requests)
    }

    pub fn created(&self, kind: EntityKind) -> Vec<JsonValue> {
        self.with_state(|state| {
            state
                .created
                .iter()
                .filter(|(created_kind, _)| *created_kind == kind)
                .map(|(_, body)| body.clone())
                .collect()
        })
    }

    pub fn updated(&self) -> Vec<(EntityKind, i64, JsonValue)> {
        self.with_state(|state| state.updated.clone())
    }

    pub fn deleted(&self) -> Vec<(EntityKind, i64)> {
        self.with_state(|state| state.deleted.clone())
    }

    fn begin(state: &mut FakeState) -> ApiResult<()> {
        state.requests += 1;
        if state.offline {
            return Err(ApiError::Status {
                status: 503,
                message: "offline".to_string(),
            });
        }
        Ok(())
    }
}

impl RemoteApi for FakeApi {
    async fn list(&self, kind: EntityKind) -> ApiResult<Vec<JsonValue>> {
        self.with_state(|state| {
            Self::begin(state)?;
            Ok(state.listed.get(&kind).cloned().unwrap_or_default())
        })
    }

    async fn create(&self, kind: EntityKind, body: &JsonValue) -> ApiResult<i64> {
        self.with_state(|state| {
            Self::begin(state)?;
            let rejected = state
                .reject
                .iter()
                .any(|(field, value)| body.get(field) == Some(value));
            if rejected {
                return Err(ApiError::Status {
                    status: 422,
                    message: "rejected".to_string(),
                });
            }

            let id = state.next_id;
            state.next_id += 1;
            state.created.push((kind, body.clone()));
            Ok(id)
        })
    }

    async fn update(&self, kind: EntityKind, server_id: i64, body: &JsonValue) -> ApiResult<()> {
        self.with_state(|state| {
            Self::begin(state)?;
            state.updated.push((kind, server_id, body.clone()));
            Ok(())
        })
    }

    async fn delete(&self, kind: EntityKind, server_id: i64) -> ApiResult<()> {
        self.with_state(|state| {
            Self::begin(state)?;
            state.deleted.push((kind, server_id));
            Ok(())
        })
    }

    async fn probe(&self) -> ApiResult<()> {
        self.with_state(Self::begin)
    }
}
