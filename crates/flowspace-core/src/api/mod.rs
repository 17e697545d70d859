//! Remote API client
//!
//! The server is a black-box REST/JSON service exposing, per entity,
//! `GET /{entity}/`, `POST /{entity}/`, `PATCH /{entity}/{id}` and
//! `DELETE /{entity}/{id}`.

mod http;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::models::EntityKind;
use crate::util::compact_text;

pub use http::HttpApiClient;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid API configuration: {0}")]
    InvalidConfiguration(String),
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {message} ({status})")]
    Status { status: u16, message: String },
    #[error("Invalid API payload: {0}")]
    InvalidPayload(String),
}

impl ApiError {
    /// Build a status error from a non-2xx response body
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        Self::Status {
            status: status.as_u16(),
            message: parse_error_message(body),
        }
    }

    /// Whether the server rejected the request (4xx) rather than failing
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status >= 400 && *status < 500)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// The remote collaborator consumed by the sync engine and workspace.
///
/// Futures are `Send` so passes can run on spawned tasks.
pub trait RemoteApi: Send + Sync {
    /// `GET /{entity}/`: server-canonical records
    fn list(&self, kind: EntityKind) -> impl Future<Output = ApiResult<Vec<JsonValue>>> + Send;

    /// `POST /{entity}/`: returns the server-assigned identity
    fn create(
        &self,
        kind: EntityKind,
        body: &JsonValue,
    ) -> impl Future<Output = ApiResult<i64>> + Send;

    /// `PATCH /{entity}/{id}`
    fn update(
        &self,
        kind: EntityKind,
        server_id: i64,
        body: &JsonValue,
    ) -> impl Future<Output = ApiResult<()>> + Send;

    /// `DELETE /{entity}/{id}`
    fn delete(&self, kind: EntityKind, server_id: i64)
        -> impl Future<Output = ApiResult<()>> + Send;

    /// Cheap reachability check used to feed the network monitor
    fn probe(&self) -> impl Future<Output = ApiResult<()>> + Send;
}

/// No server configured: every call fails as unreachable, so records are
/// kept locally and stay pending until a client is supplied.
impl<A: RemoteApi> RemoteApi for Option<A> {
    async fn list(&self, kind: EntityKind) -> ApiResult<Vec<JsonValue>> {
        match self {
            Some(api) => api.list(kind).await,
            None => Err(not_configured()),
        }
    }

    async fn create(&self, kind: EntityKind, body: &JsonValue) -> ApiResult<i64> {
        match self {
            Some(api) => api.create(kind, body).await,
            None => Err(not_configured()),
        }
    }

    async fn update(&self, kind: EntityKind, server_id: i64, body: &JsonValue) -> ApiResult<()> {
        match self {
            Some(api) => api.update(kind, server_id, body).await,
            None => Err(not_configured()),
        }
    }

    async fn delete(&self, kind: EntityKind, server_id: i64) -> ApiResult<()> {
        match self {
            Some(api) => api.delete(kind, server_id).await,
            None => Err(not_configured()),
        }
    }

    async fn probe(&self) -> ApiResult<()> {
        match self {
            Some(api) => api.probe().await,
            None => Err(not_configured()),
        }
    }
}

fn not_configured() -> ApiError {
    ApiError::InvalidConfiguration("API base URL is not configured".to_string())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<JsonValue>,
    message: Option<String>,
    error: Option<String>,
}

/// Extract the most useful message from an error body.
///
/// Accepts `{"detail": ..}` (string or validation list), `{"message": ..}`
/// and `{"error": ..}`, falling back to the compacted raw body.
fn parse_error_message(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        let detail = payload.detail.map(|detail| match detail {
            JsonValue::String(text) => text,
            other => other.to_string(),
        });
        if let Some(message) = detail.or(payload.message).or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        "empty response".to_string()
    } else {
        trimmed
    }
}

/// Pull the server identity out of a creation response
pub(crate) fn created_id(body: &JsonValue) -> ApiResult<i64> {
    body.get("id")
        .and_then(JsonValue::as_i64)
        .ok_or_else(|| ApiError::InvalidPayload("response did not include an integer id".into()))
}
