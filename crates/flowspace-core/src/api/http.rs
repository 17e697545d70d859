//! reqwest-backed implementation of [`RemoteApi`]

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use serde_json::Value as JsonValue;

use super::{created_id, ApiError, ApiResult, RemoteApi};
use crate::config::ApiConfig;
use crate::models::EntityKind;
use crate::util::{is_http_url, normalize_text_option};

/// HTTP client for the FlowSpace REST API.
///
/// No request timeout is applied unless one is configured; a hung request
/// then stalls only the pass that issued it.
#[derive(Clone)]
pub struct HttpApiClient {
    base_url: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpApiClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpApiClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpApiClient {
    pub fn new(base_url: impl Into<String>) -> ApiResult<Self> {
        Self::build(base_url.into(), None, None)
    }

    /// Build a client from resolved configuration
    pub fn from_config(config: &ApiConfig) -> ApiResult<Self> {
        let base_url = config.base_url.clone().ok_or_else(|| {
            ApiError::InvalidConfiguration("API base URL is not configured".to_string())
        })?;
        Self::build(base_url, config.token.clone(), config.request_timeout())
    }

    fn build(
        base_url: String,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> ApiResult<Self> {
        let base_url = normalize_base_url(base_url)?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base_url,
            token: normalize_text_option(token),
            client: builder.build()?,
        })
    }

    /// Normalized base URL without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_response(status, &body))
    }
}

impl RemoteApi for HttpApiClient {
    async fn list(&self, kind: EntityKind) -> ApiResult<Vec<JsonValue>> {
        let response = Self::send(self.request(Method::GET, &kind.collection_path())).await?;
        match response.json::<JsonValue>().await? {
            JsonValue::Array(items) => Ok(items),
            other => Err(ApiError::InvalidPayload(format!(
                "expected a list of {kind}, got {}",
                json_kind(&other)
            ))),
        }
    }

    async fn create(&self, kind: EntityKind, body: &JsonValue) -> ApiResult<i64> {
        let response =
            Self::send(self.request(Method::POST, &kind.collection_path()).json(body)).await?;
        let created = response.json::<JsonValue>().await?;
        created_id(&created)
    }

    async fn update(&self, kind: EntityKind, server_id: i64, body: &JsonValue) -> ApiResult<()> {
        Self::send(
            self.request(Method::PATCH, &kind.item_path(server_id))
                .json(body),
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, kind: EntityKind, server_id: i64) -> ApiResult<()> {
        Self::send(self.request(Method::DELETE, &kind.item_path(server_id))).await?;
        Ok(())
    }

    async fn probe(&self) -> ApiResult<()> {
        Self::send(self.request(Method::GET, "/")).await?;
        Ok(())
    }
}

fn normalize_base_url(raw: String) -> ApiResult<String> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        ApiError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if is_http_url(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(ApiError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ))
    }
}

const fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(HttpApiClient::new("  ").is_err());
        assert!(HttpApiClient::new("api.example.com").is_err());
    }

    #[test]
    fn normalize_base_url_trims_trailing_slash() {
        let client = HttpApiClient::new("https://api.example.com/").unwrap();
        assert_eq!(client.base_url(), "https://api.example.com");
    }

    #[test]
    fn debug_redacts_token() {
        let config = ApiConfig {
            base_url: Some("https://api.example.com".into()),
            token: Some("secret".into()),
            request_timeout_secs: None,
        };
        let client = HttpApiClient::from_config(&config).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_posts_payload_and_returns_server_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/clients/"))
            .and(header("authorization", "Bearer token-1"))
            .and(body_json(json!({"name": "Acme", "email": "a@x.com", "notes": null})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 57, "name": "Acme"})))
            .expect(1)
            .mount(&server)
            .await;

        let config = ApiConfig {
            base_url: Some(server.uri()),
            token: Some("token-1".into()),
            request_timeout_secs: None,
        };
        let client = HttpApiClient::from_config(&config).unwrap();
        let id = client
            .create(
                EntityKind::Clients,
                &json!({"name": "Acme", "email": "a@x.com", "notes": null}),
            )
            .await
            .unwrap();
        assert_eq!(id, 57);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_returns_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/tasks/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "title": "Ship"}])),
            )
            .mount(&server)
            .await;

        let client = HttpApiClient::new(server.uri()).unwrap();
        let items = client.list(EntityKind::Tasks).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["title"], "Ship");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_rejects_non_array_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/notes/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
            .mount(&server)
            .await;

        let client = HttpApiClient::new(server.uri()).unwrap();
        let error = client.list(EntityKind::Notes).await.unwrap_err();
        assert!(matches!(error, ApiError::InvalidPayload(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_errors_carry_detail() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/notes/9"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"detail": "Note not found"})),
            )
            .mount(&server)
            .await;

        let client = HttpApiClient::new(server.uri()).unwrap();
        let error = client.delete(EntityKind::Notes, 9).await.unwrap_err();
        match error {
            ApiError::Status { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Note not found");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_sends_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/tasks/4"))
            .and(body_json(json!({"status": "DONE"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 4})))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpApiClient::new(server.uri()).unwrap();
        client
            .update(EntityKind::Tasks, 4, &json!({"status": "DONE"}))
            .await
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn probe_fails_when_unreachable() {
        let client = HttpApiClient::new("http://127.0.0.1:9").unwrap();
        assert!(client.probe().await.is_err());
    }
}
