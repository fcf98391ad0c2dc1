//! Key-management service API client.
//!
//! Wraps the remote HTTP+JSON API with authentication, per-attempt timeouts,
//! bounded retry on transport failures, and a single structured error type.
//! Read operations surface [`ApiError`] so callers can tell "no data" from
//! "the service is down"; write operations fold failures into a
//! [`WriteOutcome`] and log them, giving callers best-effort semantics.

use std::time::Duration;

use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use super::models::{KeyStats, KeysResponse, KeyType};
use super::retry::{run_with_retry, AttemptError, RetryPolicy};

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Error returned by the key-management service, or synthesized for
/// transport failures.
///
/// `status` is the HTTP status for service-level errors and 0 when the
/// request never completed (connection failure after all retries).
#[derive(Debug, Error)]
#[error("API error ({status}): {message}")]
pub struct ApiError {
    /// HTTP status, or 0 for transport failures
    pub status: u16,
    /// Best-effort human-readable message
    pub message: String,
}

impl ApiError {
    /// Creates an error carrying an HTTP status and message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Creates the sentinel error for an exhausted retry budget.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(0, format!("Connection error: {}", message.into()))
    }

    /// True when the request never reached the service.
    pub fn is_transport(&self) -> bool {
        self.status == 0
    }
}

/// Outcome of a write operation against the key service.
///
/// Write operations never propagate errors; the failure, if any, is retained
/// here so callers that care can still distinguish a rejection by the
/// service (`error` with an HTTP status) from a transport problem (`error`
/// with status 0).
#[derive(Debug)]
pub struct WriteOutcome {
    /// Whether the service confirmed the operation with a success marker
    pub accepted: bool,
    /// The failure that prevented acceptance, when one occurred
    pub error: Option<ApiError>,
}

/// Client for the key-management service API.
#[derive(Debug, Clone)]
pub struct KeyApiClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    retry: RetryPolicy,
}

impl KeyApiClient {
    /// Creates a client for the service at `base_url` authenticating with
    /// `api_key`, using the default timeout and retry policy.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Joins the base URL and an endpoint with exactly one separator.
    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Sends a request to the service, retrying transport failures.
    ///
    /// Service-level errors (status >= 400) fail immediately with an
    /// [`ApiError`] carrying the status and the body's `error` field (or the
    /// raw body when it isn't JSON). A success response that isn't JSON is
    /// wrapped as `{"status": "success", "message": <raw text>}`.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = self.endpoint_url(endpoint);
        run_with_retry(&self.retry, || {
            self.attempt(method.clone(), &url, body.as_ref())
        })
        .await
    }

    /// Performs one attempt over a fresh connection.
    async fn attempt(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Value, AttemptError> {
        // Fresh session per attempt: a connection that went bad is not
        // carried into the next try.
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        let mut request = client
            .request(method, url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| AttemptError::Transient(e.to_string()))?;

        match serde_json::from_str::<Value>(&text) {
            Err(_) if status >= 400 => Err(AttemptError::Fatal(ApiError::new(status, text))),
            Err(_) => Ok(json!({ "status": "success", "message": text })),
            Ok(decoded) if status >= 400 => {
                let message = decoded
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error");
                Err(AttemptError::Fatal(ApiError::new(status, message)))
            }
            Ok(decoded) => Ok(decoded),
        }
    }

    /// GETs an endpoint and decodes the response into `T`.
    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let body = self.request(Method::GET, endpoint, None).await?;
        serde_json::from_value(body)
            .map_err(|e| ApiError::new(0, format!("unexpected response shape: {}", e)))
    }

    /// Fetches every key in the inventory.
    pub async fn get_all_keys(&self) -> Result<KeysResponse, ApiError> {
        self.get_json("keys").await
    }

    /// Fetches the keys of one tier.
    pub async fn get_keys_by_type(&self, key_type: KeyType) -> Result<KeysResponse, ApiError> {
        self.get_json(&format!("keys/type/{}", key_type.id())).await
    }

    /// Fetches aggregate inventory statistics.
    pub async fn get_stats(&self) -> Result<KeyStats, ApiError> {
        self.get_json("stats").await
    }

    /// Adds a new key to the inventory.
    pub async fn add_key(&self, value: &str, key_type: KeyType) -> WriteOutcome {
        let body = json!({ "value": value, "type": key_type.id() });
        self.write_request(Method::POST, "keys".to_string(), Some(body), "adding key")
            .await
    }

    /// Marks a key as used by `username`.
    pub async fn mark_key_used(&self, key_id: i64, username: &str) -> WriteOutcome {
        let body = json!({ "discordUsername": username });
        self.write_request(
            Method::PUT,
            format!("keys/{}/use", key_id),
            Some(body),
            "marking key used",
        )
        .await
    }

    /// Returns a key to the available pool.
    pub async fn mark_key_unused(&self, key_id: i64) -> WriteOutcome {
        self.write_request(
            Method::PUT,
            format!("keys/{}/unuse", key_id),
            None,
            "marking key unused",
        )
        .await
    }

    /// Issues a write and folds the result into a [`WriteOutcome`],
    /// logging failures instead of propagating them.
    async fn write_request(
        &self,
        method: Method,
        endpoint: String,
        body: Option<Value>,
        action: &str,
    ) -> WriteOutcome {
        match self.request(method, &endpoint, body).await {
            Ok(response) => {
                let accepted = response.get("status").and_then(Value::as_str) == Some("success");
                if !accepted {
                    warn!("service did not confirm {}: {}", action, response);
                }
                WriteOutcome {
                    accepted,
                    error: None,
                }
            }
            Err(err) => {
                error!("error {}: {}", action, err);
                WriteOutcome {
                    accepted: false,
                    error: Some(err),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_uses_exactly_one_separator() {
        let plain = KeyApiClient::new("http://localhost:9000", "k");
        assert_eq!(plain.endpoint_url("keys"), "http://localhost:9000/keys");
        assert_eq!(plain.endpoint_url("/keys"), "http://localhost:9000/keys");

        let trailing = KeyApiClient::new("http://localhost:9000/", "k");
        assert_eq!(trailing.endpoint_url("keys"), "http://localhost:9000/keys");
        assert_eq!(trailing.endpoint_url("/keys"), "http://localhost:9000/keys");
    }

    #[test]
    fn test_api_error_display_includes_status_and_message() {
        let err = ApiError::new(404, "not found");
        assert_eq!(err.to_string(), "API error (404): not found");
        assert!(!err.is_transport());
    }

    #[test]
    fn test_connection_error_uses_status_sentinel_zero() {
        let err = ApiError::connection("dns failure");
        assert_eq!(err.status, 0);
        assert!(err.is_transport());
        assert!(err.message.contains("dns failure"));
    }
}
