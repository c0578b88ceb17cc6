//! HTTP client for the remote function-as-a-service delivery endpoints.

use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::SendError;

/// How the function key travels: `code` query parameter or
/// `x-functions-key` header. Configuration-selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Query,
    Header,
}

impl AuthMode {
    pub fn parse(mode: &str) -> Self {
        match mode.to_ascii_lowercase().as_str() {
            "header" => AuthMode::Header,
            "query" => AuthMode::Query,
            other => {
                warn!(mode = %other, "Unknown function auth mode, falling back to query");
                AuthMode::Query
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionResponse {
    pub status: u16,
    pub latency_ms: u64,
    pub body: Value,
}

/// One remote function endpoint (base URL + route + key).
pub struct FunctionEndpoint {
    client: Client,
    base_url: String,
    path: String,
    api_key: String,
    auth_mode: AuthMode,
}

impl FunctionEndpoint {
    pub fn new(
        base_url: &str,
        path: &str,
        api_key: &str,
        auth_mode: AuthMode,
        timeout_ms: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            path: path.to_string(),
            api_key: api_key.to_string(),
            auth_mode,
        }
    }

    pub fn url(&self) -> String {
        format!("{}{}", self.base_url, self.path)
    }

    /// POST the payload and capture the upstream status and latency.
    /// Non-2xx responses become `SendError::Upstream`.
    pub async fn post(&self, payload: &Value) -> Result<FunctionResponse, SendError> {
        let url = self.url();

        debug!(
            url = %url,
            has_api_key = !self.api_key.is_empty(),
            auth_mode = ?self.auth_mode,
            "Calling remote function"
        );

        let mut request = self.client.post(&url).json(payload);

        if !self.api_key.is_empty() {
            request = match self.auth_mode {
                AuthMode::Query => request.query(&[("code", self.api_key.as_str())]),
                AuthMode::Header => request.header("x-functions-key", self.api_key.as_str()),
            };
        }

        let started = Instant::now();
        let response = request.send().await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            return Err(SendError::Upstream {
                status: status.as_u16(),
                body: text,
            });
        }

        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        Ok(FunctionResponse {
            status: status.as_u16(),
            latency_ms,
            body,
        })
    }
}
