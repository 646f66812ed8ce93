//! Authenticated REST transport against the tracker.
//!
//! One shared `reqwest::Client` with a fixed 10-second timeout; every
//! response is folded into the crate's error taxonomy so callers above
//! never see a raw `reqwest::Error`.

use std::time::Duration;

use serde_json::Value;

use crate::error::{MantisError, Result};

/// Fixed per-request timeout. Not configurable: the tracker's slow queries
/// are bounded by pagination, so anything longer is a stuck connection.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin wrapper exposing `get`/`post`/`patch` against a fixed base URL.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl RestClient {
    /// Builds the client for `base_url`, attaching `api_token` as the raw
    /// `Authorization` header value on every request when present.
    pub fn new(base_url: &str, api_token: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MantisError::validation(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.map(str::to_string),
        })
    }

    /// GET `{base}{path}`, with query parameters when any are given.
    pub async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value> {
        let mut request = self.http.get(self.url(path));
        if !query.is_empty() {
            request = request.query(query);
        }
        self.execute(request).await
    }

    /// POST `{base}{path}` with a JSON body.
    pub async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.execute(self.http.post(self.url(path)).json(body)).await
    }

    /// PATCH `{base}{path}` with a JSON body.
    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value> {
        self.execute(self.http.patch(self.url(path)).json(body))
            .await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let mut request = request;
        if let Some(token) = &self.api_token {
            request = request.header("Authorization", token);
        }
        let response = request.send().await.map_err(map_send_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_send_error)?;
        if !status.is_success() {
            tracing::debug!(
                target: "mantis::http",
                status = status.as_u16(),
                "tracker returned error status"
            );
            return Err(MantisError::Api {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Ok(Value::Null);
        }
        // The tracker speaks JSON; a non-JSON 2xx body is handed through as
        // a string rather than rejected.
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(_) => Ok(Value::String(text)),
        }
    }
}

/// Maps a send-side `reqwest` failure onto the taxonomy: builder problems
/// never left the process, everything else is a missing response.
pub(crate) fn map_send_error(e: reqwest::Error) -> MantisError {
    if e.is_builder() {
        MantisError::validation(e.to_string())
    } else {
        MantisError::transport(e.to_string())
    }
}
