//! HTTP client for the observed server.

use std::pin::Pin;

use futures::Stream;
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::errors::{ClientError, Result};
use crate::sse::frame_sse_data;

/// Boxed stream of `data:` payloads from `GET /event`.
pub type EventFrames = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Body of `GET /global/health`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HealthResponse {
    /// Whether the server considers itself healthy.
    pub healthy: bool,
    /// Server version string.
    pub version: String,
}

/// Read-only client for the observed server.
#[derive(Clone, Debug)]
pub struct OpencodeClient {
    base_url: Url,
    http: reqwest::Client,
}

impl OpencodeClient {
    /// Create a client for `base_url` (e.g. `http://127.0.0.1:4096`).
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("periscope/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Self::with_client(base_url, http)
    }

    /// Create a client sharing an existing connection pool.
    pub fn with_client(base_url: &str, http: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() || !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { base_url, http })
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `GET /global/health`
    pub async fn health(&self) -> Result<HealthResponse> {
        self.get_json(&["global", "health"]).await
    }

    /// `GET /session`, returned as raw records.
    pub async fn list_sessions(&self) -> Result<Vec<Value>> {
        self.get_json(&["session"]).await
    }

    /// `GET /session/{id}/message`, returned as raw `{ info, parts }` entries.
    pub async fn session_messages(&self, session_id: &str) -> Result<Vec<Value>> {
        self.get_json(&["session", session_id, "message"]).await
    }

    /// Open `GET /event` and frame the body into `data:` payloads.
    ///
    /// The returned stream ends when the server closes the body. A read
    /// error is yielded once before the stream ends.
    pub async fn event_stream(&self) -> Result<EventFrames> {
        let url = self.endpoint(&["event"])?;
        debug!(%url, "opening event stream");
        let response = self
            .http
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send()
            .await?;
        let response = check_status(response, &url)?;
        Ok(Box::pin(frame_sse_data(Box::pin(response.bytes_stream()))))
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        let url = self.endpoint(segments)?;
        let response = self.http.get(url.clone()).send().await?;
        let response = check_status(response, &url)?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        let _ = url
            .path_segments_mut()
            .map_err(|()| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn check_status(response: reqwest::Response, url: &Url) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
