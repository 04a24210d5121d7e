//! The single network primitive adapters depend on.
//!
//! Adapters never touch `reqwest` directly; they build an [`HttpRequest`] and
//! hand it to an [`HttpClient`]. Production code uses [`ReqwestClient`];
//! tests substitute a scripted client and inspect the recorded requests.
//!
//! ## Why return non-2xx as `Ok`?
//!
//! Each backend reports errors in its own body shape, and the vision
//! rejection heuristics need that body. The client therefore only fails when
//! no response arrived at all; status interpretation belongs to the adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Pdf2MdError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// POST with a JSON body and `Content-Type: application/json`.
    pub fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self::post_json_text(url, body.to_string())
    }

    /// Like [`HttpRequest::post_json`] for a body that is already serialised.
    pub fn post_json_text(url: impl Into<String>, body: String) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: Some(body),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parsed request body, for tests and debug logging.
    pub fn json_body(&self) -> Option<serde_json::Value> {
        self.body.as_deref().and_then(|b| serde_json::from_str(b).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self, provider: &str) -> Result<T, Pdf2MdError> {
        serde_json::from_str(&self.body).map_err(|e| Pdf2MdError::MalformedResponse {
            provider: provider.to_string(),
            detail: format!("invalid JSON: {e}"),
        })
    }
}

/// Sends one request and returns whatever status came back.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Pdf2MdError>;
}

/// `reqwest`-backed client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    inner: reqwest::Client,
}

/// Local vision models can take minutes per page.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

impl ReqwestClient {
    pub fn new() -> Result<Self, Pdf2MdError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, Pdf2MdError> {
        let inner = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Pdf2MdError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { inner })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, Pdf2MdError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = match method {
            HttpMethod::Get => self.inner.get(&url),
            HttpMethod::Post => self.inner.post(&url),
        };
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        debug!(?method, %url, "HTTP request");

        let transport = |e: reqwest::Error| {
            let detail = if e.is_timeout() {
                format!("timed out: {e}")
            } else {
                e.to_string()
            };
            Pdf2MdError::Transport {
                url: url.clone(),
                detail,
                connection_refused: e.is_connect(),
            }
        };

        let response = builder.send().await.map_err(transport)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport)?;

        debug!(status, bytes = body.len(), %url, "HTTP response");
        Ok(HttpResponse { status, body })
    }
}
