//! The HTTP execution capability used by the replay engine.
//!
//! Replay goes through `ReplayTransport` rather than a concrete client so
//! tests can substitute a mock. The production implementation wraps a shared
//! `reqwest` client.

use crate::body::ReplayableBody;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, CACHE_CONTROL};
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

/// Options applied to every replayed request.
#[derive(Debug, Clone, Copy)]
pub struct ReplayOptions {
    /// Send stored cookies with the replay.
    pub include_credentials: bool,
    /// Permit replaying captures whose origin differs from their target.
    pub cross_origin_allowed: bool,
    /// Ask intermediaries not to serve the replay from cache.
    pub cache_bypass: bool,
    /// Follow redirects automatically.
    pub follow_redirects: bool,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            include_credentials: true,
            cross_origin_allowed: true,
            cache_bypass: true,
            follow_redirects: true,
        }
    }
}

/// Response payload as read by the transport. Non-text payloads are never
/// buffered; only their size is reported.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponsePayload {
    Text(String),
    Binary { size_bytes: usize },
}

/// Raw response handed back to the replay engine for classification.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    /// Lowercased header names.
    pub headers: HashMap<String, String>,
    pub payload: ResponsePayload,
}

/// HTTP client capability for replays.
#[async_trait]
pub trait ReplayTransport: Send + Sync {
    async fn execute(
        &self,
        url: &str,
        method: &str,
        headers: HeaderMap,
        body: Option<ReplayableBody>,
        options: &ReplayOptions,
    ) -> Result<TransportResponse, TransportError>;
}

/// Content types the transport reads fully as text; everything else is
/// consumed streaming and reported by size only.
pub(crate) fn is_textual_content_type(content_type: &str) -> bool {
    content_type.contains("application/json")
        || content_type.contains("text/")
        || content_type.contains("application/xml")
        || content_type.contains("application/javascript")
}

/// `reqwest`-backed transport with a shared connection pool.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create the shared replay client. Redirect and cookie behavior are
    /// fixed at construction from the replay options.
    pub fn new(options: &ReplayOptions) -> Result<Self, anyhow::Error> {
        let redirect = if options.follow_redirects {
            Policy::limited(10)
        } else {
            Policy::none()
        };

        let client = reqwest::Client::builder()
            .redirect(redirect)
            .cookie_store(options.include_credentials)
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;

        info!(
            include_credentials = options.include_credentials,
            follow_redirects = options.follow_redirects,
            "replay transport ready"
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl ReplayTransport for ReqwestTransport {
    async fn execute(
        &self,
        url: &str,
        method: &str,
        headers: HeaderMap,
        body: Option<ReplayableBody>,
        options: &ReplayOptions,
    ) -> Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("method '{method}': {e}")))?;

        let mut request = self.client.request(method, url).headers(headers);

        if options.cache_bypass {
            request = request.header(CACHE_CONTROL, "no-cache");
        }

        match body {
            Some(ReplayableBody::Form(fields)) => {
                // The multipart builder sets the content-type and boundary
                // itself; the engine has already removed any captured one.
                let mut form = reqwest::multipart::Form::new();
                for (name, values) in fields {
                    for value in values {
                        form = form.text(name.clone(), value);
                    }
                }
                request = request.multipart(form);
            }
            Some(ReplayableBody::Bytes(bytes)) => {
                request = request.body(bytes);
            }
            Some(ReplayableBody::Text(text)) => {
                request = request.body(text);
            }
            None => {}
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();

        let mut response_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                response_headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let content_type = response_headers
            .get("content-type")
            .cloned()
            .unwrap_or_default();

        let payload = if is_textual_content_type(&content_type) {
            let text = response
                .text()
                .await
                .map_err(|e| TransportError::Body(e.to_string()))?;
            ResponsePayload::Text(text)
        } else {
            // Drain the body streaming so arbitrary binary never sits in
            // memory; only the byte count is kept.
            let mut size_bytes = 0usize;
            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                size_bytes += chunk.map_err(|e| TransportError::Body(e.to_string()))?.len();
            }
            ResponsePayload::Binary { size_bytes }
        };

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text,
            headers: response_headers,
            payload,
        })
    }
}
