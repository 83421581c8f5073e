//! Message bridge for captures originating from in-page API patching.
//!
//! The page side patches `XMLHttpRequest` and `fetch`, and forwards each
//! observed call over a message channel as `{ action, payload }`. The bridge
//! decodes those messages into capture events and acknowledges each
//! delivery. Delivery or decode failures are logged and dropped; the
//! original page request is never affected.

use super::CaptureEvent;
use crate::body::RawBody;
use crate::correlator::{CaptureSource, Clock, Correlator};
use crate::error::RelayError;
use crate::filter::SelfTrafficFilter;
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Inbound relay message from the page side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayMessage {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

/// Acknowledgement returned for each relay delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayAck {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RelayAck {
    fn accepted(request_id: Option<String>) -> Self {
        Self {
            accepted: true,
            request_id,
            reason: None,
        }
    }

    fn rejected(reason: &str) -> Self {
        Self {
            accepted: false,
            request_id: None,
            reason: Some(reason.to_string()),
        }
    }
}

/// The send primitive the page-side adapter uses to reach the correlator.
/// Implementations must tolerate the receiving side being transiently
/// unavailable; callers log delivery failures and carry on.
#[async_trait]
pub trait PageRelay: Send + Sync {
    async fn send_to_correlator(&self, action: &str, payload: Value)
        -> Result<RelayAck, RelayError>;
}

/// Core-side endpoint of the page relay.
#[derive(Clone)]
pub struct RelayEndpoint {
    filter: Arc<SelfTrafficFilter>,
    tx: UnboundedSender<CaptureEvent>,
    correlator: Arc<Correlator>,
    clock: Arc<dyn Clock>,
}

impl RelayEndpoint {
    pub(crate) fn new(
        filter: Arc<SelfTrafficFilter>,
        tx: UnboundedSender<CaptureEvent>,
        correlator: Arc<Correlator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            filter,
            tx,
            correlator,
            clock,
        }
    }

    fn handle_log_request(&self, payload: Value) -> Result<RelayAck, RelayError> {
        let request: RelayRequest =
            serde_json::from_value(payload).map_err(|e| RelayError::Decode(e.to_string()))?;

        if self.filter.is_self_originated(
            &request.url,
            request.initiator.as_deref(),
            request.tab_id,
            &request.headers,
        ) {
            metrics::record_self_filtered("relay");
            debug!(url = %request.url, "dropping self-originated page capture");
            return Ok(RelayAck::rejected("self_originated"));
        }

        let id = self.correlator.generate_id();
        let raw_body = request.body.map(decode_relay_body);
        let timestamp_ms = request.timestamp.unwrap_or_else(|| self.clock.now_ms());
        let headers: Vec<(String, String)> = request.headers.into_iter().collect();

        self.deliver(CaptureEvent::RequestInitiated {
            id: id.clone(),
            url: request.url,
            method: request.method,
            source: request.source,
            raw_body,
            timestamp_ms,
        })?;
        if !headers.is_empty() {
            self.deliver(CaptureEvent::RequestHeadersSent {
                id: id.clone(),
                headers,
            })?;
        }
        // The page side has already seen the request go out by the time it
        // relays it, so the capture is complete on arrival.
        self.deliver(CaptureEvent::RequestCompleted {
            id: id.clone(),
            status: 0,
        })?;

        Ok(RelayAck::accepted(Some(id)))
    }

    fn handle_log_response(&self, payload: Value) -> Result<RelayAck, RelayError> {
        let response: RelayResponse =
            serde_json::from_value(payload).map_err(|e| RelayError::Decode(e.to_string()))?;

        // Parity log of the original response; replay correctness never
        // depends on it, and the page side cannot name a correlator id.
        let headers = response.resolved_headers();
        info!(
            url = %response.url,
            status = response.status,
            status_text = %response.status_text,
            header_count = headers.len(),
            source = %response.source,
            "original response observed via page relay"
        );
        Ok(RelayAck::accepted(None))
    }

    fn deliver(&self, event: CaptureEvent) -> Result<(), RelayError> {
        self.tx
            .send(event)
            .map_err(|_| RelayError::Delivery("capture engine is not running".to_string()))
    }
}

#[async_trait]
impl PageRelay for RelayEndpoint {
    async fn send_to_correlator(
        &self,
        action: &str,
        payload: Value,
    ) -> Result<RelayAck, RelayError> {
        let result = match action {
            "logRequest" => self.handle_log_request(payload),
            "logResponse" => self.handle_log_response(payload),
            other => Err(RelayError::UnknownAction(other.to_string())),
        };

        if let Err(err) = &result {
            metrics::record_ignored_event("relay_decode");
            warn!(action, error = %err, "relay message dropped");
        }
        result
    }
}

/// Wire shape of a relayed `logRequest` payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayRequest {
    url: String,
    method: String,
    #[serde(default)]
    headers: HashMap<String, String>,
    #[serde(default)]
    body: Option<RelayBody>,
    #[serde(default)]
    timestamp: Option<u64>,
    #[serde(default = "default_relay_source", deserialize_with = "deserialize_source")]
    source: CaptureSource,
    #[serde(default)]
    initiator: Option<String>,
    #[serde(default)]
    tab_id: Option<i64>,
}

fn default_relay_source() -> CaptureSource {
    CaptureSource::PageXhr
}

fn deserialize_source<'de, D>(deserializer: D) -> Result<CaptureSource, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let tag = String::deserialize(deserializer)?;
    Ok(match tag.as_str() {
        "fetch" => CaptureSource::PageFetch,
        _ => CaptureSource::PageXhr,
    })
}

/// Wire shape of a relayed body: a tag plus either content or a size.
#[derive(Debug, Deserialize)]
struct RelayBody {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    size: Option<usize>,
}

fn decode_relay_body(body: RelayBody) -> RawBody {
    match body.kind.as_str() {
        "formData" => {
            let mut fields = Vec::new();
            if let Some(Value::Object(map)) = body.content {
                for (name, value) in map {
                    let values = match value {
                        Value::Array(items) => {
                            items.iter().map(stringify_form_value).collect()
                        }
                        other => vec![stringify_form_value(&other)],
                    };
                    fields.push((name, values));
                }
            }
            RawBody::Form(fields)
        }
        "json" | "object" => RawBody::Value(body.content.unwrap_or(Value::Null)),
        "text" => match body.content {
            Some(Value::String(text)) => RawBody::Text(text),
            Some(other) => RawBody::Text(other.to_string()),
            None => RawBody::Text(String::new()),
        },
        "blob" | "arrayBuffer" | "binary" => RawBody::Opaque {
            size_bytes: body.size.unwrap_or(0),
        },
        _ => RawBody::Other(
            body.content
                .map(|c| c.to_string())
                .unwrap_or_else(|| body.kind.clone()),
        ),
    }
}

fn stringify_form_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Wire shape of a relayed `logResponse` payload. XHR captures deliver
/// headers as the raw `getAllResponseHeaders` string; fetch captures deliver
/// a map.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayResponse {
    url: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    status_text: String,
    #[serde(default)]
    headers: Option<HashMap<String, String>>,
    #[serde(default)]
    response_headers: Option<String>,
    #[serde(default = "default_source_tag")]
    source: String,
}

fn default_source_tag() -> String {
    "unknown".to_string()
}

impl RelayResponse {
    fn resolved_headers(&self) -> HashMap<String, String> {
        if let Some(headers) = &self.headers {
            return headers.clone();
        }
        self.response_headers
            .as_deref()
            .map(parse_raw_headers)
            .unwrap_or_default()
    }
}

/// Parse a raw `name: value\r\n` header block into a map with lowercased
/// names.
fn parse_raw_headers(raw: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in raw.split("\r\n") {
        if let Some((name, value)) = line.split_once(": ") {
            if !name.is_empty() {
                headers.insert(name.to_ascii_lowercase(), value.to_string());
            }
        }
    }
    headers
}
