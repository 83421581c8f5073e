//! Replay orchestration: reconstruct, execute, classify.

use super::headers::build_replay_headers;
use super::transport::{ReplayOptions, ReplayTransport, ResponsePayload, TransportResponse};
use crate::body::{NormalizedBody, ReplayableBody};
use crate::correlator::{CaptureRecord, ReplayOutcome};
use crate::counters::Counters;
use crate::error::TransportError;
use crate::metrics;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Executes a single replay attempt per completed capture record.
///
/// Failures are reported in the outcome and counted, never propagated: one
/// failed replay must not block subsequent captures or replays.
pub struct ReplayEngine {
    transport: Arc<dyn ReplayTransport>,
    options: ReplayOptions,
    marker_header: String,
    marker_value: String,
    counters: Arc<Counters>,
}

impl ReplayEngine {
    pub fn new(
        transport: Arc<dyn ReplayTransport>,
        options: ReplayOptions,
        marker_header: impl Into<String>,
        marker_value: impl Into<String>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            transport,
            options,
            marker_header: marker_header.into(),
            marker_value: marker_value.into(),
            counters,
        }
    }

    /// Replay a completed capture. Single attempt, no automatic retry.
    pub async fn replay(&self, record: &CaptureRecord) -> ReplayOutcome {
        self.counters.record_replay_attempt();
        let start = Instant::now();

        let outcome = match self.execute(record).await {
            Ok(outcome) => {
                self.counters.record_replay_success();
                metrics::record_replay_outcome(true);
                info!(
                    id = %record.id,
                    url = %record.url,
                    status = outcome.status,
                    "replay completed"
                );
                outcome
            }
            Err(err) => {
                self.counters.record_replay_failure();
                metrics::record_replay_outcome(false);
                warn!(id = %record.id, url = %record.url, error = %err, "replay failed");
                ReplayOutcome {
                    error: Some(err.to_string()),
                    ..Default::default()
                }
            }
        };

        metrics::record_replay_duration(&record.method, start.elapsed().as_millis() as f64);
        outcome
    }

    async fn execute(&self, record: &CaptureRecord) -> Result<ReplayOutcome, TransportError> {
        if !self.options.cross_origin_allowed && is_cross_origin(record) {
            return Err(TransportError::Policy(format!(
                "cross-origin replay disabled for {}",
                record.url
            )));
        }

        let mut headers =
            build_replay_headers(&record.headers, &self.marker_header, &self.marker_value);

        match &record.replay_body {
            // The transport's multipart builder must set its own boundary.
            Some(ReplayableBody::Form(_)) => {
                headers.remove(CONTENT_TYPE);
            }
            Some(_) => {
                let json_classified = record.body.as_ref().is_some_and(NormalizedBody::is_json);
                if json_classified && !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                    debug!(id = %record.id, "defaulted content-type to application/json");
                }
            }
            None => {}
        }

        let response = self
            .transport
            .execute(
                &record.url,
                &record.method,
                headers,
                record.replay_body.clone(),
                &self.options,
            )
            .await?;

        Ok(ReplayOutcome {
            status: Some(response.status),
            status_text: response.status_text.clone(),
            headers: response.headers.clone(),
            body: Some(classify_response(&response)),
            error: None,
        })
    }
}

/// Classify the replayed response body by its declared content type:
/// JSON is parsed (demoting to text on failure), other textual types stay
/// text, everything else is size-only binary.
fn classify_response(response: &TransportResponse) -> NormalizedBody {
    let content_type = response
        .headers
        .get("content-type")
        .map(String::as_str)
        .unwrap_or_default();

    match &response.payload {
        ResponsePayload::Binary { size_bytes } => NormalizedBody::Binary {
            size_bytes: *size_bytes,
        },
        ResponsePayload::Text(text) => {
            if content_type.contains("application/json") {
                match serde_json::from_str(text) {
                    Ok(value) => NormalizedBody::Json { value },
                    Err(_) => NormalizedBody::Text { value: text.clone() },
                }
            } else {
                NormalizedBody::Text { value: text.clone() }
            }
        }
    }
}

/// A capture is cross-origin when the `Origin` header it carried names a
/// different scheme+host than its target URL. Captures without an `Origin`
/// header are treated as same-origin.
fn is_cross_origin(record: &CaptureRecord) -> bool {
    let Some(origin_header) = record.headers.get("origin") else {
        return false;
    };
    match (origin_of(&record.url), origin_of(origin_header)) {
        (Some(target), Some(origin)) => !target.eq_ignore_ascii_case(origin),
        _ => false,
    }
}

/// Scheme + authority prefix of a URL, e.g. `https://api.example.com:8443`.
fn origin_of(url: &str) -> Option<&str> {
    let scheme_end = url.find("://")?;
    let authority_start = scheme_end + 3;
    let authority_end = url[authority_start..]
        .find(['/', '?', '#'])
        .map(|i| authority_start + i)
        .unwrap_or(url.len());
    Some(&url[..authority_end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::CaptureSource;
    use serde_json::json;
    use std::collections::HashMap;

    fn record_with_origin(url: &str, origin: Option<&str>) -> CaptureRecord {
        let mut record = CaptureRecord::new("r1", url, "POST", CaptureSource::PageFetch, 0);
        if let Some(origin) = origin {
            record.headers.insert("origin".to_string(), origin.to_string());
        }
        record
    }

    #[test]
    fn test_origin_extraction() {
        assert_eq!(
            origin_of("https://api.example.com/items?a=1"),
            Some("https://api.example.com")
        );
        assert_eq!(
            origin_of("https://api.example.com:8443/items"),
            Some("https://api.example.com:8443")
        );
        assert_eq!(origin_of("https://api.example.com"), Some("https://api.example.com"));
        assert_eq!(origin_of("not a url"), None);
    }

    #[test]
    fn test_cross_origin_detection() {
        assert!(is_cross_origin(&record_with_origin(
            "https://api.example.com/items",
            Some("https://app.example.com"),
        )));
        assert!(!is_cross_origin(&record_with_origin(
            "https://api.example.com/items",
            Some("https://api.example.com"),
        )));
        assert!(!is_cross_origin(&record_with_origin(
            "https://api.example.com/items",
            None,
        )));
    }

    #[test]
    fn test_classify_json_response() {
        let response = TransportResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::from([(
                "content-type".to_string(),
                "application/json; charset=utf-8".to_string(),
            )]),
            payload: ResponsePayload::Text(r#"{"id": 7}"#.to_string()),
        };
        assert_eq!(
            classify_response(&response),
            NormalizedBody::Json { value: json!({"id": 7}) }
        );
    }

    #[test]
    fn test_classify_invalid_json_demotes_to_text() {
        let response = TransportResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::from([("content-type".to_string(), "application/json".to_string())]),
            payload: ResponsePayload::Text("not json".to_string()),
        };
        assert_eq!(
            classify_response(&response),
            NormalizedBody::Text { value: "not json".to_string() }
        );
    }

    #[test]
    fn test_classify_binary_keeps_size_only() {
        let response = TransportResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: HashMap::from([("content-type".to_string(), "image/png".to_string())]),
            payload: ResponsePayload::Binary { size_bytes: 4096 },
        };
        assert_eq!(
            classify_response(&response),
            NormalizedBody::Binary { size_bytes: 4096 }
        );
    }
}
