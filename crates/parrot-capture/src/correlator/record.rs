//! Capture record and replay outcome types.

use crate::body::{NormalizedBody, ReplayableBody};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a capture was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CaptureSource {
    /// Network-layer interception events.
    NetworkIntercept,
    /// In-page `XMLHttpRequest` patch, relayed over the message channel.
    PageXhr,
    /// In-page `fetch` patch, relayed over the message channel.
    PageFetch,
}

impl CaptureSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureSource::NetworkIntercept => "network-intercept",
            CaptureSource::PageXhr => "page-xhr",
            CaptureSource::PageFetch => "page-fetch",
        }
    }
}

/// Lifecycle state of a capture record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// Events still arriving; the defining completion event has not fired.
    Pending,
    /// Ready for replay.
    Completed,
    /// Replay finished and the outcome is attached.
    Replayed,
}

/// Status and headers of the *original* response, as reported by the capture
/// source. Informational parity record alongside the replayed response;
/// replay correctness never depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalResponse {
    pub status: u16,
    pub status_line: String,
    pub headers: HashMap<String, String>,
}

/// Outcome of replaying a captured request.
///
/// `status` and `error` are mutually exclusive: a transport failure carries
/// no status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<NormalizedBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReplayOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One observed request, assembled incrementally from capture events.
#[derive(Debug, Clone)]
pub struct CaptureRecord {
    pub id: String,
    pub url: String,
    pub method: String,
    /// Header names are stored lowercased; last write wins per name.
    pub headers: HashMap<String, String>,
    pub body: Option<NormalizedBody>,
    pub replay_body: Option<ReplayableBody>,
    pub source: CaptureSource,
    pub created_at_ms: u64,
    pub original_response: Option<OriginalResponse>,
    pub replay: Option<ReplayOutcome>,
    pub state: RecordState,
}

impl CaptureRecord {
    pub fn new(
        id: impl Into<String>,
        url: impl Into<String>,
        method: impl Into<String>,
        source: CaptureSource,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            method: method.into(),
            headers: HashMap::new(),
            body: None,
            replay_body: None,
            source,
            created_at_ms,
            original_response: None,
            replay: None,
            state: RecordState::Pending,
        }
    }

    /// Merge a header set into the record; last write wins per
    /// (case-insensitive) name.
    pub fn merge_headers<'a, I>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in headers {
            self.headers
                .insert(name.to_ascii_lowercase(), value.to_string());
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_at_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_headers_is_case_insensitive_last_write_wins() {
        let mut record = CaptureRecord::new(
            "r1",
            "https://api.example.com",
            "GET",
            CaptureSource::NetworkIntercept,
            0,
        );

        record.merge_headers([("Content-Type", "text/plain")]);
        record.merge_headers([("content-type", "application/json")]);

        assert_eq!(record.headers.len(), 1);
        assert_eq!(
            record.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[test]
    fn test_age_saturates_for_clock_skew() {
        let record = CaptureRecord::new(
            "r1",
            "https://api.example.com",
            "GET",
            CaptureSource::PageFetch,
            1_000,
        );
        assert_eq!(record.age_ms(500), 0);
        assert_eq!(record.age_ms(4_000), 3_000);
    }

    #[test]
    fn test_outcome_success_flag() {
        let ok = ReplayOutcome {
            status: Some(200),
            ..Default::default()
        };
        assert!(ok.is_success());

        let failed = ReplayOutcome {
            error: Some("connection refused".to_string()),
            ..Default::default()
        };
        assert!(!failed.is_success());
    }
}
