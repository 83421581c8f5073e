//! Request/response body classification and replay reconstruction.
//!
//! `normalize` produces the display-oriented classification used for logging
//! and inspection. `extract_for_replay` produces the literal payload that is
//! re-sent on replay. The two are deliberately separate: replay needs the
//! exact wire bytes/encoding, not a human-readable view.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A raw request body as delivered by a capture source.
#[derive(Debug, Clone, PartialEq)]
pub enum RawBody {
    /// Pre-parsed form data. Field order and repeated names are preserved.
    Form(Vec<(String, Vec<String>)>),
    /// Raw byte payload from network-layer interception.
    Bytes(Bytes),
    /// String payload.
    Text(String),
    /// Already-decoded structured payload (page-patch captures).
    Value(Value),
    /// Binary payload observed by the page side, which only reports its size
    /// over the relay. Not replayable.
    Opaque { size_bytes: usize },
    /// Anything the capture source could not represent, stringified.
    Other(String),
}

/// Content-classified body representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NormalizedBody {
    Form { fields: Vec<(String, Vec<String>)> },
    Json { value: Value },
    Text { value: String },
    /// Payload is not retained, only its size. Keeps arbitrary binary out of
    /// memory and logs.
    Binary { size_bytes: usize },
    Unknown { raw: String },
}

impl NormalizedBody {
    pub fn is_json(&self) -> bool {
        matches!(self, NormalizedBody::Json { .. })
    }
}

/// The literal re-sendable payload, distinct from the display classification.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayableBody {
    /// Rebuilt as a multipart form container at send time.
    Form(Vec<(String, Vec<String>)>),
    /// Raw wire bytes passed through unchanged.
    Bytes(Bytes),
    /// String payload sent verbatim.
    Text(String),
}

/// Classify a raw body. Total: classification failures demote, never error.
///
/// Classification is content-based, not header-based: raw bytes and strings
/// are tentatively parsed as JSON first, and parse failure demotes to text.
pub fn normalize(raw: &RawBody) -> NormalizedBody {
    match raw {
        RawBody::Form(fields) => NormalizedBody::Form {
            fields: fields.clone(),
        },
        RawBody::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => classify_text(text),
            Err(_) => NormalizedBody::Binary {
                size_bytes: bytes.len(),
            },
        },
        RawBody::Text(text) => classify_text(text),
        RawBody::Value(value) => NormalizedBody::Json {
            value: value.clone(),
        },
        RawBody::Opaque { size_bytes } => NormalizedBody::Binary {
            size_bytes: *size_bytes,
        },
        RawBody::Other(raw) => NormalizedBody::Unknown { raw: raw.clone() },
    }
}

fn classify_text(text: &str) -> NormalizedBody {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => NormalizedBody::Json { value },
        Err(_) => NormalizedBody::Text {
            value: text.to_string(),
        },
    }
}

/// Reconstruct the literal payload for replay.
///
/// Returns `None` when the capture source could not deliver usable wire data
/// (binary observed only by size, unrepresentable inputs).
pub fn extract_for_replay(raw: &RawBody) -> Option<ReplayableBody> {
    match raw {
        RawBody::Form(fields) => Some(ReplayableBody::Form(fields.clone())),
        RawBody::Bytes(bytes) => Some(ReplayableBody::Bytes(bytes.clone())),
        RawBody::Text(text) => Some(ReplayableBody::Text(text.clone())),
        RawBody::Value(value) => Some(ReplayableBody::Text(value.to_string())),
        RawBody::Opaque { .. } | RawBody::Other(_) => None,
    }
}
