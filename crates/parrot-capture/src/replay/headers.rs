//! Header reconstruction for replayed requests.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::HashMap;
use tracing::debug;

/// Default marker header appended to every replayed request. The
/// self-traffic filter keys on it, so replays are recognizable even when
/// origin and tab signals are unavailable.
pub static X_PARROT_REPLAY: HeaderName = HeaderName::from_static("x-parrot-replay");

/// Hop-by-hop and origin-revealing headers never copied onto a replay: their
/// captured values would be wrong at replay time or would trigger
/// cross-origin rejection.
pub static EXCLUDED_HEADERS: &[&str] =
    &["host", "origin", "referer", "sec-fetch-mode", "sec-fetch-site"];

pub fn is_excluded_header(name: &str) -> bool {
    EXCLUDED_HEADERS
        .iter()
        .any(|excluded| name.eq_ignore_ascii_case(excluded))
}

/// Build the outbound header map: captured headers minus the denylist, plus
/// the self-identifying marker header.
pub fn build_replay_headers(
    captured: &HashMap<String, String>,
    marker_name: &str,
    marker_value: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in captured {
        if is_excluded_header(name) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => debug!(name = %name, "captured header not representable, skipping"),
        }
    }

    if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(marker_name.as_bytes()),
        HeaderValue::from_str(marker_value),
    ) {
        headers.insert(name, value);
    }

    headers
}
