//! Self-traffic detection.
//!
//! Replay re-issues captured requests through the same interception surface
//! that produced them. Without this filter every replay would itself be
//! captured and replayed, amplifying without bound. The replay engine injects
//! a marker header into every outbound replay (see `replay::headers`) so the
//! filter recognizes replays deterministically even when origin and tab
//! signals are unavailable.

use std::collections::HashMap;
use tracing::debug;

/// Sentinel tab id for requests with no associated page context.
pub const NO_TAB_CONTEXT: i64 = -1;

/// Decides whether an observed request originated from the capture system
/// itself.
#[derive(Debug, Clone)]
pub struct SelfTrafficFilter {
    own_origin: String,
    marker_header: String,
}

impl SelfTrafficFilter {
    pub fn new(own_origin: impl Into<String>, marker_header: impl Into<String>) -> Self {
        Self {
            own_origin: own_origin.into(),
            marker_header: marker_header.into(),
        }
    }

    /// Decision policy, evaluated in order, short-circuiting on first match:
    /// own-origin initiator, own-origin URL, replay marker (header or token
    /// in the URL), absent page context.
    pub fn is_self_originated(
        &self,
        url: &str,
        initiator: Option<&str>,
        tab_id: Option<i64>,
        headers: &HashMap<String, String>,
    ) -> bool {
        if let Some(initiator) = initiator {
            if initiator.starts_with(&self.own_origin) {
                debug!(initiator, "self-originated request (initiator)");
                return true;
            }
        }

        if url.starts_with(&self.own_origin) {
            debug!(url, "self-originated request (url)");
            return true;
        }

        let marked = headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case(&self.marker_header))
            || url.contains(&self.marker_header);
        if marked {
            debug!(url, "self-originated request (replay marker)");
            return true;
        }

        match tab_id {
            None | Some(NO_TAB_CONTEXT) => {
                debug!(url, "request without page context, treating as self");
                true
            }
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "ext://parrot-3f9c";
    const MARKER: &str = "x-parrot-replay";

    fn filter() -> SelfTrafficFilter {
        SelfTrafficFilter::new(ORIGIN, MARKER)
    }

    #[test]
    fn test_own_origin_initiator_is_self() {
        let headers = HashMap::new();
        assert!(filter().is_self_originated(
            "https://api.example.com/items",
            Some("ext://parrot-3f9c/background"),
            Some(7),
            &headers,
        ));
    }

    #[test]
    fn test_own_origin_url_is_self() {
        let headers = HashMap::new();
        assert!(filter().is_self_originated(
            "ext://parrot-3f9c/resources/page.html",
            None,
            Some(7),
            &headers,
        ));
    }

    #[test]
    fn test_marker_header_is_self() {
        let mut headers = HashMap::new();
        headers.insert("X-Parrot-Replay".to_string(), "ext://parrot-3f9c".to_string());
        assert!(filter().is_self_originated(
            "https://api.example.com/items",
            Some("https://app.example.com"),
            Some(7),
            &headers,
        ));
    }

    #[test]
    fn test_marker_token_in_url_is_self() {
        let headers = HashMap::new();
        assert!(filter().is_self_originated(
            "https://api.example.com/items?via=x-parrot-replay",
            Some("https://app.example.com"),
            Some(7),
            &headers,
        ));
    }

    #[test]
    fn test_absent_page_context_is_self() {
        let headers = HashMap::new();
        assert!(filter().is_self_originated(
            "https://api.example.com/items",
            Some("https://app.example.com"),
            Some(NO_TAB_CONTEXT),
            &headers,
        ));
        assert!(filter().is_self_originated(
            "https://api.example.com/items",
            Some("https://app.example.com"),
            None,
            &headers,
        ));
    }

    #[test]
    fn test_ordinary_third_party_request_is_not_self() {
        let headers = HashMap::new();
        assert!(!filter().is_self_originated(
            "https://api.example.com/items",
            Some("https://app.example.com"),
            Some(7),
            &headers,
        ));
    }
}
