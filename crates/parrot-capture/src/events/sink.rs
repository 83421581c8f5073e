//! Capability interface for network-layer interception events.
//!
//! The hosting runtime's network-event subscription mechanism calls these
//! methods; the sink never assumes it is co-located with the thing it
//! observes. Self-originated requests are dropped here, before the
//! correlator ever sees them.

use super::CaptureEvent;
use crate::body::RawBody;
use crate::correlator::CaptureSource;
use crate::filter::SelfTrafficFilter;
use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Metadata of a newly initiated request, as reported by the interceptor.
#[derive(Debug)]
pub struct RequestStart {
    pub id: String,
    pub url: String,
    pub method: String,
    pub source: CaptureSource,
    /// URL of whatever initiated the request, when the interceptor knows it.
    pub initiator: Option<String>,
    /// Page context identifier; `None` or the sentinel `-1` means the
    /// request has no associated page.
    pub tab_id: Option<i64>,
    pub raw_body: Option<RawBody>,
    pub timestamp_ms: u64,
}

/// Ingress for network-layer interception events.
#[derive(Clone)]
pub struct InterceptSink {
    filter: Arc<SelfTrafficFilter>,
    tx: UnboundedSender<CaptureEvent>,
}

impl InterceptSink {
    pub(crate) fn new(filter: Arc<SelfTrafficFilter>, tx: UnboundedSender<CaptureEvent>) -> Self {
        Self { filter, tx }
    }

    pub fn on_request_initiated(&self, start: RequestStart) {
        // Headers are not known yet at this point; the filter works from the
        // origin and tab signals alone here.
        let no_headers = HashMap::new();
        if self.filter.is_self_originated(
            &start.url,
            start.initiator.as_deref(),
            start.tab_id,
            &no_headers,
        ) {
            metrics::record_self_filtered("network");
            debug!(url = %start.url, "dropping self-originated request");
            return;
        }

        self.send(CaptureEvent::RequestInitiated {
            id: start.id,
            url: start.url,
            method: start.method,
            source: start.source,
            raw_body: start.raw_body,
            timestamp_ms: start.timestamp_ms,
        });
    }

    pub fn on_request_headers_sent(&self, id: &str, headers: Vec<(String, String)>) {
        self.send(CaptureEvent::RequestHeadersSent {
            id: id.to_string(),
            headers,
        });
    }

    pub fn on_response_headers_received(
        &self,
        id: &str,
        status: u16,
        status_line: &str,
        headers: Vec<(String, String)>,
    ) {
        self.send(CaptureEvent::ResponseHeadersReceived {
            id: id.to_string(),
            status,
            status_line: status_line.to_string(),
            headers,
        });
    }

    pub fn on_request_completed(&self, id: &str, status: u16) {
        self.send(CaptureEvent::RequestCompleted {
            id: id.to_string(),
            status,
        });
    }

    pub fn on_request_errored(&self, id: &str, error: &str) {
        self.send(CaptureEvent::RequestErrored {
            id: id.to_string(),
            error: error.to_string(),
        });
    }

    fn send(&self, event: CaptureEvent) {
        if self.tx.send(event).is_err() {
            warn!("capture engine is not running, event dropped");
        }
    }
}
