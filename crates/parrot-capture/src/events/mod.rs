//! Capture event messages and the source adapters that produce them.
//!
//! Capture events are discrete messages tagged with a request id, delivered
//! to the correlator through a single ingestion queue and processed one at a
//! time in arrival order. Two adapters feed the queue: the network-layer
//! interception sink, and the page-relay bridge for in-page API-patch
//! captures. Both apply the self-traffic filter at ingress, so a
//! self-originated request is dropped before the correlator ever sees it.
//!
//! # Module Structure
//!
//! - `sink` - Capability interface for network-layer interception events
//! - `relay` - Message bridge for page-context captures

mod relay;
mod sink;

pub use relay::{PageRelay, RelayAck, RelayEndpoint, RelayMessage};
pub use sink::{InterceptSink, RequestStart};

use crate::body::RawBody;
use crate::correlator::CaptureSource;

/// One capture event, tagged with the request id it belongs to.
#[derive(Debug)]
pub enum CaptureEvent {
    RequestInitiated {
        id: String,
        url: String,
        method: String,
        source: CaptureSource,
        raw_body: Option<RawBody>,
        timestamp_ms: u64,
    },
    RequestHeadersSent {
        id: String,
        headers: Vec<(String, String)>,
    },
    ResponseHeadersReceived {
        id: String,
        status: u16,
        status_line: String,
        headers: Vec<(String, String)>,
    },
    RequestCompleted {
        id: String,
        status: u16,
    },
    RequestErrored {
        id: String,
        error: String,
    },
}
