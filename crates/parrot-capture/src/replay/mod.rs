//! Replay of completed captures.
//!
//! A completed capture record is reconstructed into an equivalent outbound
//! request, executed once through the transport capability, and its response
//! is classified by content type into the outcome written back onto the
//! record. One replay per record, never re-entered, never retried.
//!
//! # Module Structure
//!
//! - `headers` - Marker header and denylist-based header reconstruction
//! - `transport` - The HTTP execution capability and its reqwest implementation
//! - `engine` - Replay orchestration and response classification

mod engine;
mod headers;
mod transport;

pub use engine::ReplayEngine;
pub use headers::{build_replay_headers, is_excluded_header, EXCLUDED_HEADERS, X_PARROT_REPLAY};
pub use transport::{
    ReplayOptions, ReplayTransport, ReqwestTransport, ResponsePayload, TransportResponse,
};
