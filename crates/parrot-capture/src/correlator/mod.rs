//! Capture correlation: reconciling independently-arriving events into one
//! record per observed request.
//!
//! Events for a request arrive out of order and from different channels
//! (network-layer interception vs. page-script relay). The correlator is a
//! keyed store that merges them by request id, applies events in arrival
//! order, and bounds memory with an age-based sweep.
//!
//! # Module Structure
//!
//! - `clock` - Injected millisecond clock
//! - `record` - Capture record and outcome types
//! - `store` - The id-to-record store

mod clock;
mod record;
mod store;

pub use clock::{Clock, SystemClock};
pub use record::{
    CaptureRecord, CaptureSource, OriginalResponse, RecordState, ReplayOutcome,
};
pub use store::Correlator;
