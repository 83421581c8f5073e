//! Parrot: HTTP request capture, correlation, and replay.
//!
//! Parrot observes outbound HTTP(S) requests made by a running page or
//! client, assembles the independently-arriving events for each request into
//! one capture record, and deterministically replays completed captures
//! through a pluggable transport while classifying the replayed response.
//!
//! The engine is fed by two kinds of event source: a network-layer
//! interception adapter (`events::InterceptSink`) and a page-script relay
//! for `XMLHttpRequest`/`fetch` patch captures (`events::RelayEndpoint`).
//! Its own replay traffic is excluded at ingress by the self-traffic filter,
//! which breaks the capture-replay feedback loop.

pub mod body;
pub mod config;
pub mod correlator;
pub mod counters;
pub mod engine;
pub mod error;
pub mod events;
pub mod filter;
pub mod metrics;
pub mod replay;

pub use config::Config;
pub use engine::CaptureEngine;
