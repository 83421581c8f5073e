//! Error types for the capture/replay pipeline.
//!
//! Every error here is contained to the request it belongs to: nothing in
//! this crate is fatal to the process, and no failure in one capture may
//! affect another.

use thiserror::Error;

/// Errors raised by the capture correlator.
///
/// `NotFound` is expected under normal raciness (events for one request
/// arrive over two independent channels); callers log it and move on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CorrelatorError {
    #[error("capture id {0} already has an in-flight record")]
    DuplicateId(String),
    #[error("no capture record for id {0}")]
    NotFound(String),
}

/// Errors raised by the replay transport.
///
/// Captured into `ReplayOutcome::error` and counted; never propagated as a
/// crash.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("invalid request construction: {0}")]
    InvalidRequest(String),
    #[error("failed to read response body: {0}")]
    Body(String),
    #[error("replay blocked by policy: {0}")]
    Policy(String),
}

/// Errors raised by the page-relay bridge.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The receiving side of the relay is unavailable. The original capture
    /// is unaffected.
    #[error("relay delivery failed: {0}")]
    Delivery(String),
    #[error("unrecognized relay action: {0}")]
    UnknownAction(String),
    #[error("malformed relay payload: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlator_error_display() {
        let err = CorrelatorError::DuplicateId("r1".to_string());
        assert_eq!(err.to_string(), "capture id r1 already has an in-flight record");

        let err = CorrelatorError::NotFound("r2".to_string());
        assert_eq!(err.to_string(), "no capture record for id r2");
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Connection("connection refused".to_string());
        assert!(err.to_string().contains("connection refused"));
    }
}
