//! The id-to-record store behind the capture correlator.

use super::clock::Clock;
use super::record::{CaptureRecord, CaptureSource, OriginalResponse, RecordState, ReplayOutcome};
use crate::body::{extract_for_replay, normalize, NormalizedBody, RawBody, ReplayableBody};
use crate::config::RetentionPolicy;
use crate::counters::Counters;
use crate::error::CorrelatorError;
use crate::metrics;
use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Keyed store mapping a request id to its accumulating capture record.
///
/// Events for one id are applied in arrival order by the engine's single
/// consumer loop; replay tasks touch only their own record's outcome. The
/// sweep snapshots expired ids before deleting, so concurrent inserts never
/// invalidate iteration.
pub struct Correlator {
    records: RwLock<HashMap<String, CaptureRecord>>,
    counters: Arc<Counters>,
    clock: Arc<dyn Clock>,
    retention: RetentionPolicy,
}

impl Correlator {
    pub fn new(counters: Arc<Counters>, clock: Arc<dyn Clock>, retention: RetentionPolicy) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            counters,
            clock,
            retention,
        }
    }

    /// Generate a fresh request id for captures that arrive without one
    /// (page-relay events): capture timestamp plus a random suffix.
    pub fn generate_id(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(8)
            .map(char::from)
            .collect();
        format!("{}-{}", self.clock.now_ms(), suffix)
    }

    /// Create the record for a newly observed request.
    ///
    /// Rejects silent overwrite of an in-flight record: the event sources
    /// guarantee fresh ids in practice, but a duplicate must surface rather
    /// than clobber.
    pub fn begin(
        &self,
        id: &str,
        url: &str,
        method: &str,
        source: CaptureSource,
        raw_body: Option<&RawBody>,
        timestamp_ms: u64,
    ) -> Result<(), CorrelatorError> {
        let mut records = self.records.write();
        if records.contains_key(id) {
            metrics::record_ignored_event("duplicate_id");
            return Err(CorrelatorError::DuplicateId(id.to_string()));
        }

        let mut record = CaptureRecord::new(id, url, method, source, timestamp_ms);
        if let Some(raw) = raw_body {
            record.body = Some(normalize(raw));
            record.replay_body = extract_for_replay(raw);
        }
        records.insert(id.to_string(), record);
        drop(records);

        self.counters.record_observed();
        metrics::record_request_observed(source.as_str());
        debug!(id, url, method, source = source.as_str(), "capture started");
        Ok(())
    }

    /// Merge a header set into an existing record. A header event may race
    /// ahead of or behind the defining request event from a different
    /// channel, so an unknown id is a logged no-op, never buffered.
    pub fn attach_headers(&self, id: &str, headers: &[(String, String)]) {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) => {
                record.merge_headers(headers.iter().map(|(n, v)| (n.as_str(), v.as_str())));
                debug!(id, count = headers.len(), "headers attached");
            }
            None => {
                metrics::record_ignored_event("unknown_id");
                debug!(id, "header event for unknown capture id, ignoring");
            }
        }
    }

    /// Set the body fields. Idempotent for equal content; an unequal second
    /// attach overwrites (last write wins).
    pub fn attach_body(
        &self,
        id: &str,
        normalized: NormalizedBody,
        replayable: Option<ReplayableBody>,
    ) {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) => {
                if record.body.as_ref() == Some(&normalized) {
                    debug!(id, "identical body already attached");
                    return;
                }
                if record.body.is_some() {
                    debug!(id, "replacing previously attached body");
                }
                record.body = Some(normalized);
                record.replay_body = replayable;
            }
            None => {
                metrics::record_ignored_event("unknown_id");
                debug!(id, "body event for unknown capture id, ignoring");
            }
        }
    }

    /// Record the original response's status and headers for parity logging.
    pub fn attach_original_response(
        &self,
        id: &str,
        status: u16,
        status_line: &str,
        headers: HashMap<String, String>,
    ) {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) => {
                debug!(id, status, status_line, "original response observed");
                record.original_response = Some(OriginalResponse {
                    status,
                    status_line: status_line.to_string(),
                    headers,
                });
            }
            None => {
                metrics::record_ignored_event("unknown_id");
                debug!(id, "response headers for unknown capture id, ignoring");
            }
        }
    }

    /// Mark the record ready for replay and return a snapshot of it.
    pub fn complete(&self, id: &str) -> Result<CaptureRecord, CorrelatorError> {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) => {
                record.state = RecordState::Completed;
                Ok(record.clone())
            }
            None => {
                metrics::record_ignored_event("unknown_id");
                Err(CorrelatorError::NotFound(id.to_string()))
            }
        }
    }

    /// Write a replay outcome back onto the record and apply the retention
    /// policy.
    pub fn record_outcome(&self, id: &str, outcome: ReplayOutcome) {
        let mut records = self.records.write();
        match self.retention {
            RetentionPolicy::Purge => {
                if records.remove(id).is_some() {
                    debug!(id, "record purged after replay");
                } else {
                    // Swept while the replay was in flight.
                    debug!(id, "replay outcome for unknown capture id, dropping");
                }
            }
            RetentionPolicy::Retain => match records.get_mut(id) {
                Some(record) => {
                    record.replay = Some(outcome);
                    record.state = RecordState::Replayed;
                }
                None => debug!(id, "replay outcome for unknown capture id, dropping"),
            },
        }
    }

    /// Mark the original request as errored and remove it from the active
    /// set.
    pub fn fail(&self, id: &str, error: &str) {
        let removed = self.records.write().remove(id);
        match removed {
            Some(record) => warn!(id, url = %record.url, error, "capture errored"),
            None => debug!(id, "error event for unknown capture id, ignoring"),
        }
    }

    /// Remove records older than the horizon. Returns how many were purged.
    pub fn sweep(&self, max_age_ms: u64) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<String> = {
            let records = self.records.read();
            records
                .iter()
                .filter(|(_, record)| record.age_ms(now) > max_age_ms)
                .map(|(id, _)| id.clone())
                .collect()
        };

        if expired.is_empty() {
            return 0;
        }

        let mut records = self.records.write();
        let mut removed = 0;
        for id in &expired {
            if records.remove(id).is_some() {
                removed += 1;
            }
        }
        drop(records);

        info!(removed, "swept expired capture records");
        removed
    }

    /// Snapshot a record for inspection.
    pub fn get(&self, id: &str) -> Option<CaptureRecord> {
        self.records.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Clock the tests can move by hand.
    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn new(start_ms: u64) -> Self {
            Self(AtomicU64::new(start_ms))
        }

        fn advance(&self, delta_ms: u64) {
            self.0.fetch_add(delta_ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn correlator_with_clock(clock: Arc<ManualClock>) -> Correlator {
        Correlator::new(Arc::new(Counters::new()), clock, RetentionPolicy::Retain)
    }

    fn correlator() -> Correlator {
        correlator_with_clock(Arc::new(ManualClock::new(1_000)))
    }

    #[test]
    fn test_begin_creates_record_and_counts() {
        let counters = Arc::new(Counters::new());
        let correlator = Correlator::new(
            Arc::clone(&counters),
            Arc::new(ManualClock::new(0)),
            RetentionPolicy::Retain,
        );

        correlator
            .begin(
                "r1",
                "https://api.example.com/items",
                "POST",
                CaptureSource::NetworkIntercept,
                None,
                42,
            )
            .unwrap();

        let record = correlator.get("r1").unwrap();
        assert_eq!(record.url, "https://api.example.com/items");
        assert_eq!(record.method, "POST");
        assert_eq!(record.created_at_ms, 42);
        assert_eq!(record.state, RecordState::Pending);
        assert_eq!(counters.snapshot().requests_observed, 1);
    }

    #[test]
    fn test_begin_rejects_duplicate_id() {
        let correlator = correlator();
        correlator
            .begin("r1", "https://a.example.com", "GET", CaptureSource::PageXhr, None, 0)
            .unwrap();

        let err = correlator
            .begin("r1", "https://b.example.com", "GET", CaptureSource::PageXhr, None, 0)
            .unwrap_err();
        assert_eq!(err, CorrelatorError::DuplicateId("r1".to_string()));

        // The original record survives untouched.
        assert_eq!(correlator.get("r1").unwrap().url, "https://a.example.com");
    }

    #[test]
    fn test_begin_normalizes_initial_body() {
        let correlator = correlator();
        let raw = RawBody::Text(r#"{"a": 1}"#.to_string());
        correlator
            .begin(
                "r1",
                "https://api.example.com",
                "POST",
                CaptureSource::NetworkIntercept,
                Some(&raw),
                0,
            )
            .unwrap();

        let record = correlator.get("r1").unwrap();
        assert_eq!(
            record.body,
            Some(NormalizedBody::Json { value: json!({"a": 1}) })
        );
        assert_eq!(
            record.replay_body,
            Some(ReplayableBody::Text(r#"{"a": 1}"#.to_string()))
        );
    }

    #[test]
    fn test_attach_headers_twice_is_idempotent() {
        let correlator = correlator();
        correlator
            .begin("r1", "https://api.example.com", "GET", CaptureSource::PageFetch, None, 0)
            .unwrap();

        let headers = vec![
            ("Accept".to_string(), "application/json".to_string()),
            ("X-Custom".to_string(), "1".to_string()),
        ];
        correlator.attach_headers("r1", &headers);
        let once = correlator.get("r1").unwrap().headers;

        correlator.attach_headers("r1", &headers);
        let twice = correlator.get("r1").unwrap().headers;

        assert_eq!(once, twice);
        assert_eq!(twice.get("accept").map(String::as_str), Some("application/json"));
    }

    #[test]
    fn test_attach_headers_unknown_id_is_a_noop() {
        let correlator = correlator();
        correlator.attach_headers(
            "missing",
            &[("Accept".to_string(), "*/*".to_string())],
        );
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_attach_body_last_write_wins() {
        let correlator = correlator();
        correlator
            .begin("r1", "https://api.example.com", "POST", CaptureSource::PageXhr, None, 0)
            .unwrap();

        correlator.attach_body(
            "r1",
            NormalizedBody::Text { value: "one".to_string() },
            Some(ReplayableBody::Text("one".to_string())),
        );
        correlator.attach_body(
            "r1",
            NormalizedBody::Text { value: "two".to_string() },
            Some(ReplayableBody::Text("two".to_string())),
        );

        assert_eq!(
            correlator.get("r1").unwrap().body,
            Some(NormalizedBody::Text { value: "two".to_string() })
        );
    }

    #[test]
    fn test_complete_unknown_id_fails() {
        let correlator = correlator();
        assert_eq!(
            correlator.complete("missing").unwrap_err(),
            CorrelatorError::NotFound("missing".to_string())
        );
    }

    #[test]
    fn test_fail_removes_record() {
        let correlator = correlator();
        correlator
            .begin("r1", "https://api.example.com", "GET", CaptureSource::NetworkIntercept, None, 0)
            .unwrap();
        correlator.fail("r1", "net::ERR_CONNECTION_RESET");
        assert!(correlator.get("r1").is_none());
    }

    #[test]
    fn test_outcome_retained_until_sweep() {
        let correlator = correlator();
        correlator
            .begin("r1", "https://api.example.com", "GET", CaptureSource::NetworkIntercept, None, 1_000)
            .unwrap();
        correlator.complete("r1").unwrap();
        correlator.record_outcome(
            "r1",
            ReplayOutcome { status: Some(200), ..Default::default() },
        );

        let record = correlator.get("r1").unwrap();
        assert_eq!(record.state, RecordState::Replayed);
        assert_eq!(record.replay.as_ref().and_then(|o| o.status), Some(200));
    }

    #[test]
    fn test_outcome_purged_immediately_when_configured() {
        let correlator = Correlator::new(
            Arc::new(Counters::new()),
            Arc::new(ManualClock::new(0)),
            RetentionPolicy::Purge,
        );
        correlator
            .begin("r1", "https://api.example.com", "GET", CaptureSource::NetworkIntercept, None, 0)
            .unwrap();
        correlator.complete("r1").unwrap();
        correlator.record_outcome(
            "r1",
            ReplayOutcome { status: Some(200), ..Default::default() },
        );
        assert!(correlator.get("r1").is_none());
    }

    #[test]
    fn test_sweep_boundary_around_horizon() {
        const HORIZON_MS: u64 = 3_600_000;
        let clock = Arc::new(ManualClock::new(10_000));
        let correlator = correlator_with_clock(Arc::clone(&clock));

        correlator
            .begin(
                "r1",
                "https://api.example.com",
                "GET",
                CaptureSource::NetworkIntercept,
                None,
                clock.now_ms(),
            )
            .unwrap();

        // Just inside the horizon: record survives.
        clock.advance(HORIZON_MS - 1);
        assert_eq!(correlator.sweep(HORIZON_MS), 0);
        assert!(correlator.get("r1").is_some());

        // Just past it: record is purged regardless of replay state.
        clock.advance(2);
        assert_eq!(correlator.sweep(HORIZON_MS), 1);
        assert!(correlator.get("r1").is_none());
    }

    #[test]
    fn test_sweep_leaves_fresh_records() {
        let clock = Arc::new(ManualClock::new(0));
        let correlator = correlator_with_clock(Arc::clone(&clock));

        correlator
            .begin("old", "https://a.example.com", "GET", CaptureSource::PageXhr, None, 0)
            .unwrap();
        clock.advance(5_000);
        correlator
            .begin("new", "https://b.example.com", "GET", CaptureSource::PageXhr, None, clock.now_ms())
            .unwrap();

        assert_eq!(correlator.sweep(4_000), 1);
        assert!(correlator.get("old").is_none());
        assert!(correlator.get("new").is_some());
    }

    #[test]
    fn test_generated_ids_carry_timestamp_prefix() {
        let correlator = correlator_with_clock(Arc::new(ManualClock::new(1_700_000_000_000)));
        let id = correlator.generate_id();
        assert!(id.starts_with("1700000000000-"));
        assert_ne!(correlator.generate_id(), id);
    }
}
