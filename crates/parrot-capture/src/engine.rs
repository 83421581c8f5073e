//! The per-process capture engine.
//!
//! `CaptureEngine` owns the correlator, counters, replay engine, and the
//! single-consumer ingestion loop. It is constructed once per process and
//! handed to the event source adapters by reference; there is no hidden
//! global state.

use crate::config::Config;
use crate::correlator::{CaptureRecord, Clock, Correlator, SystemClock};
use crate::counters::Counters;
use crate::events::{CaptureEvent, InterceptSink, RelayEndpoint};
use crate::filter::SelfTrafficFilter;
use crate::replay::{ReplayEngine, ReplayTransport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

pub struct CaptureEngine {
    sweep_interval: Duration,
    max_age_ms: u64,
    correlator: Arc<Correlator>,
    counters: Arc<Counters>,
    filter: Arc<SelfTrafficFilter>,
    replayer: Arc<ReplayEngine>,
    clock: Arc<dyn Clock>,
    tx: UnboundedSender<CaptureEvent>,
    rx: UnboundedReceiver<CaptureEvent>,
}

impl CaptureEngine {
    /// Create an engine with the wall clock.
    pub fn new(config: Config, transport: Arc<dyn ReplayTransport>) -> Self {
        Self::with_clock(config, transport, Arc::new(SystemClock))
    }

    /// Create an engine with an injected clock (used by tests to drive the
    /// sweep).
    pub fn with_clock(
        config: Config,
        transport: Arc<dyn ReplayTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let counters = Arc::new(Counters::new());
        let correlator = Arc::new(Correlator::new(
            Arc::clone(&counters),
            Arc::clone(&clock),
            config.replay.retention,
        ));
        let filter = Arc::new(SelfTrafficFilter::new(
            config.self_origin.clone(),
            config.marker_header.clone(),
        ));
        let replayer = Arc::new(ReplayEngine::new(
            transport,
            config.replay_options(),
            config.marker_header.clone(),
            config.self_origin.clone(),
            Arc::clone(&counters),
        ));
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            sweep_interval: Duration::from_secs(config.sweep.interval_secs),
            max_age_ms: config.sweep.max_age_secs * 1_000,
            correlator,
            counters,
            filter,
            replayer,
            clock,
            tx,
            rx,
        }
    }

    /// Handle for the network-layer interception adapter.
    pub fn sink(&self) -> InterceptSink {
        InterceptSink::new(Arc::clone(&self.filter), self.tx.clone())
    }

    /// Handle for the page-relay bridge.
    pub fn relay_endpoint(&self) -> RelayEndpoint {
        RelayEndpoint::new(
            Arc::clone(&self.filter),
            self.tx.clone(),
            Arc::clone(&self.correlator),
            Arc::clone(&self.clock),
        )
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    pub fn correlator(&self) -> Arc<Correlator> {
        Arc::clone(&self.correlator)
    }

    /// Run the ingestion loop until every sink and relay handle is dropped.
    ///
    /// Events are consumed one at a time, so events for a single request id
    /// are applied in arrival order; replay tasks are spawned independently
    /// and race freely against each other.
    pub async fn run(self) {
        let Self {
            sweep_interval,
            max_age_ms,
            correlator,
            counters,
            replayer,
            tx,
            mut rx,
            ..
        } = self;

        info!(
            sweep_interval_secs = sweep_interval.as_secs(),
            max_age_ms, "capture engine running"
        );

        // The engine holds its own sender; close it so the loop can observe
        // the last external handle going away.
        drop(tx);

        let start = tokio::time::Instant::now() + sweep_interval;
        let mut sweep = tokio::time::interval_at(start, sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => handle_event(&correlator, &replayer, event),
                    None => {
                        info!(counters = ?counters.snapshot(), "all capture sources disconnected, stopping");
                        break;
                    }
                },
                _ = sweep.tick() => {
                    correlator.sweep(max_age_ms);
                    debug!(counters = ?counters.snapshot(), "sweep tick");
                }
            }
        }
    }
}

fn handle_event(correlator: &Arc<Correlator>, replayer: &Arc<ReplayEngine>, event: CaptureEvent) {
    match event {
        CaptureEvent::RequestInitiated {
            id,
            url,
            method,
            source,
            raw_body,
            timestamp_ms,
        } => {
            if let Err(err) =
                correlator.begin(&id, &url, &method, source, raw_body.as_ref(), timestamp_ms)
            {
                warn!(error = %err, "ignoring capture event");
            }
        }
        CaptureEvent::RequestHeadersSent { id, headers } => {
            correlator.attach_headers(&id, &headers);
        }
        CaptureEvent::ResponseHeadersReceived {
            id,
            status,
            status_line,
            headers,
        } => {
            correlator.attach_original_response(
                &id,
                status,
                &status_line,
                headers.into_iter().collect(),
            );
        }
        CaptureEvent::RequestCompleted { id, status } => {
            debug!(id = %id, status, "request completed, scheduling replay");
            match correlator.complete(&id) {
                Ok(record) => spawn_replay(correlator, replayer, record),
                Err(err) => debug!(error = %err, "completion for unknown capture id"),
            }
        }
        CaptureEvent::RequestErrored { id, error } => {
            correlator.fail(&id, &error);
        }
    }
}

/// Spawn the single replay task for a completed record. Each record is
/// replayed at most once and the task owns its record's outcome until it
/// finishes.
fn spawn_replay(correlator: &Arc<Correlator>, replayer: &Arc<ReplayEngine>, record: CaptureRecord) {
    let replayer = Arc::clone(replayer);
    let correlator = Arc::clone(correlator);
    tokio::spawn(async move {
        let outcome = replayer.replay(&record).await;
        correlator.record_outcome(&record.id, outcome);
    });
}
