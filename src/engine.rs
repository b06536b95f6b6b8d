//! Ingestion engine
//!
//! [`IngestionEngine`] owns all mutable session state: the statistics
//! aggregator, the sample buffer and the connection state machine. Lines from
//! the read loop go through [`FrameParser`] and are applied to the session
//! under one lock, so a snapshot never sees half a batch.
//!
//! ```rust,no_run
//! use adc_monitor::{IngestionEngine, MonitorConfig, AlwaysGranted, Snapshot, SnapshotSink};
//! use adc_monitor::transports::TcpTransport;
//!
//! struct Printer;
//!
//! impl SnapshotSink for Printer {
//!     fn on_snapshot(&self, snapshot: &Snapshot) {
//!         println!("{} samples, mean {:?}", snapshot.samples.len(), snapshot.stats.session_mean);
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> adc_monitor::Result<()> {
//! let engine = IngestionEngine::new(MonitorConfig::default(), TcpTransport, AlwaysGranted)?;
//! let _subscription = engine.subscribe(Printer);
//! engine.connect("192.168.4.1:3333").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tracing::{debug, trace, warn};

use crate::buffer::SampleBuffer;
use crate::connection::{ConnectionStateMachine, LinkTimeouts};
use crate::driver::LineSink;
use crate::error::ParseError;
use crate::parser::FrameParser;
use crate::publisher::{self, Snapshot, SnapshotSink, Subscription};
use crate::stats::{DerivedStats, SessionStats, StatisticsAggregator};
use crate::transport::{PermissionGate, TransportFactory};
use crate::types::{Batch, ConnectionState, EventKind, LogEvent, Severity};
use crate::{EventBus, MonitorConfig, Result};

/// Statistics and buffer for one session, always mutated together.
#[derive(Debug)]
struct Session {
    aggregator: StatisticsAggregator,
    buffer: SampleBuffer,
    latest: DerivedStats,
}

impl Session {
    fn new(capacity: usize) -> Self {
        Self {
            aggregator: StatisticsAggregator::new(),
            buffer: SampleBuffer::new(capacity),
            latest: DerivedStats::default(),
        }
    }

    fn apply(&mut self, batch: &Batch) -> DerivedStats {
        let derived = self.aggregator.update(batch, batch.received_at());
        self.buffer.append(batch.readings());
        self.latest = derived;
        derived
    }

    fn clear(&mut self) {
        self.aggregator.reset();
        self.buffer.clear();
        self.latest = DerivedStats::default();
    }
}

/// State shared between the engine, its read loop and its publishers.
struct EngineCore {
    session: Mutex<Session>,
    events: EventBus,
    reset_on_connect: bool,
}

impl EngineCore {
    fn ingest_line(&self, line: &str, received_at: Instant) -> Result<DerivedStats, ParseError> {
        let batch = match FrameParser::parse(line, received_at) {
            Ok(batch) => batch,
            Err(ParseError::Empty) => {
                self.events.emit(
                    Severity::Warning,
                    EventKind::FrameRejected(ParseError::Empty),
                    "Empty packet ignored",
                );
                return Err(ParseError::Empty);
            }
            Err(e) => {
                self.events.emit(
                    Severity::Error,
                    EventKind::FrameRejected(e.clone()),
                    format!("Invalid JSON packet: {e}"),
                );
                return Err(e);
            }
        };

        let derived = self.session.lock().apply(&batch);

        self.events.emit(
            Severity::Data,
            EventKind::Packet { number: derived.packets_received, samples: batch.len() },
            format!(
                "Packet #{}: {} samples, Last: {:.3}V, Range: {:.3}V",
                derived.packets_received,
                batch.len(),
                batch.last(),
                derived.packet_range.unwrap_or_default(),
            ),
        );
        Ok(derived)
    }

    fn clear(&self, message: &str) {
        self.session.lock().clear();
        self.events.emit(Severity::Info, EventKind::Cleared, message);
    }
}

impl LineSink for EngineCore {
    fn on_connected(&self) {
        if self.reset_on_connect {
            self.clear("Session reset for new connection");
        }
    }

    fn on_line(&self, line: &str, received_at: Instant) {
        if line.trim().is_empty() {
            trace!("Skipping blank line");
            return;
        }
        // Rejected frames are already reported as log events
        let _ = self.ingest_line(line, received_at);
    }
}

/// Synchronized read access to the session plus the connection state.
#[derive(Clone)]
pub struct SnapshotHandle {
    core: Arc<EngineCore>,
    state: watch::Receiver<ConnectionState>,
}

impl SnapshotHandle {
    /// Copy the session atomically with respect to batch ingestion.
    pub fn snapshot(&self) -> Snapshot {
        let session = self.core.session.lock();
        Snapshot {
            stats: session.latest,
            samples: session.buffer.snapshot(),
            state: *self.state.borrow(),
        }
    }
}

/// Ingestion pipeline: connection lifecycle, decoding, statistics, buffering
/// and publication.
pub struct IngestionEngine {
    core: Arc<EngineCore>,
    connection: ConnectionStateMachine,
    config: MonitorConfig,
}

impl IngestionEngine {
    /// Build an engine; nothing is spawned until `connect` or `subscribe`.
    pub fn new<F, G>(config: MonitorConfig, factory: F, gate: G) -> Result<Self>
    where
        F: TransportFactory,
        G: PermissionGate,
    {
        config.validate()?;

        let events = EventBus::new(config.event_capacity);
        let core = Arc::new(EngineCore {
            session: Mutex::new(Session::new(config.buffer_capacity)),
            events: events.clone(),
            reset_on_connect: config.reset_on_connect,
        });

        let timeouts = LinkTimeouts {
            connect: config.connect_timeout(),
            disconnect: config.disconnect_timeout(),
        };
        let connection = ConnectionStateMachine::new(
            Arc::new(factory),
            Arc::new(gate),
            Arc::clone(&core) as Arc<dyn LineSink>,
            events,
            timeouts,
        );

        debug!(
            capacity = config.buffer_capacity,
            publish_interval_ms = config.publish_interval_ms,
            reset_on_connect = config.reset_on_connect,
            "Ingestion engine created"
        );
        Ok(Self { core, connection, config })
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Start connecting to `target`; see [`ConnectionStateMachine::connect`].
    pub async fn connect(&self, target: &str) -> Result<()> {
        self.connection.connect(target).await
    }

    /// Connect to the configured default device.
    pub async fn connect_default(&self) -> Result<()> {
        self.connection.connect(&self.config.device).await
    }

    /// Stop the read loop; see [`ConnectionStateMachine::disconnect`].
    pub async fn disconnect(&self) -> Result<()> {
        self.connection.disconnect().await
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Target of the current link; see [`ConnectionStateMachine::target`].
    pub async fn target(&self) -> Option<String> {
        self.connection.target().await
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.connection.state_changes()
    }

    /// Reset statistics and buffer together, as one operation.
    pub fn clear(&self) {
        self.core.clear("Plot cleared");
    }

    /// Decode and apply one line as if it came from the transport.
    ///
    /// Rejected lines leave the session untouched and raise one log event.
    pub fn ingest_line(&self, line: &str, received_at: Instant) -> Result<DerivedStats, ParseError> {
        self.core.ingest_line(line, received_at)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_handle().snapshot()
    }

    /// Copy of the raw session accumulators.
    pub fn session_stats(&self) -> SessionStats {
        self.core.session.lock().aggregator.stats().clone()
    }

    /// Index the next ingested reading will receive.
    pub fn next_index(&self) -> u64 {
        self.core.session.lock().buffer.next_index()
    }

    pub fn snapshot_handle(&self) -> SnapshotHandle {
        SnapshotHandle { core: Arc::clone(&self.core), state: self.connection.state_changes() }
    }

    /// Raw receiver for log events emitted from now on.
    pub fn event_receiver(&self) -> broadcast::Receiver<LogEvent> {
        self.core.events.subscribe()
    }

    /// Log events emitted from now on, as a stream.
    pub fn log_events(&self) -> impl Stream<Item = LogEvent> + 'static {
        BroadcastStream::new(self.core.events.subscribe()).filter_map(|event| async move {
            match event {
                Ok(event) => Some(event),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Log event stream lagged");
                    None
                }
            }
        })
    }

    /// Snapshots at the configured cadence, regardless of arrival rate.
    ///
    /// Must be called from within a tokio runtime.
    pub fn snapshots(&self) -> impl Stream<Item = Snapshot> + 'static {
        let handle = self.snapshot_handle();
        let mut ticker = interval(self.config.publish_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        IntervalStream::new(ticker).map(move |_| handle.snapshot())
    }

    /// Spawn a publisher that feeds `sink` snapshots at the configured cadence
    /// and forwards every log event.
    pub fn subscribe<S: SnapshotSink>(&self, sink: S) -> Subscription {
        publisher::spawn(
            self.snapshot_handle(),
            self.core.events.subscribe(),
            sink,
            self.config.publish_interval(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingSink, ScriptedTransport, drain_events};
    use crate::transport::AlwaysGranted;
    use std::time::Duration;

    fn engine_with(config: MonitorConfig) -> IngestionEngine {
        IngestionEngine::new(config, ScriptedTransport::new(vec![]), AlwaysGranted).unwrap()
    }

    fn engine() -> IngestionEngine {
        engine_with(MonitorConfig::default())
    }

    #[test]
    fn first_batch_scenario() {
        let engine = engine();
        let derived = engine.ingest_line(r#"{"samples":[1.0,2.0,3.0]}"#, Instant::now()).unwrap();

        assert_eq!(derived.packets_received, 1);
        assert_eq!(derived.samples_received, 3);
        assert_eq!(derived.last_value, Some(3.0));
        assert_eq!(derived.packet_range, Some(2.0));
        assert_eq!(derived.session_mean, Some(2.0));
        assert_eq!(derived.session_min, Some(1.0));
        assert_eq!(derived.session_max, Some(3.0));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.stats, derived);
        assert_eq!(snapshot.samples.len(), 3);
        assert_eq!(snapshot.state, ConnectionState::Disconnected);
    }

    #[test]
    fn second_batch_reports_rate() {
        let engine = engine();
        let t0 = Instant::now();
        engine.ingest_line(r#"{"samples":[1.0,2.0,3.0]}"#, t0).unwrap();

        let derived = engine
            .ingest_line(
                r#"{"samples":[0.1,0.2,0.3,0.4,0.5]}"#,
                t0 + Duration::from_millis(500),
            )
            .unwrap();

        assert!((derived.instantaneous_rate - 10.0).abs() < 1e-9);
    }

    #[test]
    fn malformed_line_changes_nothing_and_logs_once() {
        let engine = engine();
        engine.ingest_line(r#"{"samples":[1.0,2.0,3.0]}"#, Instant::now()).unwrap();
        let before = engine.snapshot();
        let stats_before = engine.session_stats();
        let mut events = engine.event_receiver();

        let err = engine.ingest_line("not-json", Instant::now()).unwrap_err();

        assert!(matches!(err, ParseError::Malformed { .. }));
        assert_eq!(engine.snapshot(), before);
        assert_eq!(engine.session_stats(), stats_before);

        let emitted = drain_events(&mut events);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].severity, Severity::Error);
        assert!(matches!(
            emitted[0].kind,
            EventKind::FrameRejected(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn empty_frame_is_a_warning_no_op() {
        let engine = engine();
        let mut events = engine.event_receiver();

        assert_eq!(
            engine.ingest_line(r#"{"samples":[]}"#, Instant::now()),
            Err(ParseError::Empty)
        );

        assert_eq!(engine.session_stats(), SessionStats::default());
        let emitted = drain_events(&mut events);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].severity, Severity::Warning);
    }

    #[test]
    fn accepted_frames_log_a_packet_summary() {
        let engine = engine();
        let mut events = engine.event_receiver();

        engine.ingest_line(r#"{"samples":[1.0,1.25]}"#, Instant::now()).unwrap();

        let emitted = drain_events(&mut events);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].kind, EventKind::Packet { number: 1, samples: 2 });
        assert_eq!(emitted[0].message, "Packet #1: 2 samples, Last: 1.250V, Range: 0.250V");
    }

    #[test]
    fn window_slides_over_600_single_value_batches() {
        let engine = engine();
        let t0 = Instant::now();
        for i in 0..600 {
            let line = format!(r#"{{"samples":[{}.0]}}"#, i);
            engine.ingest_line(&line, t0 + Duration::from_millis(i)).unwrap();
        }

        let samples = engine.snapshot().samples;
        assert_eq!(samples.len(), 500);
        let indices: Vec<u64> = samples.iter().map(|s| s.index).collect();
        assert_eq!(indices, (100..600).collect::<Vec<u64>>());
        assert_eq!(engine.next_index(), 600);
    }

    #[test]
    fn clear_resets_everything() {
        let engine = engine();
        let t0 = Instant::now();
        engine.ingest_line(r#"{"samples":[1.0,2.0]}"#, t0).unwrap();
        engine.ingest_line(r#"{"samples":[3.0]}"#, t0 + Duration::from_millis(10)).unwrap();
        let mut events = engine.event_receiver();

        engine.clear();

        let stats = engine.session_stats();
        assert_eq!(stats.samples_received, 0);
        assert_eq!(stats.min, None);
        assert_eq!(stats.max, None);
        let snapshot = engine.snapshot();
        assert!(snapshot.samples.is_empty());
        assert_eq!(snapshot.stats, DerivedStats::default());
        assert_eq!(engine.next_index(), 0);
        assert_eq!(drain_events(&mut events)[0].kind, EventKind::Cleared);

        // Rate restarts too: the next batch is a session's first
        let derived =
            engine.ingest_line(r#"{"samples":[5.0]}"#, t0 + Duration::from_secs(1)).unwrap();
        assert_eq!(derived.instantaneous_rate, 0.0);
        assert_eq!(engine.snapshot().samples[0].index, 0);
    }

    #[test]
    fn custom_capacity_is_honoured() {
        let engine = engine_with(MonitorConfig { buffer_capacity: 4, ..MonitorConfig::default() });
        engine.ingest_line(r#"{"samples":[1,2,3,4,5,6]}"#, Instant::now()).unwrap();

        let values: Vec<f64> = engine.snapshot().samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MonitorConfig { buffer_capacity: 0, ..MonitorConfig::default() };
        assert!(
            IngestionEngine::new(config, ScriptedTransport::new(vec![]), AlwaysGranted).is_err()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn publisher_runs_at_fixed_cadence() {
        let engine = engine();
        let sink = Arc::new(RecordingSink::default());
        let subscription = engine.subscribe(Arc::clone(&sink));
        assert!(!subscription.is_closed());

        // Burst of frames between two ticks
        tokio::time::sleep(Duration::from_millis(10)).await;
        for _ in 0..20 {
            engine.ingest_line(r#"{"samples":[1.0]}"#, Instant::now()).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(240)).await;
        subscription.close().await;

        // Ticks at 0, 50, 100, 150, 200, 250ms
        let snapshots = sink.snapshots();
        assert!((5..=6).contains(&snapshots.len()), "got {} snapshots", snapshots.len());
        assert!(snapshots[0].samples.is_empty());
        assert_eq!(snapshots.last().map(|s| s.samples.len()), Some(20));

        // Each packet event reached the sink through the publisher
        let packets =
            sink.events().iter().filter(|e| matches!(e.kind, EventKind::Packet { .. })).count();
        assert_eq!(packets, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_subscription_stops_publication() {
        let engine = engine();
        let sink = Arc::new(RecordingSink::default());
        let subscription = engine.subscribe(Arc::clone(&sink));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!subscription.is_closed());
        drop(subscription);
        tokio::task::yield_now().await;
        let published = sink.snapshots().len();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(published >= 2);
        assert_eq!(sink.snapshots().len(), published);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_stream_ticks_without_input() {
        let engine = engine();
        let mut stream = Box::pin(engine.snapshots());

        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            let snapshot = stream.next().await.unwrap();
            assert!(snapshot.samples.is_empty());
        }
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn log_event_stream_yields_events() {
        let engine = engine();
        let mut stream = Box::pin(engine.log_events());

        engine.clear();

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, EventKind::Cleared);
        assert_eq!(event.message, "Plot cleared");
    }
}
