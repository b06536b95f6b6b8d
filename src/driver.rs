//! Background read loop for one connection attempt
//!
//! The loop owns the transport for its whole life: it opens it, moves the
//! state machine to `Connected`, pulls lines until end-of-stream, error or
//! cancellation, and drops the transport before reporting how it ended.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::transport::{ReleaseHandle, TransportFactory};
use crate::types::{ConnectionState, EventKind, Severity};
use crate::{EventBus, MonitorError, TransportFailure};

/// Where a read loop publishes the release handle of the transport it opened,
/// so the connection owner can release it without waiting for the loop.
pub(crate) type ReleaseSlot = Arc<Mutex<Option<ReleaseHandle>>>;

/// Receives lines from the read loop.
///
/// Called from the read loop's task only, strictly in arrival order.
pub trait LineSink: Send + Sync + 'static {
    /// The transport opened; called before the first line.
    fn on_connected(&self) {}

    fn on_line(&self, line: &str, received_at: Instant);
}

/// Move `state` from `from` to `to`, returning false if it was not in `from`.
pub(crate) fn transition(
    state: &watch::Sender<ConnectionState>,
    from: ConnectionState,
    to: ConnectionState,
) -> bool {
    state.send_if_modified(|current| {
        if *current == from {
            *current = to;
            true
        } else {
            false
        }
    })
}

/// Everything one read loop needs.
pub(crate) struct ReadLoop {
    pub factory: Arc<dyn TransportFactory>,
    pub target: String,
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub sink: Arc<dyn LineSink>,
    pub events: EventBus,
    pub connect_timeout: Duration,
    pub release: ReleaseSlot,
}

enum LoopEnd {
    Cancelled,
    EndOfStream,
    ReadError(String),
}

impl ReadLoop {
    pub async fn run(self, cancel: CancellationToken) {
        info!(device = %self.target, "Read loop started");

        let opened = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Connect attempt cancelled");
                return;
            }
            result = tokio::time::timeout(self.connect_timeout, self.factory.open(&self.target)) => result,
        };

        let opened = opened
            .unwrap_or_else(|_| Err(MonitorError::Timeout { duration: self.connect_timeout }));
        let mut source = match opened {
            Ok(source) => source,
            Err(e) => {
                let failure = e.transport_failure().unwrap_or(TransportFailure::Io);
                self.fail(&cancel, failure, e.to_string());
                return;
            }
        };
        *self.release.lock() = Some(source.release_handle());

        // A cancelled loop never touches the state again: by now it belongs to
        // the disconnect that cancelled us, or to a newer link
        if cancel.is_cancelled()
            || !transition(&self.state, ConnectionState::Connecting, ConnectionState::Connected)
        {
            debug!("Transport opened after disconnect was requested, releasing");
            return;
        }
        self.sink.on_connected();
        self.events.emit(
            Severity::Success,
            EventKind::Connected,
            format!("Successfully connected to {}", self.target),
        );

        let mut line_count = 0u64;
        let end = loop {
            if cancel.is_cancelled() {
                break LoopEnd::Cancelled;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break LoopEnd::Cancelled,
                result = source.next_line() => result,
            };

            match result {
                Ok(Some(line)) => {
                    line_count += 1;
                    trace!(line_count, len = line.len(), "Line received");
                    self.sink.on_line(&line, Instant::now());
                }
                Ok(None) => break LoopEnd::EndOfStream,
                Err(e) => break LoopEnd::ReadError(e.to_string()),
            }
        };

        // Release the transport before anyone can observe `Disconnected`
        drop(source);

        let (severity, message) = match end {
            LoopEnd::Cancelled => {
                info!(line_count, "Read loop cancelled");
                return;
            }
            LoopEnd::EndOfStream => (Severity::Warning, "Device disconnected".to_string()),
            LoopEnd::ReadError(reason) => (Severity::Error, format!("Connection lost: {reason}")),
        };

        if cancel.is_cancelled() {
            debug!(line_count, "Read loop outlived its link, not reporting");
            return;
        }

        if transition(&self.state, ConnectionState::Connected, ConnectionState::Disconnected) {
            self.events.emit(severity, EventKind::ConnectionLost, message);
        }
        info!(line_count, "Read loop ended");
    }

    fn fail(&self, cancel: &CancellationToken, failure: TransportFailure, reason: String) {
        if !cancel.is_cancelled()
            && transition(&self.state, ConnectionState::Connecting, ConnectionState::Disconnected)
        {
            self.events.emit(
                Severity::Error,
                EventKind::ConnectionFailed(failure),
                format!("Connection failed: {reason}"),
            );
        } else {
            debug!(%failure, "Open failed after disconnect was requested");
        }
    }
}
