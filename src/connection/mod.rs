//! Connection lifecycle
//!
//! [`ConnectionStateMachine`] owns the transport lifecycle and the single
//! background read loop. State lives in a `watch` channel: consumers get a
//! read-only view and can await changes, while only this module and its read
//! loop ever write it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::driver::{LineSink, ReadLoop, ReleaseSlot, transition};
use crate::transport::{PermissionGate, TransportFactory};
use crate::types::{ConnectionState, EventKind, Severity};
use crate::{EventBus, MonitorError, Result};


/// Bounded waits applied to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTimeouts {
    /// How long the transport may take to open
    pub connect: Duration,
    /// How long disconnect waits for the read loop before forcing release
    pub disconnect: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self { connect: Duration::from_secs(10), disconnect: Duration::from_millis(1000) }
    }
}

/// The read loop of the current (or most recent) connection attempt.
struct ActiveLink {
    target: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
    release: ReleaseSlot,
}

impl ActiveLink {
    /// Cancel the loop and release its transport. Idempotent.
    fn shut_down(&self) {
        self.cancel.cancel();
        let handle = self.release.lock().take();
        if let Some(handle) = handle {
            if handle.release() {
                debug!(device = %self.target, "Released transport from connection owner");
            }
        }
    }
}

/// Coordinates connect/disconnect with the background read loop.
///
/// At most one read loop exists at a time. Invalid commands are rejected with
/// [`MonitorError::InvalidState`] and change nothing.
pub struct ConnectionStateMachine {
    state: Arc<watch::Sender<ConnectionState>>,
    active: Mutex<Option<ActiveLink>>,
    factory: Arc<dyn TransportFactory>,
    gate: Arc<dyn PermissionGate>,
    sink: Arc<dyn LineSink>,
    events: EventBus,
    timeouts: LinkTimeouts,
}

impl ConnectionStateMachine {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        gate: Arc<dyn PermissionGate>,
        sink: Arc<dyn LineSink>,
        events: EventBus,
        timeouts: LinkTimeouts,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            state: Arc::new(state),
            active: Mutex::new(None),
            factory,
            gate,
            sink,
            events,
            timeouts,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Target passed to the last `connect`, until `disconnect` clears it.
    pub async fn target(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|link| link.target.clone())
    }

    /// Start connecting to `target`.
    ///
    /// Returns once the read loop is spawned; the outcome arrives as a state
    /// change plus a `Connected` or `ConnectionFailed` event. Only valid from
    /// `Disconnected`, and only if the permission gate allows it.
    pub async fn connect(&self, target: &str) -> Result<()> {
        let mut active = self.active.lock().await;

        let current = self.state();
        if current != ConnectionState::Disconnected {
            warn!(state = %current, "Rejected connect");
            return Err(MonitorError::invalid_state("connect", current));
        }

        if !self.gate.check_and_request().await {
            self.events.emit(
                Severity::Warning,
                EventKind::PermissionDenied,
                "Bluetooth permissions required",
            );
            return Err(MonitorError::PermissionDenied {
                reason: "permission gate refused the connect attempt".to_string(),
            });
        }

        if !transition(&self.state, ConnectionState::Disconnected, ConnectionState::Connecting) {
            return Err(MonitorError::invalid_state("connect", self.state()));
        }

        // A loop that ended on its own has already released its transport
        if let Some(stale) = active.take() {
            stale.shut_down();
            stale.task.abort();
        }

        self.events.emit(Severity::Info, EventKind::Connecting, format!("Connecting to {target}..."));

        let cancel = CancellationToken::new();
        let release = ReleaseSlot::default();
        let read_loop = ReadLoop {
            factory: Arc::clone(&self.factory),
            target: target.to_string(),
            state: Arc::clone(&self.state),
            sink: Arc::clone(&self.sink),
            events: self.events.clone(),
            connect_timeout: self.timeouts.connect,
            release: Arc::clone(&release),
        };
        let task = tokio::spawn(read_loop.run(cancel.clone()));

        *active = Some(ActiveLink { target: target.to_string(), cancel, task, release });
        Ok(())
    }

    /// Stop the read loop and release the transport.
    ///
    /// Valid from `Connecting` or `Connected`. Waits up to the disconnect
    /// timeout for the loop to exit, then aborts it. Either way the transport
    /// is released through its [`ReleaseHandle`](crate::transport::ReleaseHandle)
    /// before the machine reports `Disconnected`.
    pub async fn disconnect(&self) -> Result<()> {
        let link = {
            let mut active = self.active.lock().await;

            let mut previous = None;
            self.state.send_if_modified(|state| {
                if state.is_active() {
                    previous = Some(*state);
                    *state = ConnectionState::Disconnecting;
                    true
                } else {
                    false
                }
            });

            let Some(previous) = previous else {
                let current = self.state();
                warn!(state = %current, "Rejected disconnect");
                return Err(MonitorError::invalid_state("disconnect", current));
            };
            debug!(from = %previous, "Disconnecting");

            active.take()
        };

        if let Some(mut link) = link {
            link.cancel.cancel();
            match tokio::time::timeout(self.timeouts.disconnect, &mut link.task).await {
                Ok(Ok(())) => debug!("Read loop exited"),
                Ok(Err(e)) => warn!("Read loop ended abnormally: {}", e),
                Err(_) => {
                    warn!(
                        timeout = ?self.timeouts.disconnect,
                        "Read loop did not stop in time, forcing release"
                    );
                    link.task.abort();
                }
            }
            // Whether or not the loop stopped, the transport is let go here
            link.shut_down();
        }

        self.state.send_replace(ConnectionState::Disconnected);
        self.events.emit(Severity::Info, EventKind::Disconnected, "Disconnected");
        info!("Connection closed");
        Ok(())
    }
}

impl Drop for ConnectionStateMachine {
    fn drop(&mut self) {
        if let Some(link) = self.active.get_mut().take() {
            debug!("Dropping connection state machine");
            link.shut_down();
            link.task.abort();
        }
    }
}
