//! Fixed-cadence snapshot publication
//!
//! The publisher runs on its own task, independent of the read loop. On every
//! tick it copies the current session under the session lock and hands the
//! copy to a [`SnapshotSink`], so bursts of frames surface at a steady visual
//! rate. Log events are forwarded to the same sink as they arrive.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::SnapshotHandle;
use crate::stats::DerivedStats;
use crate::types::{ConnectionState, LogEvent, Sample};

/// Immutable point-in-time view handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub stats: DerivedStats,
    /// Buffered samples, oldest first
    pub samples: Vec<Sample>,
    pub state: ConnectionState,
}

/// Consumer of published snapshots and log events.
///
/// Both callbacks run on the publisher task, never on the read loop.
pub trait SnapshotSink: Send + Sync + 'static {
    fn on_snapshot(&self, snapshot: &Snapshot);

    fn on_log_event(&self, event: &LogEvent) {
        let _ = event;
    }
}

impl<T: SnapshotSink + ?Sized> SnapshotSink for Arc<T> {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        (**self).on_snapshot(snapshot);
    }

    fn on_log_event(&self, event: &LogEvent) {
        (**self).on_log_event(event);
    }
}

/// Handle to a running publisher. Dropping it stops publication.
pub struct Subscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Stop publishing and wait for the task to finish.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Publisher task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub(crate) fn spawn<S: SnapshotSink>(
    handle: SnapshotHandle,
    events: broadcast::Receiver<LogEvent>,
    sink: S,
    period: Duration,
) -> Subscription {
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run(handle, events, sink, period, cancel.clone()));
    Subscription { cancel, task: Some(task) }
}

async fn run<S: SnapshotSink>(
    handle: SnapshotHandle,
    mut events: broadcast::Receiver<LogEvent>,
    sink: S,
    period: Duration,
    cancel: CancellationToken,
) {
    info!(?period, "Snapshot publisher started");
    let mut ticker = interval(period);
    // Late ticks are not made up in a burst
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut published = 0u64;
    let mut events_open = true;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                sink.on_snapshot(&handle.snapshot());
                published += 1;
            }
            event = events.recv(), if events_open => match event {
                Ok(event) => sink.on_log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Publisher fell behind on log events");
                }
                Err(RecvError::Closed) => {
                    debug!("Log event channel closed");
                    events_open = false;
                }
            },
        }
    }

    info!(published, "Snapshot publisher stopped");
}
