//! Test utilities: scripted transports, permission gates and sinks
//!
//! These stand in for a real device so the connection lifecycle can be driven
//! deterministically from tests and benchmarks.

#![cfg(any(test, feature = "benchmark"))]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::publisher::{Snapshot, SnapshotSink};
use crate::transport::{LineSource, PermissionGate, ReleaseHandle, TransportFactory};
use crate::types::{EventKind, LogEvent};
use crate::{MonitorError, Result, TransportFailure};

/// One scripted action for [`ScriptedTransport`]'s line source.
#[derive(Debug, Clone)]
pub enum Step {
    /// Deliver a line
    Line(String),
    /// Wait asynchronously before the next step
    Delay(Duration),
    /// Block the worker thread, ignoring cancellation
    BlockThread(Duration),
    /// Fail the read
    Fail(String),
    /// Never produce anything again
    Hang,
}

impl Step {
    pub fn line(line: impl Into<String>) -> Self {
        Step::Line(line.into())
    }
}

/// Transport factory that replays a script on every open.
///
/// The n-th successful open plays the n-th script, repeating the last one once
/// they run out. When a script ends the source reports end-of-stream.
#[derive(Debug, Clone)]
pub struct ScriptedTransport {
    scripts: Arc<Vec<Vec<Step>>>,
    open_error: Option<TransportFailure>,
    open_delay: Duration,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new(steps: Vec<Step>) -> Self {
        Self::sequence(vec![steps])
    }

    /// One script per successive connection.
    pub fn sequence(scripts: Vec<Vec<Step>>) -> Self {
        Self {
            scripts: Arc::new(scripts),
            open_error: None,
            open_delay: Duration::ZERO,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Lines delivered back to back, then the script hangs (link stays up).
    pub fn streaming<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut steps: Vec<Step> = lines.into_iter().map(Step::line).collect();
        steps.push(Step::Hang);
        Self::new(steps)
    }

    /// Make every open fail with `failure`.
    pub fn failing_open(mut self, failure: TransportFailure) -> Self {
        self.open_error = Some(failure);
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Number of sources opened so far.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of opened sources that have been released or dropped.
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for ScriptedTransport {
    async fn open(&self, target: &str) -> Result<Box<dyn LineSource>> {
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if let Some(failure) = self.open_error {
            return Err(MonitorError::transport(failure, format!("{target}: scripted failure")));
        }

        let attempt = self.opened.fetch_add(1, Ordering::SeqCst);
        let steps: VecDeque<Step> = self
            .scripts
            .get(attempt)
            .or_else(|| self.scripts.last())
            .map(|script| script.iter().cloned().collect())
            .unwrap_or_default();

        let released = Arc::clone(&self.released);
        Ok(Box::new(ScriptedSource {
            steps,
            release: ReleaseHandle::new(move || {
                released.fetch_add(1, Ordering::SeqCst);
            }),
        }))
    }
}

struct ScriptedSource {
    steps: VecDeque<Step>,
    release: ReleaseHandle,
}

#[async_trait]
impl LineSource for ScriptedSource {
    async fn next_line(&mut self) -> Result<Option<String>> {
        loop {
            if self.release.is_released() {
                return Ok(None);
            }
            match self.steps.pop_front() {
                Some(Step::Line(line)) => return Ok(Some(line)),
                Some(Step::Delay(delay)) => tokio::time::sleep(delay).await,
                Some(Step::BlockThread(duration)) => std::thread::sleep(duration),
                Some(Step::Fail(reason)) => {
                    return Err(MonitorError::transport(TransportFailure::ReadFailed, reason));
                }
                Some(Step::Hang) => {
                    self.steps.push_front(Step::Hang);
                    futures::future::pending::<()>().await;
                }
                None => return Ok(None),
            }
        }
    }

    fn release_handle(&self) -> ReleaseHandle {
        self.release.clone()
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.release.release();
    }
}

/// Permission gate with a fixed answer that counts how often it was asked.
#[derive(Debug, Default)]
pub struct FixedGate {
    granted: bool,
    asked: AtomicUsize,
}

impl FixedGate {
    pub fn granting() -> Self {
        Self { granted: true, asked: AtomicUsize::new(0) }
    }

    pub fn denying() -> Self {
        Self { granted: false, asked: AtomicUsize::new(0) }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermissionGate for FixedGate {
    async fn check_and_request(&self) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        self.granted
    }
}

/// Sink that records everything it is handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    snapshots: Mutex<Vec<Snapshot>>,
    events: Mutex<Vec<LogEvent>>,
}

impl RecordingSink {
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots.lock().clone()
    }

    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().clone()
    }
}

impl SnapshotSink for RecordingSink {
    fn on_snapshot(&self, snapshot: &Snapshot) {
        self.snapshots.lock().push(snapshot.clone());
    }

    fn on_log_event(&self, event: &LogEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Wait for the first event matching `predicate`, skipping others.
///
/// Returns `None` if nothing matches within `timeout`.
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<LogEvent>,
    timeout: Duration,
    mut predicate: F,
) -> Option<LogEvent>
where
    F: FnMut(&EventKind) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event.kind) => return Some(event),
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Drain whatever events are already queued.
pub fn drain_events(events: &mut broadcast::Receiver<LogEvent>) -> Vec<LogEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
