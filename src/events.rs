//! Log event fan-out
//!
//! Events go to every subscriber over a broadcast channel and are mirrored to
//! `tracing`, so headless deployments still get a diagnostic trail.

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::types::{EventKind, LogEvent, Severity};

/// Cloneable handle for raising [`LogEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LogEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, severity: Severity, kind: EventKind, message: impl Into<String>) {
        let event = LogEvent::new(severity, kind, message);

        match event.severity {
            Severity::Error => error!(kind = ?event.kind, "{}", event.message),
            Severity::Warning => warn!(kind = ?event.kind, "{}", event.message),
            Severity::Info | Severity::Success => info!(kind = ?event.kind, "{}", event.message),
            Severity::Data => debug!("{}", event.message),
        }

        // No subscribers is fine
        let _ = self.tx.send(event);
    }
}
