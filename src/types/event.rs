//! Log events surfaced to collaborators

use std::fmt;
use std::time::SystemTime;

use crate::error::{ParseError, TransportFailure};

/// Severity of a log event, matching the levels the on-screen log shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Success,
    /// Per-packet summaries
    Data,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Data => "DATA",
        };
        f.write_str(label)
    }
}

/// What happened, in machine-readable form.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Connecting,
    Connected,
    /// Opening the transport failed; the state machine is back in `Disconnected`.
    ConnectionFailed(TransportFailure),
    /// The link dropped without a user request.
    ConnectionLost,
    /// A user-requested disconnect completed.
    Disconnected,
    PermissionDenied,
    FrameRejected(ParseError),
    Packet { number: u64, samples: usize },
    Cleared,
}

/// One entry for the diagnostic log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub at: SystemTime,
    pub severity: Severity,
    pub kind: EventKind,
    pub message: String,
}

impl LogEvent {
    pub fn new(severity: Severity, kind: EventKind, message: impl Into<String>) -> Self {
        Self { at: SystemTime::now(), severity, kind, message: message.into() }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)
    }
}
