//! Error types for telemetry ingestion.
//!
//! All errors implement `std::error::Error` and carry enough context to be
//! shown to a user as-is. Nothing in the ingestion core is fatal: every
//! variant here resolves to a well-defined connection state plus a log event.
//!
//! ## Error Categories
//!
//! - **Parse Errors**: a single frame could not be decoded (always absorbed)
//! - **Transport Errors**: opening or reading the byte stream failed
//! - **State Errors**: a command was issued in the wrong connection state
//! - **Permission Errors**: the permission gate refused a connect attempt
//! - **Config Errors**: invalid or unreadable configuration
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use adc_monitor::{MonitorError, TransportFailure};
//!
//! let error = MonitorError::transport(TransportFailure::DeviceNotFound, "ESP32 not paired");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::ConnectionState;

/// Result type alias for monitor operations.
pub type Result<T, E = MonitorError> = std::result::Result<T, E>;

/// Why a single frame was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not well-formed JSON, missing the `samples` array, or a non-numeric reading.
    #[error("Malformed frame: {details}")]
    Malformed { details: String },

    /// The `samples` array was present but held no readings.
    #[error("Frame contained no samples")]
    Empty,
}

impl ParseError {
    /// Helper constructor for malformed frames.
    pub fn malformed(details: impl Into<String>) -> Self {
        ParseError::Malformed { details: details.into() }
    }
}

/// Reason code attached to transport failures and `ConnectionFailed` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportFailure {
    /// The target device could not be located.
    DeviceNotFound,
    /// The OS refused access to the device.
    PermissionDenied,
    /// Opening the transport did not complete in time.
    ConnectTimeout,
    /// The transport opened but the link could not be established.
    Handshake,
    /// Any other I/O failure while opening.
    Io,
    /// A read on an established link failed.
    ReadFailed,
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportFailure::DeviceNotFound => "device not found",
            TransportFailure::PermissionDenied => "permission denied",
            TransportFailure::ConnectTimeout => "connect timeout",
            TransportFailure::Handshake => "handshake failed",
            TransportFailure::Io => "i/o error",
            TransportFailure::ReadFailed => "read failed",
        };
        f.write_str(label)
    }
}

impl TransportFailure {
    /// Classify an I/O error raised while opening a transport.
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;
        match kind {
            ErrorKind::NotFound | ErrorKind::ConnectionRefused | ErrorKind::AddrNotAvailable => {
                TransportFailure::DeviceNotFound
            }
            ErrorKind::PermissionDenied => TransportFailure::PermissionDenied,
            ErrorKind::TimedOut => TransportFailure::ConnectTimeout,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                TransportFailure::Handshake
            }
            _ => TransportFailure::Io,
        }
    }
}

/// Main error type for monitor operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MonitorError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Transport error ({failure}): {reason}")]
    Transport {
        failure: TransportFailure,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cannot {command} while {state}")]
    InvalidState { command: &'static str, state: ConnectionState },

    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Invalid configuration: {details}")]
    Config { details: String },
}

impl MonitorError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitorError::Transport { .. } => true,
            MonitorError::Timeout { .. } => true,
            MonitorError::PermissionDenied { .. } => true,
            MonitorError::Parse(_) => false,
            MonitorError::InvalidState { .. } => false,
            MonitorError::Config { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            MonitorError::Parse(_) => vec![
                "Check the streamer firmware emits one JSON object per line",
                "Verify the frame carries a numeric \"samples\" array",
            ],
            MonitorError::Transport { failure, .. } => match failure {
                TransportFailure::DeviceNotFound => vec![
                    "Ensure the device is powered and paired",
                    "Check the device name or address",
                ],
                TransportFailure::PermissionDenied => vec![
                    "Grant Bluetooth or serial device permissions",
                    "Check the user is in the dialout/bluetooth group",
                ],
                TransportFailure::ConnectTimeout => vec![
                    "Move closer to the device",
                    "Increase the connect timeout",
                ],
                _ => vec!["Reconnect to the device", "Restart the streamer"],
            },
            MonitorError::InvalidState { .. } => vec![
                "Wait for the current connection attempt to finish",
                "Disconnect before connecting again",
            ],
            MonitorError::PermissionDenied { .. } => {
                vec!["Grant the requested permissions and retry"]
            }
            MonitorError::Timeout { .. } => {
                vec!["Increase timeout duration", "Check the device is still responding"]
            }
            MonitorError::Config { .. } => {
                vec!["Check configuration values", "Remove the file to fall back to defaults"]
            }
        }
    }

    /// Reason code for transport failures, `None` for other variants.
    pub fn transport_failure(&self) -> Option<TransportFailure> {
        match self {
            MonitorError::Transport { failure, .. } => Some(*failure),
            MonitorError::Timeout { .. } => Some(TransportFailure::ConnectTimeout),
            _ => None,
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport(failure: TransportFailure, reason: impl Into<String>) -> Self {
        MonitorError::Transport { failure, reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_with_source(
        failure: TransportFailure,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        MonitorError::Transport { failure, reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for invalid-state rejections.
    pub fn invalid_state(command: &'static str, state: ConnectionState) -> Self {
        MonitorError::InvalidState { command, state }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        MonitorError::Config { details: details.into() }
    }
}

impl From<std::io::Error> for MonitorError {
    fn from(err: std::io::Error) -> Self {
        let failure = TransportFailure::from_io_kind(err.kind());
        MonitorError::Transport { failure, reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
