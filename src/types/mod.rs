//! Core data types shared across the ingestion pipeline.
//!
//! - [`Sample`] is one buffered `(index, value)` pair
//! - [`Batch`] is the non-empty set of readings decoded from one frame
//! - [`ConnectionState`] is the read-only view of the link lifecycle
//! - [`LogEvent`] is what collaborators receive for display and diagnostics

mod event;
mod sample;
mod state;

pub use event::{EventKind, LogEvent, Severity};
pub use sample::{Batch, Sample};
pub use state::ConnectionState;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert!(!ConnectionState::default().is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_connected());
    }

    #[test]
    fn log_events_render_with_severity() {
        let event = LogEvent::new(Severity::Warning, EventKind::ConnectionLost, "Device disconnected");
        assert_eq!(event.to_string(), "WARNING: Device disconnected");
    }
}
