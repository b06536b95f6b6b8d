//! Connection lifecycle states

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of the transport link.
///
/// `Disconnected → Connecting → Connected → Disconnecting → Disconnected`, with
/// `Connecting → Disconnected` on a failed open and `Connected → Disconnected`
/// when the link drops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    /// True once the link is open and lines are flowing.
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// True while a read loop may exist.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
        };
        f.write_str(label)
    }
}
