//! Concrete transports
//!
//! - [`TcpTransport`]: `host:port` targets
//! - [`ReplayTransport`]: recorded line files, paced like a live device
//! - `SerialTransport` (feature `serial`): RFCOMM/serial device nodes

mod lines;
pub mod replay;
#[cfg(feature = "serial")]
pub mod serial;
mod tcp;

pub use lines::LineReader;
pub use replay::ReplayTransport;
#[cfg(feature = "serial")]
pub use serial::SerialTransport;
pub use tcp::TcpTransport;
