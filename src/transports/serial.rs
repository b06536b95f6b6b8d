//! Serial transport for Bluetooth SPP links
//!
//! On Linux a paired SPP device is bound to an RFCOMM node (`rfcomm bind`),
//! which behaves like any other serial port.

use async_trait::async_trait;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info};

use super::LineReader;
use crate::transport::{LineSource, TransportFactory};
use crate::{MonitorError, Result, TransportFailure};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Opens serial device nodes such as `/dev/rfcomm0` or `/dev/ttyUSB0`.
#[derive(Debug, Clone, Copy)]
pub struct SerialTransport {
    baud_rate: u32,
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new(DEFAULT_BAUD_RATE)
    }
}

impl SerialTransport {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }
}

fn classify(err: &tokio_serial::Error) -> TransportFailure {
    match err.kind {
        tokio_serial::ErrorKind::NoDevice => TransportFailure::DeviceNotFound,
        tokio_serial::ErrorKind::Io(kind) => TransportFailure::from_io_kind(kind),
        _ => TransportFailure::Io,
    }
}

#[async_trait]
impl TransportFactory for SerialTransport {
    async fn open(&self, target: &str) -> Result<Box<dyn LineSource>> {
        debug!(device = target, baud_rate = self.baud_rate, "Opening serial transport");

        let port = tokio_serial::new(target, self.baud_rate).open_native_async().map_err(|e| {
            MonitorError::transport_with_source(
                classify(&e),
                format!("{target}: {e}"),
                Box::new(e),
            )
        })?;

        info!(device = target, baud_rate = self.baud_rate, "Serial transport open");
        Ok(Box::new(LineReader::new(port)))
    }
}
