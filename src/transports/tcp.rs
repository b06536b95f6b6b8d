//! TCP transport, for RFCOMM-to-TCP bridges and network-attached streamers

use std::net::Shutdown;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::LineReader;
use crate::transport::{LineSource, ReleaseHandle, TransportFactory};
use crate::{MonitorError, Result, TransportFailure};

/// Opens `host:port` targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl TransportFactory for TcpTransport {
    async fn open(&self, target: &str) -> Result<Box<dyn LineSource>> {
        debug!(device = target, "Opening TCP transport");

        let stream = TcpStream::connect(target).await.map_err(|e| {
            MonitorError::transport_with_source(
                TransportFailure::from_io_kind(e.kind()),
                format!("{target}: {e}"),
                Box::new(e),
            )
        })?;
        stream.set_nodelay(true)?;

        // A second handle on the same socket lets the owner shut it down while
        // the read loop still holds the first one
        let stream = stream.into_std()?;
        let closer = stream.try_clone()?;
        let stream = TcpStream::from_std(stream)?;
        let device = target.to_string();
        let release = ReleaseHandle::new(move || {
            if let Err(e) = closer.shutdown(Shutdown::Both) {
                debug!(device = %device, error = %e, "Socket already closed");
            }
        });

        info!(device = target, "TCP transport open");
        Ok(Box::new(LineReader::with_release_handle(stream, release)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn reads_lines_from_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"{\"samples\":[1.0,2.0]}\n").await.unwrap();
        });

        let mut source = TcpTransport.open(&addr.to_string()).await.unwrap();
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("{\"samples\":[1.0,2.0]}"));
        assert_eq!(source.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn release_shuts_the_socket_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            // Peer sees end-of-stream once the monitor releases
            socket.read(&mut buf).await.unwrap()
        });

        let mut source = TcpTransport.open(&addr.to_string()).await.unwrap();
        let release = source.release_handle();

        // Released from outside while a read is parked on the socket
        let reader = tokio::spawn(async move { source.next_line().await });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(release.release());

        let line = tokio::time::timeout(std::time::Duration::from_secs(2), reader)
            .await
            .expect("read unblocked")
            .unwrap()
            .unwrap();
        assert_eq!(line, None);
        assert_eq!(peer.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn refused_connection_is_device_not_found() {
        // Bind then drop to get a port nobody listens on
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();

        let err = match TcpTransport.open(&addr.to_string()).await {
            Err(err) => err,
            Ok(_) => panic!("expected connection to be refused"),
        };
        assert_eq!(err.transport_failure(), Some(TransportFailure::DeviceNotFound));
    }
}
