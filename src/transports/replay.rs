//! Replay transport for recorded sessions
//!
//! Reads a file of captured lines and paces them like the live streamer, so a
//! recording exercises the same connect/read/disconnect path as a device.

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info};

use super::LineReader;
use crate::transport::{LineSource, ReleaseHandle, TransportFactory};
use crate::{MonitorError, Result, TransportFailure};

/// Interval between frames on the ESP32 streamer.
pub const DEFAULT_LINE_INTERVAL: Duration = Duration::from_millis(100);

/// Opens recording files, treating the target as a path.
#[derive(Debug, Clone, Copy)]
pub struct ReplayTransport {
    line_interval: Duration,
    speed: f64,
}

impl Default for ReplayTransport {
    fn default() -> Self {
        Self::new(DEFAULT_LINE_INTERVAL)
    }
}

impl ReplayTransport {
    pub fn new(line_interval: Duration) -> Self {
        Self { line_interval, speed: 1.0 }
    }

    /// Set playback speed (clamped to 0.1x..10x)
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed.clamp(0.1, 10.0);
        self
    }

    fn paced_interval(&self) -> Duration {
        self.line_interval.div_f64(self.speed)
    }
}

#[async_trait]
impl TransportFactory for ReplayTransport {
    async fn open(&self, target: &str) -> Result<Box<dyn LineSource>> {
        let path = Path::new(target);
        let file = File::open(path).await.map_err(|e| {
            MonitorError::transport_with_source(
                TransportFailure::from_io_kind(e.kind()),
                format!("{}: {e}", path.display()),
                Box::new(e),
            )
        })?;

        let pacing = self.paced_interval();
        info!(path = %path.display(), ?pacing, "Opened replay recording");

        Ok(Box::new(ReplayLines::new(file, pacing)))
    }
}

struct ReplayLines {
    lines: LineReader<File>,
    interval: Option<Interval>,
    replayed: u64,
}

impl ReplayLines {
    fn new(file: File, pacing: Duration) -> Self {
        let interval = (!pacing.is_zero()).then(|| {
            let mut interval = interval(pacing);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        Self { lines: LineReader::new(file), interval, replayed: 0 }
    }
}

#[async_trait]
impl LineSource for ReplayLines {
    async fn next_line(&mut self) -> Result<Option<String>> {
        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        }

        let line = self.lines.next_line().await?;
        match &line {
            Some(_) => self.replayed += 1,
            None => debug!(lines = self.replayed, "Reached end of replay"),
        }
        Ok(line)
    }

    fn release_handle(&self) -> ReleaseHandle {
        self.lines.release_handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_recorded_lines_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.jsonl");
        std::fs::write(&path, "{\"samples\":[1.0]}\n{\"samples\":[2.0]}\n").unwrap();

        let transport = ReplayTransport::new(Duration::ZERO);
        let mut source = transport.open(path.to_str().unwrap()).await.unwrap();

        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("{\"samples\":[1.0]}"));
        assert_eq!(source.next_line().await.unwrap().as_deref(), Some("{\"samples\":[2.0]}"));
        assert_eq!(source.next_line().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn paces_lines_at_interval() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paced.jsonl");
        std::fs::write(&path, "a\nb\nc\n").unwrap();

        let transport = ReplayTransport::new(Duration::from_millis(100)).with_speed(2.0);
        let mut source = transport.open(path.to_str().unwrap()).await.unwrap();

        let start = tokio::time::Instant::now();
        for _ in 0..3 {
            source.next_line().await.unwrap();
        }
        // First tick is immediate, then two 50ms gaps
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn missing_file_is_device_not_found() {
        let err = match ReplayTransport::default().open("/nonexistent/recording.jsonl").await {
            Err(err) => err,
            Ok(_) => panic!("expected open to fail"),
        };
        assert_eq!(err.transport_failure(), Some(TransportFailure::DeviceNotFound));
    }
}
