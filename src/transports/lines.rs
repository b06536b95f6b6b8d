//! Newline framing over any async byte stream

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{trace, warn};

use crate::transport::{LineSource, ReleaseHandle};
use crate::{MonitorError, Result, TransportFailure};

/// Longest line kept, delimiter included. Frames from the streamer are a few
/// hundred bytes.
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Splits a byte stream on `\n`, dropping a trailing `\r`.
///
/// Bytes that are not valid UTF-8 are replaced rather than treated as a
/// transport failure: a garbled line then fails to parse as a frame and the
/// link stays up. The same goes for overlong lines, which are cut at the
/// length limit and the rest discarded up to the next delimiter.
pub struct LineReader<R> {
    reader: Option<BufReader<R>>,
    pending: Vec<u8>,
    discarded: usize,
    max_line_len: usize,
    release: ReleaseHandle,
    eof: bool,
}

impl<R: AsyncRead + Unpin + Send + 'static> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_release_handle(inner, ReleaseHandle::flag())
    }

    /// Reader that stops at the next read once `release` fires.
    pub fn with_release_handle(inner: R, release: ReleaseHandle) -> Self {
        Self {
            reader: Some(BufReader::new(inner)),
            pending: Vec::with_capacity(256),
            discarded: 0,
            max_line_len: MAX_LINE_LEN,
            release,
            eof: false,
        }
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len.max(1);
        self
    }

    fn take_line(&mut self) -> String {
        if self.discarded > 0 {
            warn!(
                discarded = self.discarded,
                limit = self.max_line_len,
                "Line exceeded maximum length, truncated"
            );
            self.discarded = 0;
        }
        if self.pending.last() == Some(&b'\n') {
            self.pending.pop();
        }
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        line
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send + 'static> LineSource for LineReader<R> {
    async fn next_line(&mut self) -> Result<Option<String>> {
        if self.release.is_released() {
            // Let go of the device as soon as we get control back
            self.reader = None;
            self.eof = true;
        }
        if self.eof {
            return Ok(None);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        // `fill_buf` is cancel-safe and partial lines live in `pending`, so a
        // dropped future loses nothing
        loop {
            let available = reader.fill_buf().await.map_err(|e| {
                MonitorError::transport_with_source(
                    TransportFailure::ReadFailed,
                    format!("read failed: {e}"),
                    Box::new(e),
                )
            })?;

            if available.is_empty() {
                self.eof = true;
                break;
            }

            let (take, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            let keep = take.min(self.max_line_len.saturating_sub(self.pending.len()));
            self.pending.extend_from_slice(&available[..keep]);
            self.discarded += take - keep;
            reader.consume(take);

            if complete {
                break;
            }
        }

        if self.eof && self.pending.is_empty() && self.discarded == 0 {
            trace!("Line stream reached end of input");
            return Ok(None);
        }
        Ok(Some(self.take_line()))
    }

    fn release_handle(&self) -> ReleaseHandle {
        self.release.clone()
    }
}
