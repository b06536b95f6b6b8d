//! Transport traits
//!
//! The engine never touches a socket directly. A [`TransportFactory`] opens a
//! [`LineSource`] for a target, and the read loop pulls lines from it until
//! end-of-stream, an error, or cancellation.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::Result;

type ReleaseFn = Box<dyn FnOnce() + Send>;

struct ReleaseInner {
    released: AtomicBool,
    release: Mutex<Option<ReleaseFn>>,
}

/// Severs a transport from outside the task reading it.
///
/// Clones share one underlying action, which runs at most once no matter how
/// many clones call [`release`](Self::release) or from which thread. After
/// release the source ends its stream instead of blocking on the device.
#[derive(Clone)]
pub struct ReleaseHandle {
    inner: Arc<ReleaseInner>,
}

impl ReleaseHandle {
    /// Handle that runs `release` the first time it is triggered.
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(ReleaseInner {
                released: AtomicBool::new(false),
                release: Mutex::new(Some(Box::new(release))),
            }),
        }
    }

    /// Handle that only records the release, for sources whose OS handle
    /// goes away when the source itself is dropped.
    pub fn flag() -> Self {
        Self::new(|| {})
    }

    /// Release the transport. Returns `true` for the call that did it.
    pub fn release(&self) -> bool {
        if self.inner.released.swap(true, Ordering::SeqCst) {
            return false;
        }
        let release = self.inner.release.lock().take();
        if let Some(release) = release {
            release();
        }
        debug!("Transport released");
        true
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReleaseHandle").field("released", &self.is_released()).finish()
    }
}

/// A delimiter-framed stream of text lines.
///
/// Implementations release their underlying handle when dropped or when their
/// [`ReleaseHandle`] fires, whichever comes first; both must be safe at any
/// point, including mid-read.
#[async_trait]
pub trait LineSource: Send + 'static {
    /// Get the next line, without its delimiter
    ///
    /// Returns:
    /// - `Ok(Some(line))` - A line arrived
    /// - `Ok(None)` - The peer closed the stream
    /// - `Err(e)` - The read failed; the link is considered lost
    ///
    /// Must be cancel-safe: the read loop drops the pending future when a
    /// disconnect is requested.
    async fn next_line(&mut self) -> Result<Option<String>>;

    /// Handle the connection owner keeps to release this transport even
    /// while a read is stuck. Every call returns a clone of the same handle.
    fn release_handle(&self) -> ReleaseHandle;
}

/// Opens line sources for a device target.
#[async_trait]
pub trait TransportFactory: Send + Sync + 'static {
    /// Open a link to `target`.
    ///
    /// Failures should be `MonitorError::Transport` with a reason code
    /// (`DeviceNotFound`, `PermissionDenied`, `ConnectTimeout`, ...).
    async fn open(&self, target: &str) -> Result<Box<dyn LineSource>>;
}

/// Queried before every connect attempt.
///
/// The ingestion core does not negotiate OS permissions itself; a platform
/// layer implements this and may prompt the user.
#[async_trait]
pub trait PermissionGate: Send + Sync + 'static {
    async fn check_and_request(&self) -> bool;
}

#[async_trait]
impl<T: PermissionGate + ?Sized> PermissionGate for Arc<T> {
    async fn check_and_request(&self) -> bool {
        (**self).check_and_request().await
    }
}

/// Gate for platforms without runtime permission prompts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

#[async_trait]
impl PermissionGate for AlwaysGranted {
    async fn check_and_request(&self) -> bool {
        true
    }
}
