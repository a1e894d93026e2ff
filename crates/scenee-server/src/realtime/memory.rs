//! In-memory [`FrameSink`] for tests and embedding.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use scenee_core::EventKind;
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

use super::delivery::{Frame, FrameSink};
use crate::error::TransportError;

/// Records every frame written to it.
///
/// Clones share state, so a test keeps one handle while the delivery loop
/// owns another.
#[derive(Clone)]
pub struct MemorySink {
    inner: Arc<Inner>,
}

struct Inner {
    frames: Mutex<Vec<Frame>>,
    written: Notify,
    closed: CancellationToken,
    fail_after: AtomicUsize,
    blocked: watch::Sender<bool>,
}

impl MemorySink {
    /// Create an open sink that accepts every write.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                frames: Mutex::new(Vec::new()),
                written: Notify::new(),
                closed: CancellationToken::new(),
                fail_after: AtomicUsize::new(usize::MAX),
                blocked: watch::Sender::new(false),
            }),
        }
    }

    /// Frames written so far.
    pub fn frames(&self) -> Vec<Frame> {
        self.inner.frames.lock().clone()
    }

    /// Event types of the frames written so far.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.inner.frames.lock().iter().map(|f| f.event).collect()
    }

    /// Simulate the peer going away.
    pub fn disconnect(&self) {
        self.inner.closed.cancel();
    }

    /// Fail every write once `n` frames have been recorded.
    pub fn fail_after(&self, n: usize) {
        self.inner.fail_after.store(n, Ordering::Release);
    }

    /// Hold writes until [`unblock_writes`](Self::unblock_writes).
    pub fn block_writes(&self) {
        let _ = self.inner.blocked.send_replace(true);
    }

    /// Release held writes.
    pub fn unblock_writes(&self) {
        let _ = self.inner.blocked.send_replace(false);
    }

    /// Wait until at least `n` frames have been recorded.
    pub async fn wait_for_frames(&self, n: usize) {
        loop {
            let written = self.inner.written.notified();
            if self.inner.frames.lock().len() >= n {
                return;
            }
            written.await;
        }
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn write(&self, frame: Frame) -> Result<(), TransportError> {
        let mut blocked = self.inner.blocked.subscribe();
        let _ = blocked.wait_for(|held| !*held).await;

        if self.inner.closed.is_cancelled() {
            return Err(TransportError::Closed);
        }
        {
            let mut frames = self.inner.frames.lock();
            if frames.len() >= self.inner.fail_after.load(Ordering::Acquire) {
                return Err(TransportError::Write("injected failure".into()));
            }
            frames.push(frame);
        }
        self.inner.written.notify_waiters();
        Ok(())
    }

    async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }
}
