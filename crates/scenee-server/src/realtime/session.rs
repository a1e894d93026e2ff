//! One open delivery channel bound to a connected user.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use scenee_core::{SessionId, StreamEvent};
use scenee_settings::MAX_QUEUE_CAPACITY;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Result of offering an event to a session's queue.
///
/// Informational only: publishers are free to ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The event is queued for the session's delivery loop.
    Enqueued,
    /// The target user has no current session.
    NoSession,
    /// The queue was full; the event was discarded.
    Dropped,
    /// The session is tearing down and no longer accepts events.
    Closed,
    /// The event kind is reserved for the server and cannot be published.
    Rejected,
}

/// Why a session's delivery loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client went away.
    Disconnected,
    /// A newer session for the same user replaced this one.
    Superseded,
    /// The server is shutting down.
    Shutdown,
    /// No event was published to the session within the idle timeout.
    IdleTimeout,
    /// Writing a frame to the transport failed.
    TransportError,
}

impl SessionEnd {
    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Superseded => "superseded",
            Self::Shutdown => "shutdown",
            Self::IdleTimeout => "idle_timeout",
            Self::TransportError => "transport_error",
        }
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered session.
///
/// The producer side (queue sender, liveness, teardown token) lives here and
/// is shared through the registry; the consumer side is the [`Outbound`]
/// handed to the session's delivery loop.
pub struct Session {
    id: SessionId,
    user_id: String,
    tx: mpsc::Sender<StreamEvent>,
    live: AtomicBool,
    created_at: DateTime<Utc>,
    dropped: AtomicU64,
    teardown: CancellationToken,
    end: Mutex<Option<SessionEnd>>,
}

/// Receiving half of a session's bounded queue.
pub struct Outbound {
    rx: mpsc::Receiver<StreamEvent>,
}

impl Session {
    /// Create a session with a queue of `capacity` events, clamped to
    /// `1..=MAX_QUEUE_CAPACITY`.
    ///
    /// `teardown` is cancelled when the session closes; pass a child of the
    /// server shutdown token so shutdown reaches every session.
    pub fn open(user_id: String, capacity: usize, teardown: CancellationToken) -> (Self, Outbound) {
        let (tx, rx) = mpsc::channel(capacity.clamp(1, MAX_QUEUE_CAPACITY));
        let session = Self {
            id: SessionId::new(),
            user_id,
            tx,
            live: AtomicBool::new(true),
            created_at: Utc::now(),
            dropped: AtomicU64::new(0),
            teardown,
            end: Mutex::new(None),
        };
        (session, Outbound { rx })
    }

    /// Unique session ID.
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// The user this session delivers to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// When the session was opened.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the session still accepts events.
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Events dropped because the queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Queue capacity.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Token cancelled when the session closes.
    pub fn teardown_token(&self) -> &CancellationToken {
        &self.teardown
    }

    /// Offer `event` without waiting.
    ///
    /// A full queue keeps the events already queued and discards `event`.
    pub fn enqueue(&self, event: StreamEvent) -> Delivery {
        if !self.is_live() {
            return Delivery::Closed;
        }
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Enqueued,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Stop accepting events and signal the delivery loop to exit.
    ///
    /// The first reason recorded wins. Returns `true` if this call closed the
    /// session.
    pub fn close(&self, reason: SessionEnd) -> bool {
        let first = {
            let mut end = self.end.lock();
            if end.is_some() {
                false
            } else {
                *end = Some(reason);
                true
            }
        };
        self.live.store(false, Ordering::Release);
        self.teardown.cancel();
        first
    }

    /// Reason recorded by [`close`](Self::close), if any.
    pub fn end_reason(&self) -> Option<SessionEnd> {
        *self.end.lock()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("live", &self.is_live())
            .field("created_at", &self.created_at)
            .field("dropped", &self.drop_count())
            .finish_non_exhaustive()
    }
}

impl Outbound {
    /// Wait for the next queued event.
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        self.rx.recv().await
    }

    /// Take the next queued event if one is ready.
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        self.rx.try_recv().ok()
    }

    /// Close the queue to new events and discard what is left.
    ///
    /// Returns the number of events discarded.
    pub fn discard(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
