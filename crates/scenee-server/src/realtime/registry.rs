//! Per-user session registry.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::{Outbound, Session, SessionEnd};
use crate::metrics::REALTIME_SESSIONS_SUPERSEDED_TOTAL;

/// Owns the current session of every connected user.
///
/// Registration and unregistration take the write lock; lookups share the
/// read lock. The lock guards only the map operation itself and is never
/// held across an `.await` or a transport write.
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    queue_capacity: usize,
    shutdown: CancellationToken,
}

impl ConnectionRegistry {
    /// Create an empty registry whose sessions queue up to `queue_capacity`
    /// events and close when `shutdown` is cancelled.
    pub fn new(queue_capacity: usize, shutdown: CancellationToken) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity,
            shutdown,
        }
    }

    /// Per-session queue capacity.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Open a session for `user_id` and make it current.
    ///
    /// A previous session for the same user is closed immediately with
    /// [`SessionEnd::Superseded`]; its loop exits on its next poll and its
    /// own unregister becomes a no-op.
    pub fn register(&self, user_id: impl Into<String>) -> (Arc<Session>, Outbound) {
        let user_id = user_id.into();
        let (session, outbound) = Session::open(
            user_id.clone(),
            self.queue_capacity,
            self.shutdown.child_token(),
        );
        let session = Arc::new(session);

        let previous = self
            .sessions
            .write()
            .insert(user_id.clone(), Arc::clone(&session));

        if let Some(previous) = previous {
            let _ = previous.close(SessionEnd::Superseded);
            counter!(REALTIME_SESSIONS_SUPERSEDED_TOTAL).increment(1);
            info!(
                user_id,
                previous = %previous.id(),
                current = %session.id(),
                "session superseded"
            );
        } else {
            debug!(user_id, session_id = %session.id(), "session registered");
        }
        (session, outbound)
    }

    /// Remove `session` if it is still the current session for `user_id`.
    ///
    /// Returns `false` (and changes nothing) when a newer session has taken
    /// its place or the user has no session.
    pub fn unregister(&self, user_id: &str, session: &Session) -> bool {
        let mut sessions = self.sessions.write();
        let is_current = sessions
            .get(user_id)
            .is_some_and(|current| current.id() == session.id());
        if is_current {
            let _ = sessions.remove(user_id);
        }
        is_current
    }

    /// Current session for `user_id`.
    pub fn lookup(&self, user_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(user_id).cloned()
    }

    /// Number of users with a current session.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether no user is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// IDs of connected users.
    pub fn user_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }
}
