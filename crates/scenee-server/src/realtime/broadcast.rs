//! Targeted event publishing.

use std::sync::Arc;

use metrics::counter;
use scenee_core::{EventKind, StreamEvent};
use serde::Serialize;
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;
use super::session::Delivery;
use crate::metrics::{REALTIME_EVENTS_DROPPED_TOTAL, REALTIME_EVENTS_PUBLISHED_TOTAL};

/// Publishes events to individual users' current sessions.
///
/// Publishing never blocks and never fails the caller: an offline user or a
/// full queue is reported through [`Delivery`] and otherwise ignored.
#[derive(Clone)]
pub struct EventBroadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl EventBroadcaster {
    /// Create a broadcaster over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry this broadcaster publishes into.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Enqueue an event of `kind` carrying `payload` for `user_id`.
    pub fn publish<T: Serialize + ?Sized>(
        &self,
        user_id: &str,
        kind: EventKind,
        payload: &T,
    ) -> Delivery {
        if !kind.is_publishable() {
            warn!(user_id, %kind, "event kind is reserved, not publishing");
            return Delivery::Rejected;
        }
        let Some(session) = self.registry.lookup(user_id) else {
            debug!(user_id, %kind, "no session, event not delivered");
            return Delivery::NoSession;
        };

        let data = match serde_json::to_value(payload) {
            Ok(data) => data,
            Err(error) => {
                warn!(user_id, %kind, %error, "failed to serialize payload, dropping event");
                return Delivery::Dropped;
            }
        };

        let outcome = session.enqueue(StreamEvent::new(kind, Some(data)));
        match outcome {
            Delivery::Enqueued => {
                counter!(REALTIME_EVENTS_PUBLISHED_TOTAL, "type" => kind.as_str()).increment(1);
            }
            Delivery::Dropped => {
                counter!(REALTIME_EVENTS_DROPPED_TOTAL, "type" => kind.as_str()).increment(1);
                warn!(
                    user_id,
                    %kind,
                    session_id = %session.id(),
                    dropped = session.drop_count(),
                    "session queue full, event dropped"
                );
            }
            Delivery::Closed | Delivery::NoSession | Delivery::Rejected => {
                debug!(user_id, %kind, "session closing, event not delivered");
            }
        }
        outcome
    }

    /// Publish a `notification` event.
    pub fn notify_notification<T: Serialize + ?Sized>(&self, user_id: &str, payload: &T) -> Delivery {
        self.publish(user_id, EventKind::Notification, payload)
    }

    /// Publish a `like` event.
    pub fn notify_like<T: Serialize + ?Sized>(&self, user_id: &str, payload: &T) -> Delivery {
        self.publish(user_id, EventKind::Like, payload)
    }

    /// Publish a `follow` event.
    pub fn notify_follow<T: Serialize + ?Sized>(&self, user_id: &str, payload: &T) -> Delivery {
        self.publish(user_id, EventKind::Follow, payload)
    }
}
