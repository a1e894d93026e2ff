//! Event kinds and the per-frame JSON envelope.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Type tag carried by every frame on a client stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Greeting written once when a session opens.
    Connected,
    /// A notification row was created for the user.
    Notification,
    /// Someone liked one of the user's watchlists.
    Like,
    /// Someone followed the user.
    Follow,
    /// Keepalive written by the session's own timer.
    Heartbeat,
}

impl EventKind {
    /// Kinds that domain-event producers are allowed to publish.
    pub const PUBLISHABLE: [Self; 4] = [
        Self::Notification,
        Self::Like,
        Self::Follow,
        Self::Heartbeat,
    ];

    /// Whether producers may publish this kind; `connected` is reserved
    /// for the server's greeting.
    pub fn is_publishable(self) -> bool {
        Self::PUBLISHABLE.contains(&self)
    }

    /// Wire name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Notification => "notification",
            Self::Like => "like",
            Self::Follow => "follow",
            Self::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event kind.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown event kind: {0}")]
pub struct UnknownEventKind(pub String);

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(Self::Connected),
            "notification" => Ok(Self::Notification),
            "like" => Ok(Self::Like),
            "follow" => Ok(Self::Follow),
            "heartbeat" => Ok(Self::Heartbeat),
            other => Err(UnknownEventKind(other.to_string())),
        }
    }
}

/// JSON envelope written for each frame: `{"type", "data", "timestamp"}`.
///
/// `timestamp` is Unix seconds at the moment the event was built, not when
/// it was written to the transport.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event type tag.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Event payload, omitted for heartbeats.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

impl StreamEvent {
    /// Build an event stamped with the current time.
    pub fn new(kind: EventKind, data: Option<Value>) -> Self {
        Self {
            kind,
            data,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Keepalive frame.
    pub fn heartbeat() -> Self {
        Self::new(EventKind::Heartbeat, None)
    }

    /// Greeting frame written when a session opens.
    pub fn connected(session_id: &str) -> Self {
        Self::new(
            EventKind::Connected,
            Some(serde_json::json!({
                "sessionId": session_id,
                "message": "stream established",
            })),
        )
    }

    /// Serialize to the JSON text written on the wire.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
