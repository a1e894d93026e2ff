//! Session delivery loop and the transport abstraction it writes to.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::{counter, gauge, histogram};
use scenee_core::{EventKind, StreamEvent};
use scenee_settings::RealtimeSettings;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::heartbeat::Heartbeat;
use super::registry::ConnectionRegistry;
use super::session::{Outbound, Session, SessionEnd};
use crate::error::TransportError;
use crate::metrics::{
    REALTIME_SESSION_DURATION_SECONDS, REALTIME_SESSIONS_ACTIVE, REALTIME_SESSIONS_CLOSED_TOTAL,
    REALTIME_SESSIONS_OPENED_TOTAL,
};

/// Stand-in deadline for a disabled idle timeout; the branch is never polled.
const IDLE_DISABLED: Duration = Duration::from_secs(86_400);

/// One serialized frame: a type tag and its JSON payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Event type tag.
    pub event: EventKind,
    /// JSON envelope text.
    pub data: String,
}

impl Frame {
    /// Serialize `event` into a frame.
    pub fn encode(event: &StreamEvent) -> serde_json::Result<Self> {
        Ok(Self {
            event: event.kind,
            data: event.to_json()?,
        })
    }
}

/// Long-lived server-push transport bound to one session.
///
/// Each `write` must reach the client before returning (no batching).
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Write and flush one frame.
    async fn write(&self, frame: Frame) -> Result<(), TransportError>;

    /// Resolve once the peer has gone away.
    async fn closed(&self);
}

/// Timing for a session's delivery loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// Period of the session's heartbeat. Values below
    /// [`heartbeat::MIN_PERIOD`](super::heartbeat::MIN_PERIOD) are raised to it.
    pub heartbeat_interval: Duration,
    /// Close the session when no event arrives for this long.
    pub idle_timeout: Option<Duration>,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self::from(&RealtimeSettings::default())
    }
}

impl From<&RealtimeSettings> for DeliveryOptions {
    fn from(settings: &RealtimeSettings) -> Self {
        Self {
            heartbeat_interval: settings.heartbeat_interval(),
            idle_timeout: settings.idle_timeout(),
        }
    }
}

/// Run the delivery loop for `session` until it ends, then tear it down.
///
/// 1. Writes a `connected` greeting
/// 2. Waits on teardown, peer disconnect, idle timeout, the next queued
///    event, and the session's own heartbeat
/// 3. On exit closes the session, discards queued events, unregisters it if
///    it is still current, and drops the transport
#[instrument(skip_all, fields(user_id = %session.user_id(), session_id = %session.id()))]
pub async fn run_session<S: FrameSink>(
    session: Arc<Session>,
    mut outbound: Outbound,
    sink: S,
    registry: Arc<ConnectionRegistry>,
    options: DeliveryOptions,
) -> SessionEnd {
    let opened = Instant::now();
    info!("session opened");
    counter!(REALTIME_SESSIONS_OPENED_TOTAL).increment(1);
    gauge!(REALTIME_SESSIONS_ACTIVE).increment(1.0);

    let end = deliver(&session, &mut outbound, &sink, options).await;

    let _ = session.close(end);
    let end = session.end_reason().unwrap_or(end);
    let discarded = outbound.discard();
    let unregistered = registry.unregister(session.user_id(), &session);
    drop(sink);

    counter!(REALTIME_SESSIONS_CLOSED_TOTAL, "reason" => end.as_str()).increment(1);
    gauge!(REALTIME_SESSIONS_ACTIVE).decrement(1.0);
    histogram!(REALTIME_SESSION_DURATION_SECONDS).record(opened.elapsed().as_secs_f64());
    info!(
        reason = %end,
        discarded,
        unregistered,
        dropped = session.drop_count(),
        "session closed"
    );
    end
}

async fn deliver<S: FrameSink>(
    session: &Session,
    outbound: &mut Outbound,
    sink: &S,
    options: DeliveryOptions,
) -> SessionEnd {
    if let Err(error) = write_event(sink, &StreamEvent::connected(session.id().as_str())).await {
        debug!(%error, "greeting write failed");
        return SessionEnd::TransportError;
    }

    let mut heartbeat = Heartbeat::new(options.heartbeat_interval);
    let idle = tokio::time::sleep(options.idle_timeout.unwrap_or(IDLE_DISABLED));
    tokio::pin!(idle);
    let teardown = session.teardown_token().clone();

    loop {
        tokio::select! {
            biased;

            () = teardown.cancelled() => {
                return session.end_reason().unwrap_or(SessionEnd::Shutdown);
            }
            () = sink.closed() => {
                return SessionEnd::Disconnected;
            }
            () = &mut idle, if options.idle_timeout.is_some() => {
                return SessionEnd::IdleTimeout;
            }
            event = outbound.recv() => {
                let Some(event) = event else {
                    return session.end_reason().unwrap_or(SessionEnd::Shutdown);
                };
                if let Err(error) = write_event(sink, &event).await {
                    warn!(%error, kind = %event.kind, "event write failed");
                    return SessionEnd::TransportError;
                }
                if let Some(timeout) = options.idle_timeout {
                    idle.as_mut().reset(Instant::now() + timeout);
                }
            }
            frame = heartbeat.tick() => {
                if let Err(error) = write_event(sink, &frame).await {
                    debug!(%error, "heartbeat write failed");
                    return SessionEnd::TransportError;
                }
            }
        }
    }
}

/// Serialize and write one event. Unserializable events are skipped.
async fn write_event<S: FrameSink>(sink: &S, event: &StreamEvent) -> Result<(), TransportError> {
    match Frame::encode(event) {
        Ok(frame) => sink.write(frame).await,
        Err(error) => {
            warn!(%error, kind = %event.kind, "failed to serialize event, skipping");
            Ok(())
        }
    }
}
