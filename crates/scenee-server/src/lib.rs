//! # scenee-server
//!
//! Real-time event delivery for connected clients.
//!
//! - [`realtime::registry::ConnectionRegistry`]: at most one current session per user
//! - [`realtime::broadcast::EventBroadcaster`]: non-blocking, drop-on-full publish
//! - [`realtime::delivery::run_session`]: one delivery loop per session with its own heartbeat
//! - `GET /events`: Server-Sent Events transport for a session
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod error;
pub mod health;
pub mod identity;
pub mod metrics;
pub mod realtime;
pub mod server;
pub mod shutdown;
