//! Session registry, event fan-out, delivery loop, heartbeat, and transports.

pub mod broadcast;
pub mod delivery;
pub mod heartbeat;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod registry;
pub mod session;
pub mod sse;
