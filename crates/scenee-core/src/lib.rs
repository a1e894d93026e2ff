//! # scenee-core
//!
//! Shared vocabulary for the scenee real-time delivery layer and feed cache.
//!
//! - **Event kinds**: [`EventKind`] tags for every frame pushed to a client
//! - **Stream events**: [`StreamEvent`], the JSON envelope written per frame
//! - **Branded IDs**: [`SessionId`] for compare-and-delete on the registry
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod events;
pub mod ids;
pub mod logging;

pub use events::{EventKind, StreamEvent};
pub use ids::SessionId;
