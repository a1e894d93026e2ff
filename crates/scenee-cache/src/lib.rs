//! # scenee-cache
//!
//! Short-lived memoization in front of the upstream movie metadata service.
//!
//! - [`ResponseCache`]: fingerprint → payload with a uniform TTL, expiry
//!   evaluated at read time, backed by a sharded concurrent map
//! - [`FeedQuery`]: canonical fingerprint for feed requests
//! - [`FeedCache`]: fetch-through wrapper over a [`FeedSource`], never
//!   caching failures, with optional single-flight per key
//! - [`resolve_or_fetch`]: local-then-upstream lookup that keeps "absent"
//!   and "lookup failed" apart

#![deny(unsafe_code)]

pub mod errors;
pub mod feed;
pub mod fingerprint;
pub mod resolve;
pub mod store;

pub use errors::{LookupError, QueryError, UpstreamError};
pub use feed::{FeedCache, FeedResponse, FeedSource};
pub use fingerprint::{FeedKind, FeedQuery};
pub use resolve::{Resolved, resolve_or_fetch};
pub use store::ResponseCache;
