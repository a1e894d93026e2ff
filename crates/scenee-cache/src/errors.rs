//! Cache-path error types.
//!
//! A cache miss is not an error and has no variant here.

use thiserror::Error;

/// Boxed error from a collaborator (storage or upstream client).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure reported by the upstream metadata service.
///
/// Returned to the caller unchanged; the cache is never populated with it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The request never produced a response (connect, timeout, TLS).
    #[error("upstream request failed: {0}")]
    Request(String),
    /// The upstream answered with a non-success status.
    #[error("upstream returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the response body, if any.
        message: String,
    },
    /// The response could not be decoded or re-encoded.
    #[error("upstream payload invalid: {0}")]
    Payload(String),
}

/// Feed request parameters that cannot be fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// `type` was neither `trending` nor `discover`.
    #[error("unknown feed type: {0}")]
    UnknownKind(String),
    /// `page` was not a positive integer.
    #[error("invalid page: {0}")]
    InvalidPage(String),
}

/// Outcome of a local-then-upstream lookup that did not produce a value.
///
/// "Not stored locally" is not represented: it is the trigger for the
/// upstream fetch, never an error of its own.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The local store failed for a reason other than absence.
    #[error("local lookup failed: {0}")]
    Storage(#[source] BoxError),
    /// The entry was absent locally and the upstream fetch failed.
    #[error("upstream fetch failed: {0}")]
    Upstream(#[source] BoxError),
}
