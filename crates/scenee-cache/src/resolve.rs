//! Local-then-upstream resolution.
//!
//! Only a confirmed absence in the local store triggers an upstream fetch.
//! Any other local failure is reported as [`LookupError::Storage`] instead
//! of being retried against the upstream.

use std::future::Future;

use crate::errors::{BoxError, LookupError};

/// Where a resolved value came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolved<T> {
    /// Found in the local store.
    Local(T),
    /// Absent locally, fetched from the upstream. Callers typically persist it.
    Fetched(T),
}

impl<T> Resolved<T> {
    /// The value regardless of origin.
    pub fn into_inner(self) -> T {
        match self {
            Self::Local(v) | Self::Fetched(v) => v,
        }
    }

    /// Whether the upstream was called.
    pub fn was_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

/// Resolve a value from a local lookup result, falling back to `fetch` only
/// when the lookup reported the value absent (`Ok(None)`).
pub async fn resolve_or_fetch<T, SE, UE, F, Fut>(
    local: Result<Option<T>, SE>,
    fetch: F,
) -> Result<Resolved<T>, LookupError>
where
    SE: Into<BoxError>,
    UE: Into<BoxError>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, UE>>,
{
    match local {
        Ok(Some(value)) => Ok(Resolved::Local(value)),
        Ok(None) => fetch()
            .await
            .map(Resolved::Fetched)
            .map_err(|e| LookupError::Upstream(e.into())),
        Err(e) => Err(LookupError::Storage(e.into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::UpstreamError;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct StorageDown;

    #[tokio::test]
    async fn local_hit_skips_upstream() {
        let called = AtomicBool::new(false);
        let resolved = resolve_or_fetch(Ok::<_, StorageDown>(Some(7)), || async {
            called.store(true, Ordering::SeqCst);
            Ok::<_, UpstreamError>(0)
        })
        .await
        .unwrap();
        assert_eq!(resolved, Resolved::Local(7));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn absent_fetches_upstream() {
        let resolved = resolve_or_fetch(Ok::<Option<u32>, StorageDown>(None), || async {
            Ok::<_, UpstreamError>(42)
        })
        .await
        .unwrap();
        assert!(resolved.was_fetched());
        assert_eq!(resolved.into_inner(), 42);
    }

    #[tokio::test]
    async fn storage_error_does_not_fall_through() {
        let called = AtomicBool::new(false);
        let err = resolve_or_fetch(Err::<Option<u32>, _>(StorageDown), || async {
            called.store(true, Ordering::SeqCst);
            Ok::<_, UpstreamError>(1)
        })
        .await
        .unwrap_err();
        assert_matches!(err, LookupError::Storage(_));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn upstream_error_is_distinct() {
        let err = resolve_or_fetch(Ok::<Option<u32>, StorageDown>(None), || async {
            Err::<u32, _>(UpstreamError::Request("timeout".into()))
        })
        .await
        .unwrap_err();
        assert_matches!(err, LookupError::Upstream(_));
        assert!(err.to_string().contains("timeout"));
    }
}
