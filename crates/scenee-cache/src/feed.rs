//! Fetch-through feed cache in front of the upstream metadata service.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::counter;
use scenee_settings::CacheSettings;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::UpstreamError;
use crate::fingerprint::FeedQuery;
use crate::store::ResponseCache;

/// Feed requests served from the cache (counter).
pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
/// Feed requests that missed the cache (counter).
pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
/// Upstream fetches that failed (counter).
pub const CACHE_UPSTREAM_ERRORS_TOTAL: &str = "cache_upstream_errors_total";

/// Upstream collaborator that produces feed payloads.
///
/// Retry policy, if any, belongs to the implementation; the cache calls
/// `fetch` at most once per miss.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the serialized feed for `query`.
    async fn fetch(&self, query: &FeedQuery) -> Result<Bytes, UpstreamError>;
}

/// A feed body and whether it came from the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedResponse {
    /// Serialized feed payload.
    pub body: Bytes,
    /// `true` when served without an upstream call.
    pub cached: bool,
}

/// Memoizes [`FeedSource`] responses by [`FeedQuery::fingerprint`].
///
/// The source always receives the [normalized](FeedQuery::normalized) query,
/// so every request that maps to a key asks the upstream the same thing.
/// Failures are returned unchanged and never stored. With single-flight
/// enabled, concurrent misses for one key wait for the first caller's fetch
/// and then re-read the cache; if that fetch failed, the next waiter tries
/// the upstream itself.
pub struct FeedCache {
    cache: Arc<ResponseCache<Bytes>>,
    source: Arc<dyn FeedSource>,
    single_flight: bool,
    sweep_interval: Option<Duration>,
    in_flight: DashMap<String, Flight>,
}

/// Per-key single-flight gate and the number of callers holding it.
struct Flight {
    gate: Arc<Mutex<()>>,
    holders: usize,
}

/// A caller's hold on a key's [`Flight`].
///
/// Releasing happens in `Drop`, so a caller cancelled while waiting or
/// fetching still leaves the map. The holder count is only changed under
/// the map's shard lock; the last holder out removes the entry.
struct FlightHold<'a> {
    in_flight: &'a DashMap<String, Flight>,
    key: &'a str,
    gate: Arc<Mutex<()>>,
}

impl<'a> FlightHold<'a> {
    fn join(in_flight: &'a DashMap<String, Flight>, key: &'a str) -> Self {
        let mut flight = in_flight.entry(key.to_string()).or_insert_with(|| Flight {
            gate: Arc::default(),
            holders: 0,
        });
        flight.holders += 1;
        let gate = Arc::clone(&flight.gate);
        drop(flight);
        Self {
            in_flight,
            key,
            gate,
        }
    }
}

impl Drop for FlightHold<'_> {
    fn drop(&mut self) {
        if let Entry::Occupied(mut entry) = self.in_flight.entry(self.key.to_string()) {
            let flight = entry.get_mut();
            flight.holders = flight.holders.saturating_sub(1);
            if flight.holders == 0 {
                let _ = entry.remove();
            }
        }
    }
}

impl FeedCache {
    /// Wrap `source` with a cache built from `settings`.
    pub fn new(source: Arc<dyn FeedSource>, settings: &CacheSettings) -> Self {
        let mut feed = Self::with_cache(
            source,
            Arc::new(ResponseCache::new(settings.ttl())),
            settings.single_flight,
        );
        feed.sweep_interval = settings.sweep_interval();
        feed
    }

    /// Wrap `source` with an existing cache. No sweeper is configured.
    pub fn with_cache(
        source: Arc<dyn FeedSource>,
        cache: Arc<ResponseCache<Bytes>>,
        single_flight: bool,
    ) -> Self {
        Self {
            cache,
            source,
            single_flight,
            sweep_interval: None,
            in_flight: DashMap::new(),
        }
    }

    /// The underlying response cache.
    pub fn cache(&self) -> &Arc<ResponseCache<Bytes>> {
        &self.cache
    }

    /// Start the background purge configured by `cache.sweepIntervalSecs`.
    ///
    /// Returns `None` when sweeping is disabled; expired entries are then
    /// only removed by the reads that find them.
    pub fn spawn_sweeper(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        let period = self.sweep_interval?;
        debug!(period_secs = period.as_secs(), "starting feed cache sweeper");
        Some(self.cache.spawn_sweeper(period, cancel))
    }

    /// Serve `query` from the cache, or fetch, store and return it.
    pub async fn fetch(&self, query: &FeedQuery) -> Result<FeedResponse, UpstreamError> {
        let query = query.normalized();
        let key = query.fingerprint();
        if let Some(body) = self.hit(&key) {
            return Ok(body);
        }
        counter!(CACHE_MISSES_TOTAL).increment(1);

        if !self.single_flight {
            return self.fill(&key, &query).await;
        }

        let hold = FlightHold::join(&self.in_flight, &key);
        let _turn = hold.gate.lock().await;
        match self.hit(&key) {
            Some(body) => Ok(body),
            None => self.fill(&key, &query).await,
        }
    }

    fn hit(&self, key: &str) -> Option<FeedResponse> {
        let body = self.cache.get(key)?;
        counter!(CACHE_HITS_TOTAL).increment(1);
        debug!(key, "feed cache hit");
        Some(FeedResponse { body, cached: true })
    }

    async fn fill(&self, key: &str, query: &FeedQuery) -> Result<FeedResponse, UpstreamError> {
        match self.source.fetch(query).await {
            Ok(body) => {
                self.cache.set(key, body.clone());
                debug!(key, bytes = body.len(), "feed cache filled");
                Ok(FeedResponse {
                    body,
                    cached: false,
                })
            }
            Err(error) => {
                counter!(CACHE_UPSTREAM_ERRORS_TOTAL).increment(1);
                warn!(key, %error, "upstream feed fetch failed");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use assert_matches::assert_matches;

    /// Source that counts calls and can be told to fail.
    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingSource {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: Duration::ZERO,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: true,
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedSource for CountingSource {
        async fn fetch(&self, query: &FeedQuery) -> Result<Bytes, UpstreamError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(UpstreamError::Status {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            Ok(Bytes::from(format!("{}#{n}", query.kind)))
        }
    }

    fn settings(single_flight: bool) -> CacheSettings {
        CacheSettings {
            ttl_secs: 60,
            sweep_interval_secs: 0,
            single_flight,
        }
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let source = CountingSource::ok();
        let feed = FeedCache::new(source.clone(), &settings(true));

        let first = feed.fetch(&FeedQuery::trending()).await.unwrap();
        assert!(!first.cached);
        let second = feed.fetch(&FeedQuery::trending().window("7d")).await.unwrap();
        assert!(second.cached);
        assert_eq!(first.body, second.body);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn upstream_failure_propagates_and_is_not_cached() {
        let source = CountingSource::failing();
        let feed = FeedCache::new(source.clone(), &settings(true));

        let err = feed.fetch(&FeedQuery::discover()).await.unwrap_err();
        assert_matches!(err, UpstreamError::Status { status: 503, .. });
        assert!(feed.cache().is_empty());

        let _ = feed.fetch(&FeedQuery::discover()).await.unwrap_err();
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_refetches() {
        let source = CountingSource::ok();
        let feed = FeedCache::new(source.clone(), &settings(false));

        let _ = feed.fetch(&FeedQuery::trending()).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        let again = feed.fetch(&FeedQuery::trending()).await.unwrap();
        assert!(!again.cached);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn single_flight_collapses_concurrent_misses() {
        let source = CountingSource::slow(Duration::from_millis(100));
        let feed = Arc::new(FeedCache::new(source.clone(), &settings(true)));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let feed = Arc::clone(&feed);
                tokio::spawn(async move { feed.fetch(&FeedQuery::trending()).await })
            })
            .collect();
        let results = futures::future::join_all(tasks).await;

        assert_eq!(source.calls(), 1);
        let fresh = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .filter(|r| !r.cached)
            .count();
        assert_eq!(fresh, 1);
        assert!(feed.in_flight.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn without_single_flight_concurrent_misses_all_fetch() {
        let source = CountingSource::slow(Duration::from_millis(100));
        let feed = Arc::new(FeedCache::new(source.clone(), &settings(false)));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let feed = Arc::clone(&feed);
                tokio::spawn(async move { feed.fetch(&FeedQuery::trending()).await })
            })
            .collect();
        for r in futures::future::join_all(tasks).await {
            let _ = r.unwrap().unwrap();
        }
        assert_eq!(source.calls(), 4);
    }

    /// Echoes the window it was asked for, defaulting the way the upstream
    /// does when none is sent.
    struct WindowEcho;

    #[async_trait]
    impl FeedSource for WindowEcho {
        async fn fetch(&self, query: &FeedQuery) -> Result<Bytes, UpstreamError> {
            let window = query.window.clone().unwrap_or_else(|| "day".into());
            Ok(Bytes::from(window))
        }
    }

    #[tokio::test]
    async fn source_receives_normalized_query() {
        let feed = FeedCache::new(Arc::new(WindowEcho), &settings(true));

        let implicit = feed.fetch(&FeedQuery::trending()).await.unwrap();
        assert!(!implicit.cached);
        assert_eq!(implicit.body, Bytes::from_static(b"week"));

        for window in ["week", "7d", "WEEK"] {
            let resp = feed.fetch(&FeedQuery::trending().window(window)).await.unwrap();
            assert!(resp.cached, "{window}");
            assert_eq!(resp.body, Bytes::from_static(b"week"), "{window}");
        }

        let day = feed.fetch(&FeedQuery::trending().window("day")).await.unwrap();
        assert!(!day.cached);
        assert_eq!(day.body, Bytes::from_static(b"day"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_fetches_release_their_gates() {
        let source = CountingSource::slow(Duration::from_secs(10));
        let feed = Arc::new(FeedCache::new(source.clone(), &settings(true)));

        let mut tasks = Vec::new();
        for region in ["us", "gb", "fr", "us"] {
            let feed = Arc::clone(&feed);
            tasks.push(tokio::spawn(async move {
                feed.fetch(&FeedQuery::discover().region(region)).await
            }));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(feed.in_flight.len(), 3);

        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            assert!(task.await.unwrap_err().is_cancelled());
        }
        assert!(feed.in_flight.is_empty());
        assert!(feed.cache().is_empty());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_sweeper_purges_without_reads() {
        let source = CountingSource::ok();
        let settings = CacheSettings {
            ttl_secs: 60,
            sweep_interval_secs: 10,
            single_flight: true,
        };
        let feed = FeedCache::new(source, &settings);
        let cancel = CancellationToken::new();
        let sweeper = feed.spawn_sweeper(cancel.clone()).unwrap();

        let _ = feed.fetch(&FeedQuery::trending()).await.unwrap();
        assert_eq!(feed.cache().len(), 1);
        tokio::time::sleep(Duration::from_secs(75)).await;
        assert_eq!(feed.cache().len(), 0);

        cancel.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn sweeper_disabled_by_default() {
        let feed = FeedCache::new(CountingSource::ok(), &settings(true));
        assert!(feed.spawn_sweeper(CancellationToken::new()).is_none());
    }

    #[tokio::test]
    async fn different_keys_fetch_independently() {
        let source = CountingSource::ok();
        let feed = FeedCache::new(source.clone(), &settings(true));

        let _ = feed.fetch(&FeedQuery::trending()).await.unwrap();
        let _ = feed.fetch(&FeedQuery::discover().page(2)).await.unwrap();
        assert_eq!(source.calls(), 2);
        assert_eq!(feed.cache().len(), 2);
    }
}
