//! Fingerprint → payload store with a uniform time-to-live.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One stored payload.
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Valid iff `now - inserted_at < ttl`.
    fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) < ttl
    }
}

/// Time-bounded memoization keyed by a canonical fingerprint.
///
/// Expiry is logical: an expired entry is never returned, and is physically
/// removed either by the read that notices it or by [`purge_expired`]. Each
/// key lives in its own shard slot, so readers and writers of different keys
/// do not contend on a single lock and no lock is held across a fetch.
///
/// [`purge_expired`]: ResponseCache::purge_expired
pub struct ResponseCache<V = Bytes> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
}

impl<V: Clone> ResponseCache<V> {
    /// Create an empty cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// The uniform entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the value for `key` if present and not expired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => return None,
            Some(entry) if entry.is_fresh(now, self.ttl) => return Some(entry.value.clone()),
            Some(_) => {}
        }
        // Re-check under the write lock: a concurrent set may have refreshed it.
        let _ = self
            .entries
            .remove_if(key, |_, entry| !entry.is_fresh(now, self.ttl));
        None
    }

    /// Store `value` under `key`, replacing any previous entry and resetting its age.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        let _ = self.entries.insert(key.into(), entry);
    }

    /// Physically remove every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.is_fresh(now, ttl);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone + Send + Sync + 'static> ResponseCache<V> {
    /// Spawn a task that purges expired entries every `period` until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, period: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            debug!(removed, remaining = cache.len(), "swept expired cache entries");
                        }
                    }
                    () = cancel.cancelled() => break,
                }
            }
        })
    }
}
