//! ResponseCache: mutex-guarded LRU of response bodies

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::entry::CacheEntry;
use crate::error::{Error, Result};
use crate::lru::{LruCache, Put};
use crate::stats::CacheStats;

/// Result of a freshness-checked lookup
#[derive(Debug)]
pub enum Lookup {
    /// Entry present and younger than the window
    Fresh(Arc<CacheEntry>),
    /// Entry was present but stale; it has been deleted
    Expired,
    /// No entry for the key
    Missing,
}

/// Cache shared by all request handlers
///
/// Every operation takes the same lock, so list and index updates never
/// interleave. Callers produce content before calling [`put`](Self::put) and
/// send it after the call returns; the lock only covers the bookkeeping.
pub struct ResponseCache {
    /// Recency list and key index
    lru: Mutex<LruCache<String, Arc<CacheEntry>>>,

    /// Cache statistics
    stats: CacheStats,
}

impl ResponseCache {
    /// Create a new cache holding at most `capacity` entries
    ///
    /// # Returns
    /// * `Err(Error::ZeroCapacity)` - when `capacity` is 0
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or(Error::ZeroCapacity)?;

        Ok(Self {
            lru: Mutex::new(LruCache::new(capacity)),
            stats: CacheStats::new(),
        })
    }

    /// Look up `key`, promoting it on a hit
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let mut lru = self.lru.lock();
        match lru.get(key) {
            Some(entry) => {
                self.stats.record_hit();
                Some(Arc::clone(entry))
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Look up `key` and drop it if its age has reached `window`
    ///
    /// The check and the delete happen under one lock acquisition, so two
    /// handlers can never both evict the same stale entry.
    pub fn lookup(&self, key: &str, window: Duration) -> Lookup {
        self.lookup_at(key, Instant::now(), window)
    }

    /// [`lookup`](Self::lookup) with an explicit current time
    pub fn lookup_at(&self, key: &str, now: Instant, window: Duration) -> Lookup {
        let mut lru = self.lru.lock();

        let entry = match lru.get(key) {
            Some(entry) => Arc::clone(entry),
            None => {
                self.stats.record_miss();
                return Lookup::Missing;
            }
        };

        if entry.is_fresh(now, window) {
            self.stats.record_hit();
            return Lookup::Fresh(entry);
        }

        lru.remove(key);
        self.stats.record_expiration();
        self.stats.record_miss();
        debug!(
            "Expired {} after {:?} (window {:?})",
            key,
            entry.age(now),
            window
        );
        Lookup::Expired
    }

    /// Store a response body under `key`
    ///
    /// If `key` is already cached the existing entry is promoted and returned
    /// unchanged; the new content is discarded. Refreshing content requires
    /// [`delete`](Self::delete) first.
    pub fn put(
        &self,
        key: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Arc<CacheEntry> {
        self.put_at(key, content_type, content, Instant::now())
    }

    /// [`put`](Self::put) with an explicit creation time
    pub fn put_at(
        &self,
        key: impl Into<String>,
        content_type: impl Into<String>,
        content: impl Into<Bytes>,
        created_at: Instant,
    ) -> Arc<CacheEntry> {
        let key = key.into();
        let entry = Arc::new(CacheEntry::new(
            key.clone(),
            content_type.into(),
            content.into(),
            created_at,
        ));

        let mut lru = self.lru.lock();
        match lru.put(key.clone(), Arc::clone(&entry)) {
            Put::Inserted => {
                self.stats.record_insert();
                entry
            }
            Put::Evicted(old_key, _) => {
                self.stats.record_insert();
                self.stats.record_eviction();
                debug!("Evicted {} to make room for {}", old_key, key);
                entry
            }
            Put::Promoted => {
                trace!("{} already cached; promoted", key);
                lru.peek(key.as_str()).map(Arc::clone).unwrap_or(entry)
            }
        }
    }

    /// Remove `entry` from the cache
    ///
    /// Only removes the key if it still maps to this exact entry, so a stale
    /// handle cannot delete a newer replacement. Returns whether anything was
    /// removed.
    pub fn delete(&self, entry: &Arc<CacheEntry>) -> bool {
        let mut lru = self.lru.lock();

        let current = match lru.peek(entry.key()) {
            Some(current) => current,
            None => return false,
        };
        if !Arc::ptr_eq(current, entry) {
            return false;
        }

        lru.remove(entry.key());
        true
    }

    /// Cached keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        self.lru.lock().iter().map(|(key, _)| key.clone()).collect()
    }

    /// Log the recency order with entry ages at debug level
    pub fn log_snapshot(&self) {
        let now = Instant::now();
        let lru = self.lru.lock();
        for (rank, (key, entry)) in lru.iter().enumerate() {
            debug!("cache #{} {} age={:?}", rank + 1, key, entry.age(now));
        }
        debug!(
            "cache head={:?} tail={:?} size={}/{}",
            lru.most_recent(),
            lru.least_recent(),
            lru.len(),
            lru.capacity()
        );
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get current number of entries
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.lru.lock().capacity()
    }

    /// Drop every entry and reset statistics
    pub fn clear(&self) {
        self.lru.lock().clear();
        self.stats.reset();
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        self.lru.lock().assert_consistent();
    }
}
