//! Cached response artifact

use std::time::{Duration, Instant};

use bytes::Bytes;

/// One cached response body
///
/// Immutable once stored. Handlers hold an `Arc<CacheEntry>` while sending,
/// so eviction never invalidates a body that is still being written out.
#[derive(Debug)]
pub struct CacheEntry {
    key: String,
    content_type: String,
    content: Bytes,
    created_at: Instant,
}

impl CacheEntry {
    pub(crate) fn new(key: String, content_type: String, content: Bytes, created_at: Instant) -> Self {
        Self {
            key,
            content_type,
            content,
            created_at,
        }
    }

    /// Canonical request path
    pub fn key(&self) -> &str {
        &self.key
    }

    /// MIME type sent with the body
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Response body (cheap to clone)
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Body length in bytes
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// When the entry was stored
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Time since the entry was stored, as of `now`
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    /// An entry is fresh while its age is strictly below `window`
    pub fn is_fresh(&self, now: Instant, window: Duration) -> bool {
        self.age(now) < window
    }
}
