//! # pagecache
//!
//! In-memory response cache for pagesrv, keyed by canonical request path.
//!
//! ## Architecture
//! - **Key index**: AHash map from key to arena slot (O(1) lookup)
//! - **Recency list**: doubly-linked list threaded through the arena by slot index
//! - **ResponseCache**: one mutex around both, shared by every connection
//!
//! The cache is a pure LRU store. Freshness is decided by the caller, which
//! passes its staleness window into [`ResponseCache::lookup`].

#![warn(missing_docs)]

mod cache;
mod entry;
mod error;
mod lru;
mod stats;

pub use cache::{Lookup, ResponseCache};
pub use entry::CacheEntry;
pub use error::{Error, Result};
pub use lru::{Iter, LruCache, Put};
pub use stats::CacheStats;
