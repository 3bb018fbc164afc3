//! Bounded in-memory cache backend.
//!
//! Per-process LRU tier for values that are cheap to recompute or change
//! often. Entries past their combined TTL + stale-while-revalidate window
//! are dropped on access; cross-instance consistency is explicitly not
//! provided by this tier.

use std::num::NonZeroUsize;
use std::sync::{RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use lru::LruCache;
use tracing::warn;

use super::{Cache, CacheEntry, CacheError, now_ms};

const SOURCE: &str = "cache::memory";

pub struct MemoryCache {
    entries: RwLock<LruCache<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    // LruCache::get reorders internally, so reads take the write lock too.
    fn guard(&self, op: &'static str) -> RwLockWriteGuard<'_, LruCache<String, CacheEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!(target: SOURCE, op, "recovered poisoned cache lock");
                poisoned.into_inner()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.guard("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let mut guard = self.guard("get");
        let expired = match guard.get(key) {
            None => return Ok(None),
            Some(entry) => match entry.metadata.total_ttl_ms() {
                Some(total) => now_ms() > entry.metadata.created_time_ms + total,
                None => false,
            },
        };
        if expired {
            guard.pop(key);
            return Ok(None);
        }
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.guard("set").put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.guard("delete").pop(key);
        Ok(())
    }
}
