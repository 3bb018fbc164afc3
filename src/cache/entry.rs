//! Cache entry envelope shared by every backend.

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Expiry bookkeeping stored alongside every cached value.
///
/// `ttl_ms` bounds the fresh window and `swr_ms` the serve-stale window
/// behind it; `None` means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub created_time_ms: i64,
    pub ttl_ms: Option<i64>,
    pub swr_ms: Option<i64>,
}

impl CacheMetadata {
    pub fn new(ttl: Option<Duration>, stale_while_revalidate: Option<Duration>) -> Self {
        Self {
            created_time_ms: now_ms(),
            ttl_ms: ttl.map(|d| d.whole_milliseconds() as i64),
            swr_ms: stale_while_revalidate.map(|d| d.whole_milliseconds() as i64),
        }
    }

    fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.created_time_ms)
    }

    /// Within the hard TTL.
    pub fn is_fresh(&self, now_ms: i64) -> bool {
        match self.ttl_ms {
            None => true,
            Some(ttl) => self.age_ms(now_ms) <= ttl,
        }
    }

    /// Past the hard TTL but still inside the stale-while-revalidate window.
    pub fn is_within_swr(&self, now_ms: i64) -> bool {
        match (self.ttl_ms, self.swr_ms) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(ttl), Some(swr)) => self.age_ms(now_ms) <= ttl + swr,
        }
    }

    /// Combined lifetime after which an entry is pure garbage for the
    /// memory tier. `None` when the entry never expires.
    pub fn total_ttl_ms(&self) -> Option<i64> {
        self.ttl_ms.map(|ttl| ttl + self.swr_ms.unwrap_or(0))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub metadata: CacheMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(created: i64, ttl: Option<i64>, swr: Option<i64>) -> CacheMetadata {
        CacheMetadata {
            created_time_ms: created,
            ttl_ms: ttl,
            swr_ms: swr,
        }
    }

    #[test]
    fn freshness_windows() {
        let meta = metadata(1_000, Some(100), Some(400));
        assert!(meta.is_fresh(1_050));
        assert!(meta.is_fresh(1_100));
        assert!(!meta.is_fresh(1_101));
        assert!(meta.is_within_swr(1_101));
        assert!(meta.is_within_swr(1_500));
        assert!(!meta.is_within_swr(1_501));
        assert_eq!(meta.total_ttl_ms(), Some(500));
    }

    #[test]
    fn unbounded_entries_never_expire() {
        let meta = metadata(0, None, None);
        assert!(meta.is_fresh(i64::MAX));
        assert!(meta.is_within_swr(i64::MAX));
        assert_eq!(meta.total_ttl_ms(), None);
    }

    #[test]
    fn ttl_without_swr_has_no_stale_window() {
        let meta = metadata(0, Some(10), None);
        assert!(meta.is_fresh(10));
        assert!(!meta.is_within_swr(11));
    }
}
