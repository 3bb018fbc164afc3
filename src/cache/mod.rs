//! Lettura cache facade.
//!
//! A single [`Cache`] contract served by two backends:
//!
//! - **memory** ([`MemoryCache`]): bounded per-process LRU, fastest tier,
//!   no cross-instance consistency.
//! - **durable** (`infra::db::PgCache`): the `cache_entries` table, shared
//!   by every instance and surviving restarts.
//!
//! [`cachified`] layers stale-while-revalidate semantics on top: fresh
//! entries are served directly, stale-but-within-window entries are served
//! immediately while a detached task refreshes them, and a failing
//! recompute falls back to whatever cached value is still around.

mod entry;
pub mod keys;
mod memory;

pub use entry::{CacheEntry, CacheMetadata, now_ms};
pub use memory::MemoryCache;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use time::Duration;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend `{backend}` failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },
}

impl CacheError {
    pub fn backend(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            message: message.into(),
        }
    }
}

/// Pluggable cache backend. Implementations are selected by configuration
/// at startup and handed around as `Arc<dyn Cache>`.
#[async_trait]
pub trait Cache: Send + Sync {
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Expiry policy for one `cachified` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CachePolicy {
    pub ttl: Option<Duration>,
    pub stale_while_revalidate: Option<Duration>,
    pub force_fresh: bool,
}

impl CachePolicy {
    pub fn new(ttl: Duration, stale_while_revalidate: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            stale_while_revalidate: Some(stale_while_revalidate),
            force_fresh: false,
        }
    }

    pub fn force_fresh(mut self, force_fresh: bool) -> Self {
        self.force_fresh = force_fresh;
        self
    }
}

/// Fetch-through cache read.
///
/// - Fresh hit: the cached value is returned as-is.
/// - Stale hit within the stale-while-revalidate window: the cached value
///   is returned immediately and a detached refresh task is spawned; the
///   caller never waits on revalidation.
/// - Miss, hard-expired entry, or failed `check`: `get_fresh` runs inline
///   and its result is written back.
/// - `force_fresh` skips the early returns but keeps the cached value as a
///   fallback.
/// - If `get_fresh` fails, a decodable cached value — even one past the
///   revalidation window — is served instead of the error; only with no
///   fallback does the error reach the caller.
///
/// Backend read/write failures are logged and treated as misses; they
/// never fail the call.
pub async fn cachified<T, E, F, Fut>(
    cache: Arc<dyn Cache>,
    key: &str,
    policy: CachePolicy,
    check: Option<fn(&serde_json::Value) -> bool>,
    get_fresh: F,
) -> Result<T, E>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    E: std::fmt::Display + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    let started = Instant::now();
    let now = now_ms();
    let mut fallback: Option<T> = None;

    match cache.get(key).await {
        Ok(Some(entry)) => {
            if let Some(value) = decode::<T>(&entry, check) {
                if !policy.force_fresh {
                    if entry.metadata.is_fresh(now) {
                        counter!("lettura_cache_hit_total", "key" => key.to_string()).increment(1);
                        record_duration(key, started);
                        return Ok(value);
                    }
                    if entry.metadata.is_within_swr(now) {
                        counter!("lettura_cache_stale_hit_total", "key" => key.to_string())
                            .increment(1);
                        spawn_revalidate(cache.clone(), key.to_string(), policy, get_fresh);
                        record_duration(key, started);
                        return Ok(value);
                    }
                }
                fallback = Some(value);
            }
        }
        Ok(None) => {}
        Err(err) => {
            warn!(
                target: "lettura::cache",
                key,
                backend = cache.name(),
                error = %err,
                "cache read failed, treating as miss",
            );
        }
    }

    counter!("lettura_cache_miss_total", "key" => key.to_string()).increment(1);
    let result = match get_fresh().await {
        Ok(value) => {
            store(cache.as_ref(), key, &policy, &value).await;
            Ok(value)
        }
        Err(err) => match fallback {
            Some(stale) => {
                warn!(
                    target: "lettura::cache",
                    key,
                    error = %err,
                    "fresh value failed, serving stale cache entry",
                );
                Ok(stale)
            }
            None => Err(err),
        },
    };
    record_duration(key, started);
    result
}

fn decode<T: DeserializeOwned>(
    entry: &CacheEntry,
    check: Option<fn(&serde_json::Value) -> bool>,
) -> Option<T> {
    if let Some(check) = check {
        if !check(&entry.value) {
            return None;
        }
    }
    serde_json::from_value(entry.value.clone()).ok()
}

async fn store<T: Serialize>(cache: &dyn Cache, key: &str, policy: &CachePolicy, value: &T) {
    let value = match serde_json::to_value(value) {
        Ok(value) => value,
        Err(err) => {
            warn!(
                target: "lettura::cache",
                key,
                error = %err,
                "cache value failed to serialize, skipping write-back",
            );
            return;
        }
    };
    let entry = CacheEntry {
        value,
        metadata: CacheMetadata::new(policy.ttl, policy.stale_while_revalidate),
    };
    if let Err(err) = cache.set(key, entry).await {
        warn!(
            target: "lettura::cache",
            key,
            backend = cache.name(),
            error = %err,
            "cache write failed",
        );
    }
}

fn spawn_revalidate<T, E, F, Fut>(cache: Arc<dyn Cache>, key: String, policy: CachePolicy, get_fresh: F)
where
    T: Serialize + Send + Sync + 'static,
    E: std::fmt::Display + Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
{
    tokio::spawn(async move {
        match get_fresh().await {
            Ok(value) => store(cache.as_ref(), &key, &policy, &value).await,
            Err(err) => {
                warn!(
                    target: "lettura::cache",
                    key = %key,
                    error = %err,
                    "background revalidation failed",
                );
            }
        }
    });
}

fn record_duration(key: &str, started: Instant) {
    histogram!("lettura_cache_lookup_ms", "key" => key.to_string())
        .record(started.elapsed().as_secs_f64() * 1000.0);
}
