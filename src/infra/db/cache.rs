//! Durable cache backend over the `cache_entries` table.
//!
//! Every instance reads and writes the same table, so this tier is the
//! shared source of truth across restarts and replicas; staleness control
//! lives entirely in the entry metadata.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::FromRow;
use tracing::warn;

use crate::cache::{Cache, CacheEntry, CacheError, CacheMetadata};

use super::PostgresRepositories;

const BACKEND: &str = "postgres";

pub struct PgCache {
    db: Arc<PostgresRepositories>,
}

impl PgCache {
    pub fn new(db: Arc<PostgresRepositories>) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromRow)]
struct CacheRow {
    value: serde_json::Value,
    metadata: serde_json::Value,
}

#[async_trait]
impl Cache for PgCache {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let row: Option<CacheRow> =
            sqlx::query_as("SELECT value, metadata FROM cache_entries WHERE key = $1")
                .bind(key)
                .fetch_optional(self.db.pool())
                .await
                .map_err(|err| CacheError::backend(BACKEND, err.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        match serde_json::from_value::<CacheMetadata>(row.metadata) {
            Ok(metadata) => Ok(Some(CacheEntry {
                value: row.value,
                metadata,
            })),
            Err(err) => {
                // Unreadable metadata means the entry predates a format
                // change; treat it as a miss rather than an error.
                warn!(
                    target: "lettura::cache",
                    key,
                    error = %err,
                    "discarding cache entry with unreadable metadata",
                );
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let metadata = serde_json::to_value(entry.metadata)
            .map_err(|err| CacheError::backend(BACKEND, err.to_string()))?;

        sqlx::query(
            "INSERT INTO cache_entries (key, value, metadata, updated_at) \
             VALUES ($1, $2, $3, now()) \
             ON CONFLICT (key) DO UPDATE SET \
                 value = EXCLUDED.value, metadata = EXCLUDED.metadata, updated_at = now()",
        )
        .bind(key)
        .bind(entry.value)
        .bind(metadata)
        .execute(self.db.pool())
        .await
        .map(|_| ())
        .map_err(|err| CacheError::backend(BACKEND, err.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        sqlx::query("DELETE FROM cache_entries WHERE key = $1")
            .bind(key)
            .execute(self.db.pool())
            .await
            .map(|_| ())
            .map_err(|err| CacheError::backend(BACKEND, err.to_string()))
    }
}
