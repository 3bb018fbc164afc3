//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{PostRecord, UserRecord};
use crate::domain::reader::ReaderId;
use crate::domain::types::Team;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Read access to the post catalog.
#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn list_all(&self) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError>;
}

/// The post-read fact table and its aggregates.
///
/// `find_read_since` + `insert_read` compose into the dedup-guarded record
/// operation; the pair is deliberately not transactional, so two racing
/// inserts inside the window can both land (accepted, see the service).
#[async_trait]
pub trait ReadsRepo: Send + Sync {
    async fn find_read_since(
        &self,
        reader: &ReaderId,
        slug: &str,
        since: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepoError>;

    async fn insert_read(&self, reader: &ReaderId, slug: &str) -> Result<Uuid, RepoError>;

    /// Total reads, optionally scoped to a slug and/or a team.
    async fn count_reads(&self, slug: Option<&str>, team: Option<Team>)
    -> Result<u64, RepoError>;

    /// Reads by one team's members since `since`, optionally slug-scoped.
    async fn count_recent_reads(
        &self,
        slug: Option<&str>,
        team: Team,
        since: OffsetDateTime,
    ) -> Result<u64, RepoError>;

    /// Team members with at least one read since `since`.
    async fn count_active_members(
        &self,
        team: Team,
        since: OffsetDateTime,
    ) -> Result<u64, RepoError>;

    async fn distinct_read_slugs(&self, reader: &ReaderId) -> Result<Vec<String>, RepoError>;

    /// Every read slug ordered by total read count descending.
    async fn popular_post_slugs(&self) -> Result<Vec<String>, RepoError>;

    /// Distinct signed-in readers plus distinct anonymous clients.
    async fn reader_count(&self) -> Result<u64, RepoError>;
}

/// Reader account lookups (used for notification mentions and team
/// attribution only; accounts are managed elsewhere).
#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;
}

/// Liveness probe against the backing store.
#[async_trait]
pub trait HealthRepo: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}
