//! Read tracking: the mark-as-read pipeline and read-count statistics.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::keys::CacheKey;
use crate::cache::{Cache, CachePolicy, cachified};
use crate::domain::entities::UserRecord;
use crate::domain::reader::ReaderId;
use crate::domain::slug::{self, SlugError};
use crate::domain::types::Team;

use super::notify::LeaderboardNotifier;
use super::rankings::{RankingScope, RankingService};
use super::repos::{ReadsRepo, RepoError, UsersRepo};

/// Read counts move constantly; cache them briefly and serve stale for a
/// day while revalidating.
const READ_COUNTS_TTL: Duration = Duration::minutes(1);
const READ_COUNTS_SWR: Duration = Duration::days(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkAsReadOutcome {
    /// A new read row was persisted.
    Recorded { read_id: Uuid },
    /// The reader already counted inside the dedup window; nothing stored.
    AlreadyCounted,
    /// No reader identity was supplied, so nothing could be stored.
    Anonymous,
}

#[derive(Debug, Error)]
pub enum MarkAsReadError {
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct ReadTrackingService {
    reads: Arc<dyn ReadsRepo>,
    users: Arc<dyn UsersRepo>,
    rankings: Arc<RankingService>,
    notifier: Option<Arc<LeaderboardNotifier>>,
    cache: Arc<dyn Cache>,
    dedupe_window: Duration,
}

impl ReadTrackingService {
    pub fn new(
        reads: Arc<dyn ReadsRepo>,
        users: Arc<dyn UsersRepo>,
        rankings: Arc<RankingService>,
        notifier: Option<Arc<LeaderboardNotifier>>,
        cache: Arc<dyn Cache>,
        dedupe_window: Duration,
    ) -> Self {
        Self {
            reads,
            users,
            rankings,
            notifier,
            cache,
            dedupe_window,
        }
    }

    /// The full mark-as-read pipeline.
    ///
    /// Ordering is load-bearing: leaders are captured before the write,
    /// the write is dedup-guarded, both ranking scopes are recomputed
    /// force-fresh afterwards, and only then is the leader diff taken.
    /// The recompute runs even for deduplicated (or anonymous) reads so
    /// the caches converge after out-of-band changes. Notifications are
    /// handed to detached tasks; the caller never waits on delivery.
    ///
    /// The dedup check and insert are two statements, not a transaction:
    /// two racing requests can both persist inside the window. That
    /// over-count is rare and harmless, and cheaper than a uniqueness
    /// constraint over a rolling window.
    pub async fn mark_as_read(
        &self,
        slug: &str,
        reader: Option<ReaderId>,
    ) -> Result<MarkAsReadOutcome, MarkAsReadError> {
        slug::validate(slug)?;

        let (before_post, before_site) = tokio::join!(
            self.rankings.leader(RankingScope::Post(slug), false),
            self.rankings.leader(RankingScope::Site, false),
        );
        let before_post = before_post?;
        let before_site = before_site?;

        let outcome = match &reader {
            None => MarkAsReadOutcome::Anonymous,
            Some(reader) => {
                let since = OffsetDateTime::now_utc() - self.dedupe_window;
                match self.reads.find_read_since(reader, slug, since).await? {
                    Some(_) => {
                        debug!(
                            target: "lettura::reads",
                            %reader,
                            slug,
                            "read already counted inside the dedup window",
                        );
                        MarkAsReadOutcome::AlreadyCounted
                    }
                    None => {
                        let read_id = self.reads.insert_read(reader, slug).await?;
                        counter!("lettura_reads_recorded_total").increment(1);
                        MarkAsReadOutcome::Recorded { read_id }
                    }
                }
            }
        };

        let (after_post, after_site) = tokio::join!(
            self.rankings.leader(RankingScope::Post(slug), true),
            self.rankings.leader(RankingScope::Site, true),
        );
        let after_post = after_post?;
        let after_site = after_site?;

        if let Some(notifier) = &self.notifier {
            let reader_record = match &reader {
                Some(ReaderId::User(id)) => match self.users.find_by_id(*id).await {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(
                            target: "lettura::reads",
                            user_id = %id,
                            error = %err,
                            "reader lookup failed, announcing without attribution",
                        );
                        None
                    }
                },
                _ => None,
            };

            if let Some(new_leader) = after_post {
                if before_post != Some(new_leader) {
                    spawn_post_notification(
                        notifier.clone(),
                        slug.to_string(),
                        before_post,
                        new_leader,
                        reader_record.clone(),
                    );
                }
            }
            if let Some(new_leader) = after_site {
                if before_site != Some(new_leader) {
                    spawn_overall_notification(
                        notifier.clone(),
                        slug.to_string(),
                        before_site,
                        new_leader,
                        reader_record,
                    );
                }
            }
        }

        Ok(outcome)
    }

    /// Total read count, site-wide or for one slug. Cached.
    pub async fn total_reads(&self, slug: Option<&str>) -> Result<u64, RepoError> {
        let reads = self.reads.clone();
        let owned_slug = slug.map(str::to_string);
        cachified(
            self.cache.clone(),
            &CacheKey::TotalReads(slug).render(),
            CachePolicy::new(READ_COUNTS_TTL, READ_COUNTS_SWR),
            Some(looks_like_count),
            move || async move { reads.count_reads(owned_slug.as_deref(), None).await },
        )
        .await
    }

    /// Distinct readers (signed-in plus anonymous clients). Cached.
    pub async fn reader_count(&self) -> Result<u64, RepoError> {
        let reads = self.reads.clone();
        cachified(
            self.cache.clone(),
            &CacheKey::ReaderCount.render(),
            CachePolicy::new(READ_COUNTS_TTL, READ_COUNTS_SWR),
            Some(looks_like_count),
            move || async move { reads.reader_count().await },
        )
        .await
    }
}

fn spawn_post_notification(
    notifier: Arc<LeaderboardNotifier>,
    slug: String,
    prev: Option<Team>,
    new: Team,
    reader: Option<UserRecord>,
) {
    tokio::spawn(async move {
        notifier
            .post_leader_changed(&slug, prev, new, reader.as_ref())
            .await;
    });
}

fn spawn_overall_notification(
    notifier: Arc<LeaderboardNotifier>,
    slug: String,
    prev: Option<Team>,
    new: Team,
    reader: Option<UserRecord>,
) {
    tokio::spawn(async move {
        notifier
            .overall_leader_changed(&slug, prev, new, reader.as_ref())
            .await;
    });
}

fn looks_like_count(value: &serde_json::Value) -> bool {
    value.is_u64()
}
