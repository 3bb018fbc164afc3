//! Team read-ranking computation, cached with tiered TTLs.

use std::sync::Arc;

use futures::future;
use time::{Duration, OffsetDateTime};

use crate::cache::keys::CacheKey;
use crate::cache::{Cache, CachePolicy, cachified};
use crate::domain::ranking::{self, TeamRank, TeamReadStats};
use crate::domain::types::Team;

use super::repos::{ReadsRepo, RepoError};

/// Site snapshots go stale quickly; per-post snapshots barely move, so
/// they keep a much longer hard TTL. Both serve stale for a day while
/// revalidating.
const SITE_RANKINGS_TTL: Duration = Duration::hours(1);
const POST_RANKINGS_TTL: Duration = Duration::days(7);
const RANKINGS_SWR: Duration = Duration::days(1);

/// Which snapshot a ranking read targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankingScope<'a> {
    Site,
    Post(&'a str),
}

impl<'a> RankingScope<'a> {
    pub fn slug(&self) -> Option<&'a str> {
        match self {
            RankingScope::Site => None,
            RankingScope::Post(slug) => Some(slug),
        }
    }

    fn cache_key(&self) -> String {
        match self {
            RankingScope::Site => CacheKey::SiteRankings.render(),
            RankingScope::Post(slug) => CacheKey::PostRankings(slug).render(),
        }
    }

    fn ttl(&self) -> Duration {
        match self {
            RankingScope::Site => SITE_RANKINGS_TTL,
            RankingScope::Post(_) => POST_RANKINGS_TTL,
        }
    }
}

/// Aggregation windows for the ranking formula.
#[derive(Debug, Clone, Copy)]
pub struct RankingWindows {
    /// Reads inside this window count toward a team's score.
    pub recent_reads: Duration,
    /// Members with a read inside this window count as active.
    pub active_members: Duration,
}

impl Default for RankingWindows {
    fn default() -> Self {
        Self {
            recent_reads: Duration::days(183),
            active_members: Duration::days(365),
        }
    }
}

#[derive(Clone)]
pub struct RankingService {
    reads: Arc<dyn ReadsRepo>,
    cache: Arc<dyn Cache>,
    windows: RankingWindows,
}

impl RankingService {
    pub fn new(reads: Arc<dyn ReadsRepo>, cache: Arc<dyn Cache>, windows: RankingWindows) -> Self {
        Self {
            reads,
            cache,
            windows,
        }
    }

    /// Current snapshot for the scope, ordered for display. The cached
    /// value is the unordered snapshot; sorting (and the tie shuffle)
    /// happens per call.
    pub async fn read_rankings(
        &self,
        scope: RankingScope<'_>,
        force_fresh: bool,
    ) -> Result<Vec<TeamRank>, RepoError> {
        let key = scope.cache_key();
        let reads = self.reads.clone();
        let slug = scope.slug().map(str::to_string);
        let windows = self.windows;

        let mut ranks: Vec<TeamRank> = cachified(
            self.cache.clone(),
            &key,
            CachePolicy::new(scope.ttl(), RANKINGS_SWR).force_fresh(force_fresh),
            Some(looks_like_rankings),
            move || async move { compute_rankings(reads, slug.as_deref(), windows).await },
        )
        .await?;

        ranking::sort_for_display(&mut ranks);
        Ok(ranks)
    }

    /// The scope's current leading team, if any team leads at all.
    pub async fn leader(
        &self,
        scope: RankingScope<'_>,
        force_fresh: bool,
    ) -> Result<Option<Team>, RepoError> {
        let ranks = self.read_rankings(scope, force_fresh).await?;
        Ok(ranking::ranking_leader(&ranks).map(|rank| rank.team))
    }
}

async fn compute_rankings(
    reads: Arc<dyn ReadsRepo>,
    slug: Option<&str>,
    windows: RankingWindows,
) -> Result<Vec<TeamRank>, RepoError> {
    let now = OffsetDateTime::now_utc();
    let recent_since = now - windows.recent_reads;
    let active_since = now - windows.active_members;

    let stats = future::try_join_all(Team::ALL.iter().map(|&team| {
        let reads = reads.clone();
        async move {
            let total_reads = reads.count_reads(slug, Some(team)).await?;
            let active_members = reads.count_active_members(team, active_since).await?;
            let recent_reads = reads.count_recent_reads(slug, team, recent_since).await?;
            Ok::<_, RepoError>(TeamReadStats {
                team,
                total_reads,
                active_members,
                recent_reads,
            })
        }
    }))
    .await?;

    Ok(ranking::build_rankings(&stats))
}

/// Cached-value shape check: an array of objects that all carry a `team`
/// field. Anything else is treated as a miss and recomputed.
fn looks_like_rankings(value: &serde_json::Value) -> bool {
    value
        .as_array()
        .is_some_and(|entries| entries.iter().all(|entry| entry.get("team").is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_check_accepts_snapshots_only() {
        let good = serde_json::json!([
            {"team": "red", "total_reads": 0, "ranking": 0.0, "percent": 0.0}
        ]);
        assert!(looks_like_rankings(&good));
        assert!(looks_like_rankings(&serde_json::json!([])));
        assert!(!looks_like_rankings(&serde_json::json!("rankings")));
        assert!(!looks_like_rankings(&serde_json::json!([{"club": "red"}])));
    }
}
