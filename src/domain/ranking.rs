//! Ranking math for the team leaderboard.
//!
//! A team's score is its recent read count divided by its active-member
//! count; scores are min-max normalized into a `percent` for display.
//! Everything here is pure so the cached snapshot can be recomputed and
//! verified without touching storage.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::domain::types::Team;

/// One leaderboard entry for a single team within one snapshot scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRank {
    pub team: Team,
    pub total_reads: u64,
    pub ranking: f64,
    pub percent: f64,
}

/// Raw aggregate counts for one team, as produced by the read store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamReadStats {
    pub team: Team,
    pub total_reads: u64,
    pub active_members: u64,
    pub recent_reads: u64,
}

/// Per-member read rate, rounded to four decimals. A team with no active
/// members scores zero rather than dividing by zero.
pub fn score(recent_reads: u64, active_members: u64) -> f64 {
    if active_members == 0 {
        return 0.0;
    }
    round_to(recent_reads as f64 / active_members as f64, 4)
}

/// Build the full snapshot: score every team, then min-max normalize the
/// scores into `percent` (two decimals). When every team scores the same,
/// the denominator floors at one and every `percent` is zero.
pub fn build_rankings(stats: &[TeamReadStats]) -> Vec<TeamRank> {
    let rankings: Vec<f64> = stats
        .iter()
        .map(|s| score(s.recent_reads, s.active_members))
        .collect();
    let max = rankings.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = rankings.iter().copied().fold(f64::INFINITY, f64::min);
    let denom = if max > min { max - min } else { 1.0 };

    stats
        .iter()
        .zip(rankings)
        .map(|(s, ranking)| TeamRank {
            team: s.team,
            total_reads: s.total_reads,
            ranking,
            percent: round_to((ranking - min) / denom, 2),
        })
        .collect()
}

/// Order a snapshot for display: `percent` descending, then an explicit
/// shuffle of each equal-`percent` run. Ties carry no signal, so their
/// relative order is freshly randomized on every call; the randomness
/// stays out of the comparator so the sort itself remains stable.
pub fn sort_for_display(ranks: &mut [TeamRank]) {
    ranks.sort_by(|a, b| b.percent.total_cmp(&a.percent));

    let mut rng = rand::rng();
    let mut start = 0;
    while start < ranks.len() {
        let mut end = start + 1;
        while end < ranks.len() && ranks[end].percent == ranks[start].percent {
            end += 1;
        }
        ranks[start..end].shuffle(&mut rng);
        start = end;
    }
}

/// The current leader: the first entry with the strictly highest positive
/// `ranking`. Entries with a non-positive ranking can never lead, so an
/// all-zero snapshot has no leader.
pub fn ranking_leader(ranks: &[TeamRank]) -> Option<&TeamRank> {
    ranks.iter().fold(None, |leader, rank| {
        if rank.ranking <= 0.0 {
            return leader;
        }
        match leader {
            None => Some(rank),
            Some(current) if rank.ranking > current.ranking => Some(rank),
            other => other,
        }
    })
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
