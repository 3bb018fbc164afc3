//! Ranking service behavior over an in-memory read store.

mod support;

use std::num::NonZeroUsize;
use std::sync::Arc;

use uuid::Uuid;

use lettura::application::rankings::{RankingScope, RankingService, RankingWindows};
use lettura::application::repos::ReadsRepo;
use lettura::cache::{Cache, MemoryCache};
use lettura::domain::reader::ReaderId;
use lettura::domain::types::Team;
use support::FakeReadsRepo;

fn service(reads: Arc<FakeReadsRepo>) -> RankingService {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(
        NonZeroUsize::new(64).expect("capacity"),
    ));
    RankingService::new(reads, cache, RankingWindows::default())
}

/// Seed `count` reads of `slug` by one member of `team`.
async fn seed_reads(reads: &FakeReadsRepo, team: Team, slug: &str, count: usize) -> Uuid {
    let member = Uuid::new_v4();
    reads.user_teams.lock().unwrap().insert(member, team);
    let reader = ReaderId::User(member);
    for _ in 0..count {
        reads.insert_read(&reader, slug).await.expect("insert");
    }
    member
}

#[tokio::test]
async fn normalizes_team_scores_and_derives_leader() {
    let reads = Arc::new(FakeReadsRepo::new());
    seed_reads(&reads, Team::Red, "p1", 5).await;
    seed_reads(&reads, Team::Blue, "p1", 4).await;
    reads.set_active_members(Team::Red, 10);
    reads.set_active_members(Team::Blue, 4);
    reads.set_active_members(Team::Yellow, 0);

    let service = service(reads.clone());
    let ranks = service
        .read_rankings(RankingScope::Site, false)
        .await
        .expect("rankings");

    assert_eq!(ranks.len(), Team::ALL.len());
    let by_team = |team: Team| {
        ranks
            .iter()
            .find(|rank| rank.team == team)
            .unwrap_or_else(|| panic!("missing {team}"))
    };

    // RED: 5 / 10 = 0.5; BLUE: 4 / 4 = 1.0; YELLOW: no active members.
    assert_eq!(by_team(Team::Red).ranking, 0.5);
    assert_eq!(by_team(Team::Blue).ranking, 1.0);
    assert_eq!(by_team(Team::Yellow).ranking, 0.0);
    assert_eq!(by_team(Team::Blue).percent, 1.0);
    assert_eq!(by_team(Team::Yellow).percent, 0.0);
    assert!(ranks.iter().all(|r| (0.0..=1.0).contains(&r.percent)));

    // Display order leads with the highest percent.
    assert_eq!(ranks[0].team, Team::Blue);

    let leader = service
        .leader(RankingScope::Site, false)
        .await
        .expect("leader");
    assert_eq!(leader, Some(Team::Blue));
}

#[tokio::test]
async fn no_positive_scores_means_no_leader() {
    let reads = Arc::new(FakeReadsRepo::new());
    reads.set_active_members(Team::Red, 5);
    reads.set_active_members(Team::Blue, 5);
    reads.set_active_members(Team::Yellow, 5);

    let service = service(reads);
    let leader = service
        .leader(RankingScope::Site, false)
        .await
        .expect("leader");
    assert_eq!(leader, None);
}

#[tokio::test]
async fn snapshots_are_cached_per_scope() {
    let reads = Arc::new(FakeReadsRepo::new());
    let service = service(reads.clone());

    service
        .read_rankings(RankingScope::Site, false)
        .await
        .expect("first");
    let after_first = reads.call_count("count_recent_reads");
    assert_eq!(after_first, Team::ALL.len());

    // Second read is a cache hit: no new aggregate queries.
    service
        .read_rankings(RankingScope::Site, false)
        .await
        .expect("second");
    assert_eq!(reads.call_count("count_recent_reads"), after_first);

    // A different scope computes its own snapshot.
    service
        .read_rankings(RankingScope::Post("p1"), false)
        .await
        .expect("post scope");
    assert_eq!(
        reads.call_count("count_recent_reads"),
        after_first + Team::ALL.len()
    );
}

#[tokio::test]
async fn force_fresh_recomputes_and_updates_the_snapshot() {
    let reads = Arc::new(FakeReadsRepo::new());
    let service = service(reads.clone());

    let before = service
        .read_rankings(RankingScope::Site, false)
        .await
        .expect("before");
    assert!(before.iter().all(|rank| rank.ranking == 0.0));

    // New reads arrive; the cached snapshot does not see them...
    seed_reads(&reads, Team::Yellow, "p1", 3).await;
    let cached = service
        .read_rankings(RankingScope::Site, false)
        .await
        .expect("cached");
    assert!(cached.iter().all(|rank| rank.ranking == 0.0));

    // ...until a forced refresh recomputes the scope.
    let fresh = service
        .read_rankings(RankingScope::Site, true)
        .await
        .expect("fresh");
    let yellow = fresh
        .iter()
        .find(|rank| rank.team == Team::Yellow)
        .expect("yellow");
    assert!(yellow.ranking > 0.0);

    let leader = service
        .leader(RankingScope::Site, false)
        .await
        .expect("leader");
    assert_eq!(leader, Some(Team::Yellow));
}

#[tokio::test]
async fn post_scope_only_counts_reads_of_that_post() {
    let reads = Arc::new(FakeReadsRepo::new());
    seed_reads(&reads, Team::Red, "p1", 4).await;
    seed_reads(&reads, Team::Blue, "p2", 9).await;

    let service = service(reads.clone());
    let ranks = service
        .read_rankings(RankingScope::Post("p1"), false)
        .await
        .expect("rankings");

    let red = ranks.iter().find(|r| r.team == Team::Red).expect("red");
    let blue = ranks.iter().find(|r| r.team == Team::Blue).expect("blue");
    assert_eq!(red.total_reads, 4);
    assert_eq!(blue.total_reads, 0);
    assert!(red.ranking > 0.0);
}
