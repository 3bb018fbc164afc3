//! The mark-as-read pipeline: dedup law, ranking refresh, notifications.

mod support;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use time::Duration;

use lettura::application::notify::LeaderboardNotifier;
use lettura::application::rankings::{RankingService, RankingWindows};
use lettura::application::reads::{MarkAsReadError, MarkAsReadOutcome, ReadTrackingService};
use lettura::cache::{Cache, MemoryCache};
use lettura::domain::entities::UserRecord;
use lettura::domain::reader::ReaderId;
use lettura::domain::types::Team;
use support::{FakeReadsRepo, FakeUsersRepo, RecordingChat, make_user, wait_until};

const DEDUPE_WINDOW: Duration = Duration::days(7);

struct Harness {
    reads: Arc<FakeReadsRepo>,
    chat: Arc<RecordingChat>,
    tracking: ReadTrackingService,
}

fn harness(reads: Arc<FakeReadsRepo>, user: Option<UserRecord>) -> Harness {
    let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(
        NonZeroUsize::new(256).expect("capacity"),
    ));
    let rankings = Arc::new(RankingService::new(
        reads.clone(),
        cache.clone(),
        RankingWindows::default(),
    ));
    let chat = Arc::new(RecordingChat::new());
    let notifier = Arc::new(LeaderboardNotifier::new(
        chat.clone(),
        "leaderboard".to_string(),
        "https://example.com/blog".to_string(),
    ));
    let users = match user {
        Some(user) => FakeUsersRepo::with(user),
        None => FakeUsersRepo::default(),
    };
    let tracking = ReadTrackingService::new(
        reads.clone(),
        Arc::new(users),
        rankings,
        Some(notifier),
        cache,
        DEDUPE_WINDOW,
    );
    Harness {
        reads,
        chat,
        tracking,
    }
}

#[tokio::test]
async fn reads_deduplicate_within_a_week_and_count_again_after() {
    let user = make_user(Team::Blue);
    let reader = ReaderId::User(user.id);
    let reads = Arc::new(FakeReadsRepo::new().with_user(user.id, Team::Blue));
    let h = harness(reads, Some(user));

    let first = h
        .tracking
        .mark_as_read("p1", Some(reader.clone()))
        .await
        .expect("first");
    assert!(matches!(first, MarkAsReadOutcome::Recorded { .. }));
    assert_eq!(h.reads.event_count("p1"), 1);

    // Same reader, same week: a no-op, not an error.
    let second = h
        .tracking
        .mark_as_read("p1", Some(reader.clone()))
        .await
        .expect("second");
    assert_eq!(second, MarkAsReadOutcome::AlreadyCounted);
    assert_eq!(h.reads.event_count("p1"), 1);

    // Eight days later the same read counts again.
    h.reads.backdate(&reader, "p1", Duration::days(8));
    let third = h
        .tracking
        .mark_as_read("p1", Some(reader))
        .await
        .expect("third");
    assert!(matches!(third, MarkAsReadOutcome::Recorded { .. }));
    assert_eq!(h.reads.event_count("p1"), 2);
}

#[tokio::test]
async fn anonymous_requests_record_nothing_but_still_refresh_rankings() {
    let reads = Arc::new(FakeReadsRepo::new());
    let h = harness(reads, None);

    let outcome = h
        .tracking
        .mark_as_read("p1", None)
        .await
        .expect("anonymous");
    assert_eq!(outcome, MarkAsReadOutcome::Anonymous);
    assert_eq!(h.reads.event_count("p1"), 0);

    // The forced recompute still ran for both scopes.
    assert!(h.reads.call_count("count_recent_reads") >= 2 * Team::ALL.len());
}

#[tokio::test]
async fn invalid_slug_is_rejected_before_any_side_effect() {
    let reads = Arc::new(FakeReadsRepo::new());
    let h = harness(reads, None);

    let err = h
        .tracking
        .mark_as_read("Not A Slug", Some(ReaderId::Client("c1".to_string())))
        .await
        .unwrap_err();
    assert!(matches!(err, MarkAsReadError::Slug(_)));
    assert_eq!(h.reads.event_count("Not A Slug"), 0);
    assert_eq!(h.reads.call_count("count_recent_reads"), 0);
    assert_eq!(h.reads.call_count("insert_read"), 0);
}

#[tokio::test]
async fn first_leader_triggers_post_and_site_notifications() {
    let user = make_user(Team::Blue);
    let reader = ReaderId::User(user.id);
    let reads = Arc::new(FakeReadsRepo::new().with_user(user.id, Team::Blue));
    let h = harness(reads, Some(user));

    // No reads yet: neither scope has a leader. This read makes BLUE the
    // first leader of both.
    let outcome = h
        .tracking
        .mark_as_read("p1", Some(reader))
        .await
        .expect("read");
    assert!(matches!(outcome, MarkAsReadOutcome::Recorded { .. }));

    let delivered = wait_until(
        || h.chat.messages().len() == 2,
        StdDuration::from_secs(2),
    )
    .await;
    assert!(delivered, "expected two leaderboard announcements");

    let messages = h.chat.messages();
    assert!(messages.iter().all(|(channel, _)| channel == "leaderboard"));
    let post_message = messages
        .iter()
        .find(|(_, content)| content.contains("claimed the post"))
        .expect("post-level announcement");
    assert!(post_message.1.contains("https://example.com/blog/p1"));
    assert!(post_message.1.contains("the 🔵 blue team"));
    let site_message = messages
        .iter()
        .find(|(_, content)| content.contains("to the top of the leader board"))
        .expect("site-level announcement");
    assert!(site_message.1.contains("<@!424242>"));
}

#[tokio::test]
async fn unchanged_leader_stays_silent() {
    let user = make_user(Team::Blue);
    let reader = ReaderId::User(user.id);
    let reads = Arc::new(FakeReadsRepo::new().with_user(user.id, Team::Blue));
    let h = harness(reads, Some(user));

    h.tracking
        .mark_as_read("p1", Some(reader.clone()))
        .await
        .expect("first");
    let delivered = wait_until(
        || h.chat.messages().len() == 2,
        StdDuration::from_secs(2),
    )
    .await;
    assert!(delivered);

    // A second read by the same team cannot change the leader, so no new
    // announcements go out.
    h.reads.backdate(&reader, "p1", Duration::days(8));
    h.tracking
        .mark_as_read("p1", Some(reader))
        .await
        .expect("second");
    tokio::time::sleep(StdDuration::from_millis(100)).await;
    assert_eq!(h.chat.messages().len(), 2);
}

#[tokio::test]
async fn deduplicated_read_still_refreshes_rankings() {
    let user = make_user(Team::Blue);
    let reader = ReaderId::User(user.id);
    let reads = Arc::new(FakeReadsRepo::new().with_user(user.id, Team::Blue));
    let h = harness(reads, Some(user));

    h.tracking
        .mark_as_read("p1", Some(reader.clone()))
        .await
        .expect("first");
    let before = h.reads.call_count("count_recent_reads");

    h.tracking
        .mark_as_read("p1", Some(reader))
        .await
        .expect("second");
    // Both scopes recompute force-fresh even though nothing was stored.
    assert!(h.reads.call_count("count_recent_reads") >= before + 2 * Team::ALL.len());
}
