//! Shared test doubles: in-memory repositories and a recording chat sink.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use lettura::application::notify::{ChatNotifier, NotifyError};
use lettura::application::repos::{
    HealthRepo, PostsRepo, ReadsRepo, RepoError, UsersRepo,
};
use lettura::domain::entities::{PostRecord, UserRecord};
use lettura::domain::reader::ReaderId;
use lettura::domain::types::{PostStatus, Team};

#[derive(Debug, Clone)]
pub struct ReadEvent {
    pub id: Uuid,
    pub slug: String,
    pub reader: ReaderId,
    pub created_at: OffsetDateTime,
}

/// In-memory stand-in for the post_reads table. Aggregates are derived
/// from the stored events plus a user → team map; active-member counts can
/// be pinned per team when a test needs exact ranking inputs.
#[derive(Default)]
pub struct FakeReadsRepo {
    pub events: Mutex<Vec<ReadEvent>>,
    pub user_teams: Mutex<HashMap<Uuid, Team>>,
    pub active_members_override: Mutex<HashMap<Team, u64>>,
    pub popular: Mutex<Vec<String>>,
    pub calls: Mutex<Vec<&'static str>>,
}

impl FakeReadsRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: Uuid, team: Team) -> Self {
        self.user_teams.lock().unwrap().insert(id, team);
        self
    }

    pub fn with_popular(self, slugs: &[&str]) -> Self {
        *self.popular.lock().unwrap() = slugs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn set_active_members(&self, team: Team, count: u64) {
        self.active_members_override
            .lock()
            .unwrap()
            .insert(team, count);
    }

    /// Shift every event for `(reader, slug)` into the past.
    pub fn backdate(&self, reader: &ReaderId, slug: &str, by: Duration) {
        let mut events = self.events.lock().unwrap();
        for event in events.iter_mut() {
            if &event.reader == reader && event.slug == slug {
                event.created_at -= by;
            }
        }
    }

    pub fn event_count(&self, slug: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.slug == slug)
            .count()
    }

    pub fn call_count(&self, name: &'static str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|called| **called == name)
            .count()
    }

    fn log(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }

    fn team_of(&self, reader: &ReaderId) -> Option<Team> {
        match reader {
            ReaderId::User(id) => self.user_teams.lock().unwrap().get(id).copied(),
            ReaderId::Client(_) => None,
        }
    }
}

#[async_trait]
impl ReadsRepo for FakeReadsRepo {
    async fn find_read_since(
        &self,
        reader: &ReaderId,
        slug: &str,
        since: OffsetDateTime,
    ) -> Result<Option<Uuid>, RepoError> {
        self.log("find_read_since");
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|event| {
                &event.reader == reader && event.slug == slug && event.created_at > since
            })
            .map(|event| event.id))
    }

    async fn insert_read(&self, reader: &ReaderId, slug: &str) -> Result<Uuid, RepoError> {
        self.log("insert_read");
        let id = Uuid::new_v4();
        self.events.lock().unwrap().push(ReadEvent {
            id,
            slug: slug.to_string(),
            reader: reader.clone(),
            created_at: OffsetDateTime::now_utc(),
        });
        Ok(id)
    }

    async fn count_reads(
        &self,
        slug: Option<&str>,
        team: Option<Team>,
    ) -> Result<u64, RepoError> {
        self.log("count_reads");
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| slug.is_none_or(|slug| event.slug == slug))
            .filter(|event| team.is_none_or(|team| self.team_of(&event.reader) == Some(team)))
            .count() as u64)
    }

    async fn count_recent_reads(
        &self,
        slug: Option<&str>,
        team: Team,
        since: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        self.log("count_recent_reads");
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| slug.is_none_or(|slug| event.slug == slug))
            .filter(|event| event.created_at > since)
            .filter(|event| self.team_of(&event.reader) == Some(team))
            .count() as u64)
    }

    async fn count_active_members(
        &self,
        team: Team,
        since: OffsetDateTime,
    ) -> Result<u64, RepoError> {
        self.log("count_active_members");
        if let Some(count) = self.active_members_override.lock().unwrap().get(&team) {
            return Ok(*count);
        }
        let events = self.events.lock().unwrap();
        let members: HashSet<Uuid> = events
            .iter()
            .filter(|event| event.created_at > since)
            .filter_map(|event| event.reader.user_id())
            .filter(|id| self.user_teams.lock().unwrap().get(id) == Some(&team))
            .collect();
        Ok(members.len() as u64)
    }

    async fn distinct_read_slugs(&self, reader: &ReaderId) -> Result<Vec<String>, RepoError> {
        self.log("distinct_read_slugs");
        let mut seen = HashSet::new();
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| &event.reader == reader)
            .filter(|event| seen.insert(event.slug.clone()))
            .map(|event| event.slug.clone())
            .collect())
    }

    async fn popular_post_slugs(&self) -> Result<Vec<String>, RepoError> {
        self.log("popular_post_slugs");
        Ok(self.popular.lock().unwrap().clone())
    }

    async fn reader_count(&self) -> Result<u64, RepoError> {
        self.log("reader_count");
        let events = self.events.lock().unwrap();
        let users: HashSet<Uuid> = events
            .iter()
            .filter_map(|event| event.reader.user_id())
            .collect();
        let clients: HashSet<String> = events
            .iter()
            .filter_map(|event| match &event.reader {
                ReaderId::Client(token) => Some(token.clone()),
                ReaderId::User(_) => None,
            })
            .collect();
        Ok((users.len() + clients.len()) as u64)
    }
}

#[derive(Default)]
pub struct FakePostsRepo {
    pub posts: Vec<PostRecord>,
}

impl FakePostsRepo {
    pub fn new(posts: Vec<PostRecord>) -> Self {
        Self { posts }
    }
}

#[async_trait]
impl PostsRepo for FakePostsRepo {
    async fn list_all(&self) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.posts.clone())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<PostRecord>, RepoError> {
        Ok(self.posts.iter().find(|post| post.slug == slug).cloned())
    }
}

#[derive(Default)]
pub struct FakeUsersRepo {
    pub users: HashMap<Uuid, UserRecord>,
}

impl FakeUsersRepo {
    pub fn with(user: UserRecord) -> Self {
        let mut users = HashMap::new();
        users.insert(user.id, user);
        Self { users }
    }
}

#[async_trait]
impl UsersRepo for FakeUsersRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self.users.get(&id).cloned())
    }
}

pub struct FakeHealthRepo;

#[async_trait]
impl HealthRepo for FakeHealthRepo {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

/// Chat sink that records every message instead of sending it.
#[derive(Default)]
pub struct RecordingChat {
    pub messages: Mutex<Vec<(String, String)>>,
}

impl RecordingChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatNotifier for RecordingChat {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap()
            .push((channel_id.to_string(), content.to_string()));
        Ok(())
    }
}

pub fn make_post(slug: &str, title: &str) -> PostRecord {
    let now = OffsetDateTime::now_utc();
    PostRecord {
        id: Uuid::new_v4(),
        slug: slug.to_string(),
        title: title.to_string(),
        description: String::new(),
        categories: Vec::new(),
        keywords: Vec::new(),
        status: PostStatus::Published,
        unlisted: false,
        published_at: Some(now),
        created_at: now,
        updated_at: now,
    }
}

pub fn make_user(team: Team) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        username: "ada".to_string(),
        display_name: Some("Ada".to_string()),
        discord_id: Some("424242".to_string()),
        team,
        created_at: OffsetDateTime::now_utc(),
    }
}

/// Poll until `probe` returns true or the timeout elapses; background
/// notification tasks have no join handle to await.
pub async fn wait_until(probe: impl Fn() -> bool, timeout: StdDuration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if probe() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
}
