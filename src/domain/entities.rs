//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::types::{PostStatus, Team};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    pub description: String,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub status: PostStatus,
    pub unlisted: bool,
    pub published_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl PostRecord {
    /// Listed posts are the only ones that appear in public listings and
    /// recommendation pools.
    pub fn is_listed(&self) -> bool {
        matches!(self.status, PostStatus::Published) && !self.unlisted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub discord_id: Option<String>,
    pub team: Team,
    pub created_at: OffsetDateTime,
}
