//! Leaderboard change announcements.
//!
//! Holds no state of its own: given the leaders before and after a read
//! event, it formats one of a handful of message templates and hands the
//! text to a [`ChatNotifier`]. Dispatch failures are logged and never
//! reach the request that triggered them.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::warn;

use crate::domain::entities::UserRecord;
use crate::domain::types::Team;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("chat dispatch failed: {0}")]
    Dispatch(String),
}

/// Outbound chat channel (Discord in production, a recorder in tests).
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), NotifyError>;
}

#[derive(Clone)]
pub struct LeaderboardNotifier {
    chat: Arc<dyn ChatNotifier>,
    channel_id: String,
    blog_base_url: String,
}

impl LeaderboardNotifier {
    pub fn new(chat: Arc<dyn ChatNotifier>, channel_id: String, blog_base_url: String) -> Self {
        Self {
            chat,
            channel_id,
            blog_base_url: blog_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Announce a per-post leader change. Anonymous first-time claims are
    /// intentionally silent: with no previous holder and nobody to credit
    /// there is nothing worth posting.
    pub async fn post_leader_changed(
        &self,
        slug: &str,
        prev: Option<Team>,
        new: Team,
        reader: Option<&UserRecord>,
    ) {
        let url = self.post_url(slug);
        if let Some(content) = post_leader_message(&url, prev, new, reader) {
            self.dispatch(content).await;
        }
    }

    /// Announce a site-wide leader change.
    pub async fn overall_leader_changed(
        &self,
        slug: &str,
        prev: Option<Team>,
        new: Team,
        reader: Option<&UserRecord>,
    ) {
        let url = self.post_url(slug);
        self.dispatch(overall_leader_message(&url, prev, new, reader))
            .await;
    }

    fn post_url(&self, slug: &str) -> String {
        format!("{}/{slug}", self.blog_base_url)
    }

    async fn dispatch(&self, content: String) {
        match self.chat.send_message(&self.channel_id, &content).await {
            Ok(()) => {
                counter!("lettura_notify_sent_total").increment(1);
            }
            Err(err) => {
                counter!("lettura_notify_failed_total").increment(1);
                warn!(
                    target: "lettura::notify",
                    channel = %self.channel_id,
                    error = %err,
                    "leaderboard notification failed",
                );
            }
        }
    }
}

fn team_mention(team: Team) -> String {
    format!("the {} {} team", team.emoji(), team)
}

fn reader_mention(reader: &UserRecord) -> String {
    match &reader.discord_id {
        Some(discord_id) => format!("<@!{discord_id}>"),
        None => reader
            .display_name
            .clone()
            .unwrap_or_else(|| reader.username.clone()),
    }
}

fn post_leader_message(
    url: &str,
    prev: Option<Team>,
    new: Team,
    reader: Option<&UserRecord>,
) -> Option<String> {
    let new_mention = team_mention(new);
    match (prev, reader) {
        (Some(prev), Some(reader)) if reader.team == new => {
            let cause = format!(
                "{} just read {url} and won the post from {} for {new_mention}!",
                reader_mention(reader),
                team_mention(prev),
            );
            Some(format!(
                "🎉 Congratulations to {new_mention}! You've won a post!\n\n{cause}"
            ))
        }
        (Some(prev), reader) => {
            let who = match reader {
                Some(reader) => format!(
                    "Someone on the {} {} team",
                    reader.team.emoji(),
                    reader.team
                ),
                None => "An anonymous user".to_string(),
            };
            let cause = format!(
                "{who} just read {url} and triggered a recalculation of the rankings: {} lost the post and it's now claimed by {new_mention}!",
                team_mention(prev),
            );
            Some(format!(
                "🎉 Congratulations to {new_mention}! You've won a post!\n\n{cause}"
            ))
        }
        (None, Some(reader)) => Some(format!(
            "Congratulations to {new_mention}! You've won a post!\n\n{} just read {url} and claimed the post for {new_mention}!",
            reader_mention(reader),
        )),
        (None, None) => None,
    }
}

fn overall_leader_message(
    url: &str,
    prev: Option<Team>,
    new: Team,
    reader: Option<&UserRecord>,
) -> String {
    let cause = match reader {
        Some(reader) => format!("{} just read {url}", reader_mention(reader)),
        None => format!("An anonymous user just read {url} triggering a ranking recalculation"),
    };
    match prev {
        Some(prev) => format!(
            "🎉 Congratulations to {}! {cause} and knocked {} off the top of the leader board! 👏",
            team_mention(new),
            team_mention(prev),
        ),
        None => format!(
            "🎉 Congratulations to {}! {cause} and took the {} team to the top of the leader board! 👏",
            team_mention(new),
            new,
        ),
    }
}
