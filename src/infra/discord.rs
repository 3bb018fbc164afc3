//! Discord chat adapter.
//!
//! Sends channel messages as a bot account through the Discord REST API.
//! The caller decides what failure means; the leaderboard notifier logs
//! and drops them.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use url::Url;

use crate::application::notify::{ChatNotifier, NotifyError};
use crate::config::DiscordSettings;
use crate::infra::error::InfraError;

pub struct DiscordBot {
    client: Client,
    api_base: Url,
    bot_token: String,
}

impl DiscordBot {
    pub fn new(settings: &DiscordSettings) -> Result<Self, InfraError> {
        let api_base = Url::parse(&settings.api_base).map_err(|err| {
            InfraError::configuration(format!(
                "invalid discord api base `{}`: {err}",
                settings.api_base
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds.get()))
            .build()
            .map_err(|err| {
                InfraError::configuration(format!("failed to build discord http client: {err}"))
            })?;

        Ok(Self {
            client,
            api_base,
            bot_token: settings.bot_token.clone(),
        })
    }
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    content: &'a str,
}

#[async_trait]
impl ChatNotifier for DiscordBot {
    async fn send_message(&self, channel_id: &str, content: &str) -> Result<(), NotifyError> {
        let url = self
            .api_base
            .join(&format!("channels/{channel_id}/messages"))
            .map_err(|err| NotifyError::Dispatch(err.to_string()))?;

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bot {}", self.bot_token))
            .json(&MessagePayload { content })
            .send()
            .await
            .map_err(|err| NotifyError::Dispatch(err.to_string()))?;

        response
            .error_for_status()
            .map(|_| ())
            .map_err(|err| NotifyError::Dispatch(err.to_string()))
    }
}
