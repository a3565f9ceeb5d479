// src/services/notifier.rs

//! Message delivery.

use async_trait::async_trait;
use serde_json::json;

use crate::error::{AppError, Result};
use crate::models::NotifierConfig;
use crate::utils::create_api_client;

/// Destination for notification messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message. An error means it was not delivered.
    async fn send(&self, message: &str) -> Result<()>;
}

/// Posts messages to a Discord channel through the bot API.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl DiscordNotifier {
    pub fn new(config: &NotifierConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::config("notifier token is not set"))?;
        let channel = config
            .channel_id
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::config("notifier channel_id is not set"))?;

        Ok(Self {
            client: create_api_client(config.timeout_secs)?,
            endpoint: messages_endpoint(&config.api_base, channel),
            token,
        })
    }
}

/// `{api_base}/channels/{channel}/messages`
fn messages_endpoint(api_base: &str, channel: &str) -> String {
    format!("{}/channels/{channel}/messages", api_base.trim_end_matches('/'))
}

#[async_trait]
impl Notifier for DiscordNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("Bot {}", self.token))
            .json(&json!({ "content": message }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::notify(status.as_u16(), body));
        }
        log::info!("Message sent: {message}");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) -> Result<()> {
        log::info!("[dry-run] {message}");
        Ok(())
    }
}
