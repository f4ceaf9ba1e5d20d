use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::Notifier;
use crate::error::BotError;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const MESSAGE_PREFIX: &str = "🤖";

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub base_url: String,
    pub token: String,
    pub chat_id: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
}

/// Bot API client posting plain-text messages to a single chat
pub struct TelegramNotifier {
    client: Client,
    config: TelegramConfig,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .map_err(|e| BotError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.config.base_url.trim_end_matches('/'),
            self.config.token
        )
    }

    async fn post(&self, text: &str) -> Result<(), reqwest::Error> {
        let body = SendMessage {
            chat_id: &self.config.chat_id,
            text: format!("{} {}", MESSAGE_PREFIX, text),
        };

        self.client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_message(&self, channel: &str, text: &str) {
        match self.post(text).await {
            Ok(()) => tracing::debug!("Telegram message sent ({})", channel),
            Err(e) => tracing::warn!("⚠️  Telegram delivery failed ({}): {}", channel, e),
        }
    }
}
