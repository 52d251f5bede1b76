//! Reply delivery via the Telegram Bot API `sendMessage` method.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RelaySettings;

/// Errors that can occur while delivering a reply
#[derive(Debug, Error)]
pub enum ReplyError {
    /// The request never produced an HTTP response
    #[error("Network error: {0}")]
    Network(String),
}

/// Interface for reply delivery
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReplySender: Send + Sync {
    /// Deliver `text` to `chat_id`. Returns `Ok(false)` when the platform
    /// answered with anything other than 200.
    async fn send(&self, chat_id: i64, text: &str) -> Result<bool, ReplyError>;
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
}

/// Creates an HTTP client with the given timeout.
#[must_use]
pub fn create_http_client(timeout_secs: u64) -> HttpClient {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Telegram Bot API reply sender
pub struct TelegramReplySender {
    client: HttpClient,
    send_message_url: String,
}

impl TelegramReplySender {
    /// Create a sender for `bot_token` against `api_url`
    #[must_use]
    pub fn new(client: HttpClient, api_url: &str, bot_token: &str) -> Self {
        Self {
            client,
            send_message_url: send_message_url(api_url, bot_token),
        }
    }

    /// Create a sender from relay settings
    #[must_use]
    pub fn from_settings(settings: &RelaySettings) -> Self {
        Self::new(
            create_http_client(settings.http_timeout_secs),
            &settings.telegram_api_url,
            &settings.bot_token,
        )
    }
}

/// Returns the `sendMessage` URL; the token travels in the path.
#[must_use]
pub fn send_message_url(api_url: &str, bot_token: &str) -> String {
    format!("{}/bot{bot_token}/sendMessage", api_url.trim_end_matches('/'))
}

#[async_trait]
impl ReplySender for TelegramReplySender {
    async fn send(&self, chat_id: i64, text: &str) -> Result<bool, ReplyError> {
        let request = SendMessageRequest { chat_id, text };

        let response = self
            .client
            .post(&self.send_message_url)
            .json(&request)
            .send()
            .await
            // The URL carries the bot token; keep it out of the error text
            .map_err(|e| ReplyError::Network(e.without_url().to_string()))?;

        let status = response.status();
        debug!(chat_id, %status, "Telegram API response");

        if status == StatusCode::OK {
            info!(chat_id, "Reply sent");
            return Ok(true);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(chat_id, %status, body = %truncate(&body, 500), "Telegram rejected reply");
        Ok(false)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... (truncated)", &s[..idx]),
        None => s.to_string(),
    }
}
