//! Telegram Bot API alert transport.
//!
//! API docs: https://core.telegram.org/bots/api#sendmessage
//! Base URL: https://api.telegram.org
//! Auth: bot token embedded in the path (`/bot<token>/sendMessage`).

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{render_message, Notifier};
use crate::config::TelegramCredentials;
use crate::types::{Notification, ScanError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const BASE_URL: &str = "https://api.telegram.org";
const CHANNEL_NAME: &str = "telegram";

/// How Telegram should interpret markup in the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ParseMode {
    #[serde(rename = "HTML")]
    Html,
}

// ---------------------------------------------------------------------------
// API request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: ParseMode,
    disable_web_page_preview: bool,
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Sends alerts to one Telegram chat.
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: SecretString,
    chat_id: String,
    link_preview: bool,
}

impl TelegramNotifier {
    pub fn new(
        credentials: TelegramCredentials,
        timeout: Duration,
        link_preview: bool,
    ) -> Result<Self, ScanError> {
        Self::with_base_url(BASE_URL, credentials, timeout, link_preview)
    }

    /// Point the client at a different API host (self-hosted Bot API
    /// server, or a local stub in tests).
    pub fn with_base_url(
        base_url: &str,
        credentials: TelegramCredentials,
        timeout: Duration,
        link_preview: bool,
    ) -> Result<Self, ScanError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::Config(format!("Failed to build HTTP client for Telegram: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bot_token: credentials.bot_token,
            chat_id: credentials.chat_id,
            link_preview,
        })
    }

    /// Post `text` to the configured chat.
    pub async fn send_message(
        &self,
        text: &str,
        parse_mode: ParseMode,
        link_preview: bool,
    ) -> Result<(), ScanError> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.base_url,
            self.bot_token.expose_secret()
        );
        let payload = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode,
            disable_web_page_preview: !link_preview,
        };

        // Never log `url`: it carries the token.
        debug!(chat_id = %self.chat_id, "Sending Telegram message");

        let resp = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| notification_error(format!("request failed: {}", e.without_url())))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Self::check_response(status.is_success(), status.as_u16(), &body)
    }

    fn check_response(success: bool, status: u16, body: &str) -> Result<(), ScanError> {
        let parsed = serde_json::from_str::<TelegramResponse>(body).ok();
        match parsed {
            Some(r) if success && r.ok => Ok(()),
            Some(r) => Err(notification_error(format!(
                "HTTP {status}: {}",
                r.description.unwrap_or_else(|| "no description".to_string())
            ))),
            None if success => Err(notification_error(format!(
                "HTTP {status}: unparseable response"
            ))),
            None => Err(notification_error(format!("HTTP {status}: {body}"))),
        }
    }
}

fn notification_error(message: String) -> ScanError {
    ScanError::Notification {
        channel: CHANNEL_NAME.to_string(),
        message,
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), ScanError> {
        let text = render_message(notification);
        self.send_message(&text, ParseMode::Html, self.link_preview)
            .await
    }

    fn name(&self) -> &'static str {
        CHANNEL_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
