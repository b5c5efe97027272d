//! Trend alert delivery.
//!
//! Defines the `Notifier` trait, renders alert text, and provides a
//! log-only notifier for running without Telegram credentials.

pub mod telegram;

use async_trait::async_trait;
use tracing::info;

#[cfg(test)]
use mockall::automock;

use crate::types::{Notification, ScanError, TrendState};

/// Abstraction over an alert transport.
///
/// Delivery failures come back as `Err` and are the caller's to report.
/// They must never take the scan loop down.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one alert.
    async fn send(&self, notification: &Notification) -> Result<(), ScanError>;

    /// Transport name for logging and identification.
    fn name(&self) -> &'static str;
}

/// Render an alert as Telegram-flavoured HTML.
pub fn render_message(notification: &Notification) -> String {
    let headline = match notification.state {
        TrendState::Bullish => "🚀",
        TrendState::Bearish => "⚠️",
        TrendState::Neutral => "ℹ️",
    };

    format!(
        "{headline} <b>{}</b> {} trend confirmed: {}\nEMA fast {:.4} | EMA slow {:.4}\n<i>{}</i>",
        escape_html(notification.instrument.as_str()),
        notification.state,
        notification.price,
        notification.fast_ema,
        notification.slow_ema,
        notification.timestamp.format("%Y-%m-%d %H:%M UTC"),
    )
}

/// Escape the three characters Telegram's HTML parse mode reserves.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Dry-run notifier
// ---------------------------------------------------------------------------

/// Logs alerts instead of sending them. Used when no Telegram
/// credentials are configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), ScanError> {
        info!(
            instrument = %notification.instrument,
            state = %notification.state,
            price = notification.price,
            "[DRY RUN] Would send alert"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
