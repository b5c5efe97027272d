//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (Telegram token and chat id) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::types::Instrument;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScannerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Scanned in this order every cycle.
    pub instruments: Vec<Instrument>,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Pause after a failed cycle. Must be shorter than the scan interval.
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_url")]
    pub base_url: String,
    #[serde(default = "default_fetch_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            base_url: default_exchange_url(),
            request_timeout_secs: default_fetch_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StrategyConfig {
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    #[serde(default = "default_token_env")]
    pub telegram_bot_token_env: String,
    #[serde(default = "default_chat_id_env")]
    pub telegram_chat_id_env: String,
    #[serde(default = "default_alert_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub link_preview: bool,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            telegram_bot_token_env: default_token_env(),
            telegram_chat_id_env: default_chat_id_env(),
            request_timeout_secs: default_alert_timeout(),
            link_preview: false,
        }
    }
}

/// Telegram secrets resolved from the environment.
#[derive(Debug, Clone)]
pub struct TelegramCredentials {
    pub bot_token: SecretString,
    pub chat_id: String,
}

fn default_name() -> String {
    "TRENDSCAN".to_string()
}
fn default_timeframe() -> String {
    "15m".to_string()
}
fn default_window_size() -> usize {
    200
}
fn default_scan_interval() -> u64 {
    300
}
fn default_recovery_interval() -> u64 {
    10
}
fn default_fetch_timeout() -> u64 {
    30
}
fn default_exchange_url() -> String {
    "https://api.binance.com".to_string()
}
fn default_ema_fast() -> usize {
    20
}
fn default_ema_slow() -> usize {
    50
}
fn default_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}
fn default_chat_id_env() -> String {
    "TELEGRAM_CHAT_ID".to_string()
}
fn default_alert_timeout() -> u64 {
    10
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file: {path}"))
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(contents).context("Failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field constraints serde can't express.
    pub fn validate(&self) -> Result<()> {
        let scanner = &self.scanner;

        if scanner.instruments.is_empty() {
            bail!("scanner.instruments must list at least one instrument");
        }
        let mut seen = HashSet::new();
        for instrument in &scanner.instruments {
            if instrument.as_str().trim().is_empty() {
                bail!("scanner.instruments contains an empty symbol");
            }
            if !seen.insert(instrument) {
                bail!("scanner.instruments lists {instrument} more than once");
            }
        }
        if scanner.timeframe.trim().is_empty() {
            bail!("scanner.timeframe must not be empty");
        }
        if scanner.scan_interval_secs == 0 {
            bail!("scanner.scan_interval_secs must be positive");
        }
        if scanner.recovery_interval_secs >= scanner.scan_interval_secs {
            bail!(
                "scanner.recovery_interval_secs ({}) must be shorter than scan_interval_secs ({})",
                scanner.recovery_interval_secs,
                scanner.scan_interval_secs
            );
        }
        if scanner.fetch_timeout_secs == 0 || self.exchange.request_timeout_secs == 0 {
            bail!("fetch and request timeouts must be positive");
        }

        let strategy = &self.strategy;
        if strategy.ema_fast == 0 || strategy.ema_fast >= strategy.ema_slow {
            bail!(
                "strategy periods must satisfy 0 < ema_fast < ema_slow (got {} / {})",
                strategy.ema_fast,
                strategy.ema_slow
            );
        }
        if strategy.ema_slow > scanner.window_size {
            bail!(
                "scanner.window_size ({}) is smaller than strategy.ema_slow ({})",
                scanner.window_size,
                strategy.ema_slow
            );
        }

        if self.alerts.request_timeout_secs == 0 {
            bail!("alerts.request_timeout_secs must be positive");
        }

        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve Telegram credentials, or `None` if either is unset or blank.
    pub fn telegram_credentials(&self) -> Option<TelegramCredentials> {
        let token = Self::resolve_env(&self.alerts.telegram_bot_token_env).ok()?;
        let chat_id = Self::resolve_env(&self.alerts.telegram_chat_id_env).ok()?;
        if token.trim().is_empty() || chat_id.trim().is_empty() {
            return None;
        }
        Some(TelegramCredentials {
            bot_token: SecretString::new(token),
            chat_id,
        })
    }
}
