//! TRENDSCAN — periodic EMA trend monitor
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects to the exchange, and runs the scan→classify→alert loop
//! until SIGINT / SIGTERM.

use anyhow::{anyhow, Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use trendscan::alerts::telegram::TelegramNotifier;
use trendscan::alerts::{LogNotifier, Notifier};
use trendscan::config::AppConfig;
use trendscan::engine::shutdown::listen_for_signals;
use trendscan::engine::{ScanScheduler, ScanSettings, Shutdown};
use trendscan::exchange::binance::BinanceClient;
use trendscan::strategy::TrendClassifier;

const BANNER: &str = r#"
 _____ ____  _____ _   _ ____  ____   ____    _    _   _
|_   _|  _ \| ____| \ | |  _ \/ ___| / ___|  / \  | \ | |
  | | | |_) |  _| |  \| | | | \___ \| |     / _ \ |  \| |
  | | |  _ <| |___| |\  | |_| |___) | |___ / ___ \| |\  |
  |_| |_| \_\_____|_| \_|____/|____/ \____/_/   \_\_| \_|

  EMA trend monitor v0.1.0
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_LOG_FILTER: &str = "trendscan=info";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("TRENDSCAN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    let log_format = LogFormat::from_env_value(std::env::var("TRENDSCAN_LOG_JSON").ok().as_deref());
    init_logging(log_format)?;

    println!("{BANNER}");
    info!(
        name = %cfg.scanner.name,
        instruments = ?cfg.scanner.instruments,
        timeframe = %cfg.scanner.timeframe,
        ema_fast = cfg.strategy.ema_fast,
        ema_slow = cfg.strategy.ema_slow,
        scan_interval_secs = cfg.scanner.scan_interval_secs,
        "TRENDSCAN starting up"
    );

    // -- Initialise components -------------------------------------------

    let classifier = TrendClassifier::new(cfg.strategy.ema_fast, cfg.strategy.ema_slow)?;

    let notifier: Box<dyn Notifier> = match cfg.telegram_credentials() {
        Some(credentials) => {
            info!("Telegram alerts enabled");
            Box::new(TelegramNotifier::new(
                credentials,
                Duration::from_secs(cfg.alerts.request_timeout_secs),
                cfg.alerts.link_preview,
            )?)
        }
        None => {
            warn!(
                token_env = %cfg.alerts.telegram_bot_token_env,
                chat_env = %cfg.alerts.telegram_chat_id_env,
                "No Telegram credentials configured, alerts will only be logged"
            );
            Box::new(LogNotifier)
        }
    };

    // Last fallible step: nothing to clean up if it fails.
    let exchange = BinanceClient::connect(
        &cfg.exchange.base_url,
        Duration::from_secs(cfg.exchange.request_timeout_secs),
    )
    .await
    .context("Failed to connect to exchange")?;

    // -- Main loop -------------------------------------------------------

    let shutdown = Shutdown::new();
    let signals = listen_for_signals(shutdown.clone());

    let scheduler = ScanScheduler::new(
        Box::new(exchange),
        notifier,
        classifier,
        ScanSettings::from_config(&cfg),
    );

    info!("Entering scan loop. Press Ctrl+C to stop.");
    let summary = scheduler.run(shutdown).await;
    signals.abort();

    info!(
        cycles = summary.cycles_completed,
        failed_cycles = summary.cycles_failed,
        alerts = summary.alerts_sent,
        "TRENDSCAN shut down cleanly."
    );

    Ok(())
}

/// Log line format, picked once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// `TRENDSCAN_LOG_JSON` selects JSON unless unset, empty, `0` or `false`.
    fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") | Some("0") => LogFormat::Compact,
            Some(v) if v.eq_ignore_ascii_case("false") => LogFormat::Compact,
            Some(_) => LogFormat::Json,
        }
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter.
fn init_logging(format: LogFormat) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = fmt().with_env_filter(filter).with_target(true);

    let installed = match format {
        LogFormat::Json => builder.json().with_current_span(false).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {e}"))
}
