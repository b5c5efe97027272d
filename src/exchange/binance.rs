//! Binance spot REST market data.
//!
//! Read-only candle access; no API key is needed.
//!
//! API docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
//! Base URL: https://api.binance.com
//! Endpoints: `GET /api/v3/ping`, `GET /api/v3/klines`
//! Rate limit: request-weight based, 6000 weight/minute per IP.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::MarketDataSource;
use crate::types::{Candle, Instrument, ScanError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const EXCHANGE_NAME: &str = "binance";

/// Largest `limit` the klines endpoint accepts.
const MAX_KLINE_LIMIT: usize = 1000;

// ---------------------------------------------------------------------------
// API response types (Binance JSON → Rust)
// ---------------------------------------------------------------------------

/// One kline row. Binance encodes prices and volumes as strings.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct RawKline(
    i64,    // 0: Open time (ms)
    String, // 1: Open
    String, // 2: High
    String, // 3: Low
    String, // 4: Close
    String, // 5: Volume
    i64,    // 6: Close time (ms)
    String, // 7: Quote asset volume
    i64,    // 8: Number of trades
    String, // 9: Taker buy base asset volume
    String, // 10: Taker buy quote asset volume
    String, // 11: Ignore
);

/// Error body, e.g. `{"code":-1121,"msg":"Invalid symbol."}`.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Binance spot market-data client.
///
/// Owns a single pooled HTTP session for the life of the process.
/// `close` drops the session; later fetches report `Disconnected`.
pub struct BinanceClient {
    http: Mutex<Option<Client>>,
    base_url: String,
}

impl BinanceClient {
    /// Build a client without touching the network.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ScanError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent("TRENDSCAN/0.1.0 (trend-monitor)")
            .build()
            .map_err(|e| ScanError::Config(format!("Failed to build HTTP client for Binance: {e}")))?;

        Ok(Self {
            http: Mutex::new(Some(http)),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a client and confirm the exchange is reachable.
    pub async fn connect(base_url: &str, timeout: Duration) -> Result<Self, ScanError> {
        let client = Self::new(base_url, timeout)?;
        client.ping().await?;
        info!(base_url = %client.base_url, "Connected to Binance");
        Ok(client)
    }

    /// Map `BTC/USDT` (or `btc-usdt`) to Binance's `BTCUSDT`.
    pub fn exchange_symbol(instrument: &Instrument) -> String {
        instrument
            .as_str()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .collect()
    }

    // -- Internal helpers ------------------------------------------------

    async fn session(&self) -> Result<Client, ScanError> {
        self.http
            .lock()
            .await
            .clone()
            .ok_or_else(|| ScanError::Disconnected("Binance session is closed".to_string()))
    }

    async fn ping(&self) -> Result<(), ScanError> {
        let url = format!("{}/api/v3/ping", self.base_url);
        let resp = self
            .session()
            .await?
            .get(&url)
            .send()
            .await
            .map_err(|e| exchange_error(format!("ping failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(exchange_error(format!("ping returned {}", resp.status())));
        }
        Ok(())
    }

    /// Decode a klines response body into candles.
    fn parse_klines(body: &str) -> Result<Vec<Candle>, ScanError> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| ScanError::MalformedData(format!("klines body is not JSON: {e}")))?;

        if let Ok(api) = serde_json::from_value::<ApiError>(value.clone()) {
            return Err(exchange_error(format!("code {}: {}", api.code, api.msg)));
        }

        let rows: Vec<RawKline> = serde_json::from_value(value)
            .map_err(|e| ScanError::MalformedData(format!("unexpected klines shape: {e}")))?;

        rows.into_iter().map(Self::to_candle).collect()
    }

    fn to_candle(raw: RawKline) -> Result<Candle, ScanError> {
        Ok(Candle {
            timestamp: ms_to_datetime(raw.0)?,
            open: parse_number(&raw.1, "open")?,
            high: parse_number(&raw.2, "high")?,
            low: parse_number(&raw.3, "low")?,
            close: parse_number(&raw.4, "close")?,
            volume: parse_number(&raw.5, "volume")?,
        })
    }
}

fn exchange_error(message: String) -> ScanError {
    ScanError::Exchange {
        exchange: EXCHANGE_NAME.to_string(),
        message,
    }
}

fn parse_number(field: &str, name: &str) -> Result<f64, ScanError> {
    field
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ScanError::MalformedData(format!("invalid {name} value: {field:?}")))
}

fn ms_to_datetime(ms: i64) -> Result<DateTime<Utc>, ScanError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| ScanError::MalformedData(format!("invalid open time: {ms}")))
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_candles(
        &self,
        instrument: &Instrument,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ScanError> {
        let symbol = Self::exchange_symbol(instrument);
        let limit = limit.clamp(1, MAX_KLINE_LIMIT);
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url,
            urlencoding::encode(&symbol),
            urlencoding::encode(timeframe),
            limit,
        );

        debug!(url = %url, instrument = %instrument, "Fetching Binance klines");

        let resp = self
            .session()
            .await?
            .get(&url)
            .send()
            .await
            .map_err(|e| exchange_error(format!("klines request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| exchange_error(format!("failed to read klines body: {e}")))?;

        if !status.is_success() {
            // Binance usually explains itself in the body.
            return match Self::parse_klines(&body) {
                Err(e @ ScanError::Exchange { .. }) => Err(e),
                _ => Err(exchange_error(format!("klines returned {status}: {body}"))),
            };
        }

        let candles = Self::parse_klines(&body)?;
        debug!(instrument = %instrument, count = candles.len(), "Klines received");
        Ok(candles)
    }

    async fn close(&self) -> Result<(), ScanError> {
        match self.http.lock().await.take() {
            Some(_) => info!("Binance session closed"),
            None => debug!("Binance session already closed"),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        EXCHANGE_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
