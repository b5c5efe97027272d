//! Shared types for the TRENDSCAN monitor.
//!
//! These types form the data model used across all modules.
//! They are kept free of I/O so that the exchange, strategy, alert,
//! and engine modules can depend on them without circular references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Candle
// ---------------------------------------------------------------------------

/// One OHLCV bar as returned by the data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open time of the bar.
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl fmt::Display for Candle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} O:{} H:{} L:{} C:{} V:{}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.open,
            self.high,
            self.low,
            self.close,
            self.volume,
        )
    }
}

/// Whether a candle window is in strictly ascending time order.
pub fn is_chronological(candles: &[Candle]) -> bool {
    candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp)
}

// ---------------------------------------------------------------------------
// Instrument
// ---------------------------------------------------------------------------

/// A tradable pair, e.g. `BTC/USDT`. Opaque to everything but the
/// exchange adapter, which maps it to its own symbol format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Instrument {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Trend state
// ---------------------------------------------------------------------------

/// Classifier output for one instrument in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendState {
    Bullish,
    Bearish,
    Neutral,
}

impl TrendState {
    /// Bullish and Bearish are alert-worthy; Neutral never is.
    pub fn is_actionable(&self) -> bool {
        !matches!(self, TrendState::Neutral)
    }
}

impl fmt::Display for TrendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendState::Bullish => write!(f, "bullish"),
            TrendState::Bearish => write!(f, "bearish"),
            TrendState::Neutral => write!(f, "neutral"),
        }
    }
}

/// A classification together with the values it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendReading {
    pub state: TrendState,
    /// Close of the final candle in the window.
    pub close: f64,
    pub fast_ema: f64,
    pub slow_ema: f64,
    /// Open time of the final candle.
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for TrendReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (close={} fast={:.4} slow={:.4})",
            self.state, self.close, self.fast_ema, self.slow_ema,
        )
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A trend alert, built by the scheduler and handed straight to the
/// notifier. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub instrument: Instrument,
    pub state: TrendState,
    pub price: f64,
    pub fast_ema: f64,
    pub slow_ema: f64,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn from_reading(instrument: &Instrument, reading: &TrendReading) -> Self {
        Self {
            instrument: instrument.clone(),
            state: reading.state,
            price: reading.close,
            fast_ema: reading.fast_ema,
            slow_ema: reading.slow_ema,
            timestamp: reading.timestamp,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} at {}", self.instrument, self.state, self.price)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for TRENDSCAN.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Exchange error ({exchange}): {message}")]
    Exchange { exchange: String, message: String },

    #[error("Malformed market data: {0}")]
    MalformedData(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Data source disconnected: {0}")]
    Disconnected(String),

    #[error("Notification error ({channel}): {message}")]
    Notification { channel: String, message: String },

    #[error("Insufficient data: need {needed} candles, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScanError {
    /// Errors that make the rest of the cycle pointless. Everything else
    /// is contained to the instrument that hit it.
    pub fn is_cycle_fatal(&self) -> bool {
        matches!(self, ScanError::Disconnected(_))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
