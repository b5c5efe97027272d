//! Market data sources.
//!
//! Defines the `MarketDataSource` trait and provides the Binance spot
//! implementation used in production.

pub mod binance;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::types::{Candle, Instrument, ScanError};

/// Abstraction over an OHLCV candle provider.
///
/// One instance is opened at startup and shared by every cycle. After
/// `close` returns, further fetches fail with `ScanError::Disconnected`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the most recent `limit` candles of `timeframe` granularity,
    /// oldest first.
    async fn fetch_candles(
        &self,
        instrument: &Instrument,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ScanError>;

    /// Release the underlying session. Safe to call more than once.
    async fn close(&self) -> Result<(), ScanError>;

    /// Source name for logging and identification.
    fn name(&self) -> &'static str;
}
