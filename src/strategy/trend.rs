//! EMA-crossover trend classifier.
//!
//! Given a window of candles, computes a fast and a slow EMA over the
//! closes and classifies the final bar:
//!
//! - `Bullish` iff `close > fast > slow`
//! - `Bearish` iff `close < fast < slow`
//! - `Neutral` otherwise (mixed or equal ordering)

use crate::strategy::ema::latest_ema;
use crate::types::{is_chronological, Candle, ScanError, TrendReading, TrendState};

/// Pure, stateless classifier. Identical windows always yield identical
/// readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendClassifier {
    fast_period: usize,
    slow_period: usize,
}

impl TrendClassifier {
    pub fn new(fast_period: usize, slow_period: usize) -> Result<Self, ScanError> {
        if fast_period == 0 || fast_period >= slow_period {
            return Err(ScanError::Config(format!(
                "EMA periods must satisfy 0 < fast < slow (got {fast_period} / {slow_period})"
            )));
        }
        Ok(Self {
            fast_period,
            slow_period,
        })
    }

    /// Smallest window `classify` accepts.
    pub fn min_candles(&self) -> usize {
        self.fast_period.max(self.slow_period)
    }

    /// Classify the final candle of `candles`.
    ///
    /// Callers are expected to skip windows shorter than
    /// [`min_candles`](Self::min_candles); those are reported as
    /// `InsufficientData` rather than guessed at.
    pub fn classify(&self, candles: &[Candle]) -> Result<TrendReading, ScanError> {
        let needed = self.min_candles();
        if candles.len() < needed {
            return Err(ScanError::InsufficientData {
                needed,
                available: candles.len(),
            });
        }
        if !is_chronological(candles) {
            return Err(ScanError::MalformedData(
                "candle window is not in chronological order".to_string(),
            ));
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        if closes.iter().any(|c| !c.is_finite()) {
            return Err(ScanError::MalformedData(
                "candle window contains a non-finite close".to_string(),
            ));
        }

        // Length was checked above, so both averages exist.
        let (Some(fast_ema), Some(slow_ema)) = (
            latest_ema(&closes, self.fast_period),
            latest_ema(&closes, self.slow_period),
        ) else {
            return Err(ScanError::InsufficientData {
                needed,
                available: candles.len(),
            });
        };

        let last = &candles[candles.len() - 1];
        let state = Self::state_for(last.close, fast_ema, slow_ema);

        Ok(TrendReading {
            state,
            close: last.close,
            fast_ema,
            slow_ema,
            timestamp: last.timestamp,
        })
    }

    /// The ordering rule on its own.
    pub fn state_for(close: f64, fast_ema: f64, slow_ema: f64) -> TrendState {
        if close > fast_ema && fast_ema > slow_ema {
            TrendState::Bullish
        } else if close < fast_ema && fast_ema < slow_ema {
            TrendState::Bearish
        } else {
            TrendState::Neutral
        }
    }
}
