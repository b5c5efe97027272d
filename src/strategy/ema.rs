//! Exponential moving average.
//!
//! k = 2/(n+1), seeded with the SMA of the first n values, then
//! EMA[i] = EMA[i-1] + k * (x[i] - EMA[i-1]).
//! The incremental form keeps a constant series exactly constant.

/// Smoothing factor for a given period.
pub fn smoothing(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// Full EMA series aligned with `values`. The first `period - 1` slots are
/// warm-up and hold `None`.
pub fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if period == 0 {
        out.resize(values.len(), None);
        return out;
    }

    let k = smoothing(period);
    let mut sum = 0.0;
    let mut ema = 0.0;

    for (i, &x) in values.iter().enumerate() {
        if i + 1 < period {
            sum += x;
            out.push(None);
        } else if i + 1 == period {
            sum += x;
            ema = sum / period as f64;
            out.push(Some(ema));
        } else {
            ema += k * (x - ema);
            out.push(Some(ema));
        }
    }

    out
}

/// Final EMA value over `values`, or `None` if there are fewer than
/// `period` values.
pub fn latest_ema(values: &[f64], period: usize) -> Option<f64> {
    ema_series(values, period).last().copied().flatten()
}
