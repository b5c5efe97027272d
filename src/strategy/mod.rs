//! Strategy layer — indicator math and trend classification.

pub mod ema;
pub mod trend;

pub use trend::TrendClassifier;
