//! Core engine — the scan → classify → alert loop and its lifecycle.

pub mod dedup;
pub mod scheduler;
pub mod shutdown;

pub use scheduler::{CycleReport, RunSummary, ScanScheduler, ScanSettings};
pub use shutdown::Shutdown;
