//! Scan scheduler — the fetch → classify → notify → wait loop.
//!
//! One logical thread of control walks the configured instruments in
//! order, one at a time. Failures are contained as tightly as possible:
//!
//! - a bad fetch, bad data or failed alert only costs that instrument;
//! - an error that poisons the whole cycle (lost data source session, or
//!   a panic) abandons the cycle and retries after a short recovery pause;
//! - nothing short of a shutdown request ends the loop.
//!
//! Every suspension point (fetch, alert, sleep) races the shutdown handle,
//! so a signal is honoured within one poll.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::alerts::Notifier;
use crate::config::AppConfig;
use crate::engine::dedup::AlertMemory;
use crate::engine::shutdown::Shutdown;
use crate::exchange::MarketDataSource;
use crate::strategy::TrendClassifier;
use crate::types::{Instrument, Notification, ScanError, TrendState};

/// Upper bound on releasing the data source at shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Everything the scheduler needs to know about what and when to scan.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub instruments: Vec<Instrument>,
    pub timeframe: String,
    pub window_size: usize,
    pub scan_interval: Duration,
    pub recovery_interval: Duration,
    pub fetch_timeout: Duration,
    pub notify_timeout: Duration,
}

impl ScanSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            instruments: cfg.scanner.instruments.clone(),
            timeframe: cfg.scanner.timeframe.clone(),
            window_size: cfg.scanner.window_size,
            scan_interval: Duration::from_secs(cfg.scanner.scan_interval_secs),
            recovery_interval: Duration::from_secs(cfg.scanner.recovery_interval_secs),
            fetch_timeout: Duration::from_secs(cfg.scanner.fetch_timeout_secs),
            notify_timeout: Duration::from_secs(cfg.alerts.request_timeout_secs),
        }
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// What happened to one instrument in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentOutcome {
    /// Alert delivered.
    Notified(TrendState),
    /// Actionable, but already announced.
    Suppressed(TrendState),
    Neutral,
    /// Source returned no candles.
    NoData,
    /// Fewer candles than the slow EMA needs.
    InsufficientData,
    /// Fetch failed, timed out, or returned unusable data.
    FetchFailed,
    /// Classified, but the alert could not be delivered.
    NotifyFailed,
    /// Shutdown arrived while this instrument was in flight.
    Interrupted,
}

/// Summary of one pass over the instrument list.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle_number: u64,
    pub scanned: usize,
    pub notified: usize,
    pub suppressed: usize,
    pub neutral: usize,
    pub skipped: usize,
    pub fetch_failures: usize,
    pub notify_failures: usize,
    /// Cut short by a shutdown request.
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl CycleReport {
    fn new(cycle_number: u64) -> Self {
        Self {
            cycle_number,
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: InstrumentOutcome) {
        match outcome {
            InstrumentOutcome::Interrupted => {
                self.interrupted = true;
                return;
            }
            InstrumentOutcome::Notified(_) => self.notified += 1,
            InstrumentOutcome::Suppressed(_) => self.suppressed += 1,
            InstrumentOutcome::Neutral => self.neutral += 1,
            InstrumentOutcome::NoData | InstrumentOutcome::InsufficientData => self.skipped += 1,
            InstrumentOutcome::FetchFailed => self.fetch_failures += 1,
            InstrumentOutcome::NotifyFailed => self.notify_failures += 1,
        }
        self.scanned += 1;
    }
}

/// Totals over the scheduler's lifetime, returned when it stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub alerts_sent: u64,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Owns the data source, the notifier and the alert memory, and drives
/// the monitoring loop until shutdown.
pub struct ScanScheduler {
    source: Box<dyn MarketDataSource>,
    notifier: Box<dyn Notifier>,
    classifier: TrendClassifier,
    settings: ScanSettings,
    memory: AlertMemory,
    cycle_count: u64,
}

impl ScanScheduler {
    pub fn new(
        source: Box<dyn MarketDataSource>,
        notifier: Box<dyn Notifier>,
        classifier: TrendClassifier,
        settings: ScanSettings,
    ) -> Self {
        Self {
            source,
            notifier,
            classifier,
            settings,
            memory: AlertMemory::new(),
            cycle_count: 0,
        }
    }

    pub fn memory(&self) -> &AlertMemory {
        &self.memory
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count
    }

    /// Run cycles until `shutdown` fires, then release the data source.
    ///
    /// Never returns early on a cycle failure; the data source is closed
    /// exactly once, on the way out.
    pub async fn run(mut self, shutdown: Shutdown) -> RunSummary {
        let mut summary = RunSummary::default();

        info!(
            instruments = self.settings.instruments.len(),
            timeframe = %self.settings.timeframe,
            window = self.settings.window_size,
            interval_secs = self.settings.scan_interval.as_secs(),
            source = self.source.name(),
            notifier = self.notifier.name(),
            "Scan scheduler started"
        );

        while !shutdown.is_triggered() {
            let outcome = AssertUnwindSafe(self.run_cycle(&shutdown))
                .catch_unwind()
                .await;

            let pause = match outcome {
                Ok(Ok(report)) => {
                    summary.alerts_sent += report.notified as u64;
                    if !report.interrupted {
                        summary.cycles_completed += 1;
                    }
                    log_cycle_report(&report);
                    self.settings.scan_interval
                }
                Ok(Err(e)) => {
                    summary.cycles_failed += 1;
                    error!(
                        cycle = self.cycle_count,
                        error = %e,
                        retry_in_secs = self.settings.recovery_interval.as_secs_f64(),
                        "Scan cycle failed, retrying after recovery pause"
                    );
                    self.settings.recovery_interval
                }
                Err(panic) => {
                    summary.cycles_failed += 1;
                    error!(
                        cycle = self.cycle_count,
                        panic = %panic_message(&*panic),
                        retry_in_secs = self.settings.recovery_interval.as_secs_f64(),
                        "Scan cycle panicked, retrying after recovery pause"
                    );
                    self.settings.recovery_interval
                }
            };

            if !sleep_unless_cancelled(pause, &shutdown).await {
                break;
            }
        }

        info!("Scan scheduler stopping, releasing data source");
        match with_timeout("close", CLOSE_TIMEOUT, self.source.close()).await {
            Ok(()) => debug!(source = self.source.name(), "Data source released"),
            Err(e) => warn!(source = self.source.name(), error = %e, "Data source did not close cleanly"),
        }

        info!(
            cycles = summary.cycles_completed,
            failed = summary.cycles_failed,
            alerts = summary.alerts_sent,
            "Scan scheduler stopped"
        );
        summary
    }

    /// One pass over every instrument, in configured order.
    ///
    /// Per-instrument problems are folded into the report. Only a
    /// cycle-fatal error (see [`ScanError::is_cycle_fatal`]) is returned.
    pub async fn run_cycle(&mut self, shutdown: &Shutdown) -> Result<CycleReport, ScanError> {
        self.cycle_count += 1;
        let started = Instant::now();
        let mut report = CycleReport::new(self.cycle_count);

        debug!(cycle = self.cycle_count, "Starting scan cycle");

        for instrument in &self.settings.instruments {
            if shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }

            let outcome = self.scan_instrument(instrument, shutdown).await?;
            if let InstrumentOutcome::Notified(state) = outcome {
                self.memory.record(instrument, state);
            }
            report.record(outcome);
            if report.interrupted {
                break;
            }
        }

        report.elapsed = started.elapsed();
        Ok(report)
    }

    /// Fetch, classify and (maybe) alert for a single instrument.
    async fn scan_instrument(
        &self,
        instrument: &Instrument,
        shutdown: &Shutdown,
    ) -> Result<InstrumentOutcome, ScanError> {
        let fetch = with_timeout(
            "fetch",
            self.settings.fetch_timeout,
            self.source.fetch_candles(
                instrument,
                &self.settings.timeframe,
                self.settings.window_size,
            ),
        );
        let fetched = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(InstrumentOutcome::Interrupted),
            res = fetch => res,
        };

        let candles = match fetched {
            Ok(candles) => candles,
            Err(e) if e.is_cycle_fatal() => return Err(e),
            Err(e) => {
                warn!(
                    instrument = %instrument,
                    source = self.source.name(),
                    error = %e,
                    "Fetch failed, skipping instrument"
                );
                return Ok(InstrumentOutcome::FetchFailed);
            }
        };

        if candles.is_empty() {
            debug!(instrument = %instrument, "No candles returned, skipping");
            return Ok(InstrumentOutcome::NoData);
        }
        if candles.len() < self.classifier.min_candles() {
            debug!(
                instrument = %instrument,
                have = candles.len(),
                need = self.classifier.min_candles(),
                "Not enough candles to classify, skipping"
            );
            return Ok(InstrumentOutcome::InsufficientData);
        }

        let reading = match self.classifier.classify(&candles) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(instrument = %instrument, error = %e, "Unusable candle window, skipping");
                return Ok(InstrumentOutcome::FetchFailed);
            }
        };

        let state = reading.state;
        if !state.is_actionable() {
            debug!(instrument = %instrument, reading = %reading, "Neutral");
            return Ok(InstrumentOutcome::Neutral);
        }
        if !self.memory.should_notify(instrument, state) {
            debug!(
                instrument = %instrument,
                state = %state,
                "Trend unchanged since last alert, suppressing"
            );
            return Ok(InstrumentOutcome::Suppressed(state));
        }

        let notification = Notification::from_reading(instrument, &reading);
        let send = with_timeout(
            "notify",
            self.settings.notify_timeout,
            self.notifier.send(&notification),
        );
        let sent = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(InstrumentOutcome::Interrupted),
            res = send => res,
        };

        match sent {
            Ok(()) => {
                info!(
                    instrument = %instrument,
                    state = %state,
                    price = reading.close,
                    fast_ema = reading.fast_ema,
                    slow_ema = reading.slow_ema,
                    "Trend alert sent"
                );
                Ok(InstrumentOutcome::Notified(state))
            }
            Err(e) => {
                warn!(
                    instrument = %instrument,
                    notifier = self.notifier.name(),
                    error = %e,
                    "Alert delivery failed"
                );
                Ok(InstrumentOutcome::NotifyFailed)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn with_timeout<T>(
    operation: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T, ScanError>>,
) -> Result<T, ScanError> {
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(ScanError::Timeout { operation, after: limit }))
}

/// Sleep for `pause`. Returns `false` if shutdown interrupted the sleep.
async fn sleep_unless_cancelled(pause: Duration, shutdown: &Shutdown) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(pause) => true,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn log_cycle_report(report: &CycleReport) {
    info!(
        cycle = report.cycle_number,
        scanned = report.scanned,
        alerts = report.notified,
        suppressed = report.suppressed,
        neutral = report.neutral,
        skipped = report.skipped,
        fetch_failed = report.fetch_failures,
        notify_failed = report.notify_failures,
        interrupted = report.interrupted,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Cycle complete"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
