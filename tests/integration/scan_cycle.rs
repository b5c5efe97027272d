//! End-to-end scheduler behaviour against in-memory collaborators.

use std::time::Duration;

use trendscan::engine::{ScanScheduler, ScanSettings, Shutdown};
use trendscan::strategy::TrendClassifier;
use trendscan::types::{Instrument, TrendState};

use crate::mock_exchange::{falling_to, flat, rising_to, MockExchange, RecordingNotifier, Reply};

fn settings(symbols: &[&str]) -> ScanSettings {
    ScanSettings {
        instruments: symbols.iter().map(|s| Instrument::new(*s)).collect(),
        timeframe: "15m".to_string(),
        window_size: 200,
        scan_interval: Duration::from_millis(20),
        recovery_interval: Duration::from_millis(5),
        fetch_timeout: Duration::from_secs(2),
        notify_timeout: Duration::from_secs(2),
    }
}

fn scheduler(
    exchange: &MockExchange,
    notifier: &RecordingNotifier,
    settings: ScanSettings,
) -> ScanScheduler {
    ScanScheduler::new(
        Box::new(exchange.clone()),
        Box::new(notifier.clone()),
        TrendClassifier::new(20, 50).unwrap(),
        settings,
    )
}

/// Generous upper bound so a hung scheduler fails the test instead of CI.
const TEST_DEADLINE: Duration = Duration::from_secs(10);

#[tokio::test]
async fn bullish_alert_is_sent_once_across_cycles() {
    let exchange = MockExchange::new().always("BTC/USD", Reply::Candles(rising_to(70_000.0)));
    let notifier = RecordingNotifier::new();
    let mut sched = scheduler(&exchange, &notifier, settings(&["BTC/USD"]));
    let shutdown = Shutdown::new();

    let first = sched.run_cycle(&shutdown).await.unwrap();
    assert_eq!(first.notified, 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].instrument, Instrument::new("BTC/USD"));
    assert_eq!(sent[0].state, TrendState::Bullish);
    assert_eq!(sent[0].price, 70_000.0);
    assert!(sent[0].price > sent[0].fast_ema);
    assert!(sent[0].fast_ema > sent[0].slow_ema);

    let text = &notifier.rendered()[0];
    assert!(text.contains("BTC/USD"));
    assert!(text.contains("70000"));

    let second = sched.run_cycle(&shutdown).await.unwrap();
    assert_eq!(second.notified, 0);
    assert_eq!(second.suppressed, 1);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn trend_flip_is_announced() {
    let exchange = MockExchange::new()
        .once("ETH/USDT", Reply::Candles(rising_to(4_000.0)))
        .always("ETH/USDT", Reply::Candles(falling_to(3_000.0)));
    let notifier = RecordingNotifier::new();
    let mut sched = scheduler(&exchange, &notifier, settings(&["ETH/USDT"]));
    let shutdown = Shutdown::new();

    sched.run_cycle(&shutdown).await.unwrap();
    sched.run_cycle(&shutdown).await.unwrap();
    sched.run_cycle(&shutdown).await.unwrap();

    let states: Vec<TrendState> = notifier.sent().iter().map(|n| n.state).collect();
    assert_eq!(states, vec![TrendState::Bullish, TrendState::Bearish]);
}

#[tokio::test]
async fn one_failing_instrument_does_not_stop_the_others() {
    let exchange = MockExchange::new()
        .always("BTC/USDT", Reply::Candles(rising_to(70_000.0)))
        .always("ETH/USDT", Reply::Fail("HTTP 500".to_string()))
        .always("SOL/USDT", Reply::Candles(falling_to(150.0 + 10.0 * 199.0)));
    let notifier = RecordingNotifier::new();
    let mut sched = scheduler(&exchange, &notifier, settings(&["BTC/USDT", "ETH/USDT", "SOL/USDT"]));

    let report = sched.run_cycle(&Shutdown::new()).await.unwrap();

    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.notified, 2);
    let alerted: Vec<String> = notifier
        .sent()
        .iter()
        .map(|n| n.instrument.to_string())
        .collect();
    assert_eq!(alerted, vec!["BTC/USDT", "SOL/USDT"]);
}

#[tokio::test]
async fn slow_fetch_times_out_and_cycle_moves_on() {
    let exchange = MockExchange::new()
        .always("BTC/USDT", Reply::Hang)
        .always("ETH/USDT", Reply::Candles(rising_to(4_000.0)));
    let notifier = RecordingNotifier::new();
    let mut cfg = settings(&["BTC/USDT", "ETH/USDT"]);
    cfg.fetch_timeout = Duration::from_millis(50);
    let mut sched = scheduler(&exchange, &notifier, cfg);

    let report = tokio::time::timeout(TEST_DEADLINE, sched.run_cycle(&Shutdown::new()))
        .await
        .expect("cycle blocked on a hung fetch")
        .unwrap();

    assert_eq!(report.fetch_failures, 1);
    assert_eq!(report.notified, 1);
    assert_eq!(notifier.sent()[0].instrument, Instrument::new("ETH/USDT"));
}

#[tokio::test]
async fn slow_notification_times_out_and_is_retried_later() {
    let exchange = MockExchange::new()
        .always("BTC/USDT", Reply::Candles(rising_to(70_000.0)))
        .always("ETH/USDT", Reply::Candles(rising_to(4_000.0)));
    let notifier = RecordingNotifier::new().stall_on("BTC/USDT");
    let mut cfg = settings(&["BTC/USDT", "ETH/USDT"]);
    cfg.notify_timeout = Duration::from_millis(50);
    let mut sched = scheduler(&exchange, &notifier, cfg);

    let report = tokio::time::timeout(TEST_DEADLINE, sched.run_cycle(&Shutdown::new()))
        .await
        .expect("cycle blocked on a hung notification")
        .unwrap();

    assert_eq!(report.notify_failures, 1);
    assert_eq!(report.notified, 1);
    assert_eq!(sched.memory().last_sent(&"BTC/USDT".into()), None);
    assert_eq!(
        sched.memory().last_sent(&"ETH/USDT".into()),
        Some(TrendState::Bullish)
    );
}

#[tokio::test]
async fn failed_notification_does_not_fail_the_cycle() {
    let exchange = MockExchange::new().always("BTC/USDT", Reply::Candles(rising_to(70_000.0)));
    let notifier = RecordingNotifier::new().fail_next(1);
    let mut sched = scheduler(&exchange, &notifier, settings(&["BTC/USDT"]));
    let shutdown = Shutdown::new();

    let first = sched.run_cycle(&shutdown).await.unwrap();
    assert_eq!(first.notify_failures, 1);
    assert!(notifier.sent().is_empty());

    let second = sched.run_cycle(&shutdown).await.unwrap();
    assert_eq!(second.notified, 1);
    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn neutral_and_empty_results_stay_quiet() {
    let exchange = MockExchange::new()
        .always("BTC/USDT", Reply::Candles(flat(70_000.0)))
        .always("ETH/USDT", Reply::Candles(Vec::new()));
    let notifier = RecordingNotifier::new();
    let mut sched = scheduler(&exchange, &notifier, settings(&["BTC/USDT", "ETH/USDT"]));

    let report = sched.run_cycle(&Shutdown::new()).await.unwrap();
    assert_eq!(report.neutral, 1);
    assert_eq!(report.skipped, 1);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn run_recovers_from_a_failed_cycle() {
    let shutdown = Shutdown::new();
    let exchange = MockExchange::new()
        .once("BTC/USDT", Reply::Disconnect)
        .always("BTC/USDT", Reply::Candles(rising_to(70_000.0)))
        .shutdown_on_fetch(3, shutdown.clone());
    let notifier = RecordingNotifier::new();
    let sched = scheduler(&exchange, &notifier, settings(&["BTC/USDT"]));

    let summary = tokio::time::timeout(TEST_DEADLINE, sched.run(shutdown))
        .await
        .expect("scheduler did not stop");

    // Cycle 1 fails, cycle 2 alerts, cycle 3 is suppressed and then we stop.
    assert_eq!(summary.cycles_failed, 1);
    assert_eq!(summary.cycles_completed, 2);
    assert_eq!(summary.alerts_sent, 1);
    assert_eq!(exchange.fetches().len(), 3);
    assert_eq!(notifier.sent().len(), 1);
    assert_eq!(exchange.close_calls(), 1);
}

#[tokio::test]
async fn run_survives_a_panicking_cycle() {
    let shutdown = Shutdown::new();
    let exchange = MockExchange::new()
        .once("BTC/USDT", Reply::Panic("kline decoder exploded"))
        .always("BTC/USDT", Reply::Candles(rising_to(70_000.0)))
        .shutdown_on_fetch(3, shutdown.clone());
    let notifier = RecordingNotifier::new();
    let sched = scheduler(&exchange, &notifier, settings(&["BTC/USDT"]));

    let summary = tokio::time::timeout(TEST_DEADLINE, sched.run(shutdown))
        .await
        .expect("scheduler did not stop");

    assert_eq!(summary.cycles_failed, 1);
    assert_eq!(summary.cycles_completed, 2);
    assert_eq!(summary.alerts_sent, 1);
    assert_eq!(notifier.sent()[0].state, TrendState::Bullish);
    assert_eq!(exchange.close_calls(), 1);
}

#[tokio::test]
async fn no_fetch_is_started_after_shutdown() {
    let shutdown = Shutdown::new();
    let exchange = MockExchange::new()
        .always("BTC/USDT", Reply::Candles(flat(1.0)))
        .always("ETH/USDT", Reply::Candles(flat(2.0)))
        .always("SOL/USDT", Reply::Candles(flat(3.0)))
        .shutdown_on_fetch(2, shutdown.clone());
    let notifier = RecordingNotifier::new();
    let sched = scheduler(&exchange, &notifier, settings(&["BTC/USDT", "ETH/USDT", "SOL/USDT"]));

    let summary = tokio::time::timeout(TEST_DEADLINE, sched.run(shutdown))
        .await
        .expect("scheduler did not stop");

    assert_eq!(
        exchange.fetches(),
        vec![Instrument::new("BTC/USDT"), Instrument::new("ETH/USDT")]
    );
    assert_eq!(exchange.close_calls(), 1);
    assert_eq!(summary.cycles_completed, 0);
}

#[tokio::test]
async fn shutdown_interrupts_the_inter_cycle_sleep() {
    let exchange = MockExchange::new().always("BTC/USDT", Reply::Candles(flat(1.0)));
    let notifier = RecordingNotifier::new();
    let mut cfg = settings(&["BTC/USDT"]);
    cfg.scan_interval = Duration::from_secs(3600);
    cfg.recovery_interval = Duration::from_secs(60);
    let sched = scheduler(&exchange, &notifier, cfg);

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(sched.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(shutdown.trigger());
    // A second signal is absorbed.
    assert!(!shutdown.trigger());

    let summary = tokio::time::timeout(TEST_DEADLINE, handle)
        .await
        .expect("sleep was not interrupted")
        .unwrap();

    assert_eq!(summary.cycles_completed, 1);
    assert_eq!(exchange.fetches().len(), 1);
    assert_eq!(exchange.close_calls(), 1);
}

#[tokio::test]
async fn shutdown_cancels_an_in_flight_fetch() {
    let exchange = MockExchange::new().always("BTC/USDT", Reply::Hang);
    let notifier = RecordingNotifier::new();
    let mut cfg = settings(&["BTC/USDT"]);
    cfg.fetch_timeout = Duration::from_secs(3600);
    let sched = scheduler(&exchange, &notifier, cfg);

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(sched.run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown.trigger();

    let summary = tokio::time::timeout(TEST_DEADLINE, handle)
        .await
        .expect("in-flight fetch was not cancelled")
        .unwrap();

    assert_eq!(summary.cycles_completed, 0);
    assert_eq!(exchange.fetches().len(), 1);
    assert_eq!(exchange.close_calls(), 1);
}
