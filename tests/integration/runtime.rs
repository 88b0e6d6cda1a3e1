//! Integration tests for evaluation passes

use async_trait::async_trait;
use cipherwatch::cache::dedup::DedupCache;
use cipherwatch::config::Config;
use cipherwatch::core::runtime::SignalRuntime;
use cipherwatch::core::scheduler::JobScheduler;
use cipherwatch::metrics::Metrics;
use cipherwatch::models::indicators::CandleSeries;
use cipherwatch::models::signal::SignalType;
use cipherwatch::services::market_data::{
    InMemoryMarketDataProvider, MarketDataError, MarketDataProvider,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::fixtures::{dip_series, flat_series, open_time, spike_series, DIP_CROSS_INDEX};
use crate::test_utils::{crossover_window, file_cache, runtime_with, test_config, RecordingSink};

#[tokio::test]
async fn dip_is_alerted_once_across_runs_sharing_a_cache_file() {
    // The full series has exactly one BUY, at the crossover.
    let config = test_config(&["BTCUSDT"]);
    let full = cipherwatch::signals::engine::SignalEngine::from_config(&config).samples(&dip_series(150));
    let buys: Vec<usize> = (0..full.len()).filter(|&i| full[i].buy_signal).collect();
    assert_eq!(buys, vec![DIP_CROSS_INDEX]);
    assert!(full.iter().all(|s| !s.sell_signal));

    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("alert_cache.json");
    let (candles, now) = crossover_window();

    let first_sink = Arc::new(RecordingSink::default());
    {
        let provider = InMemoryMarketDataProvider::new().with_candles("BTCUSDT", candles.clone());
        let runtime = runtime_with(&config, provider, file_cache(&config, &cache_path), first_sink.clone());
        let report = runtime.run_pass(now).await;

        assert_eq!(report.symbols_evaluated, 1);
        assert_eq!(report.signals_detected, 1);
        assert_eq!(report.signals_admitted(), 1);
        let event = &report.events[0];
        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.signal_type, SignalType::Buy);
        assert_eq!(event.source_timestamp, open_time(DIP_CROSS_INDEX));
        assert_eq!(event.exchange_used, "memory");
        assert!(!report.cache_degraded);
        assert_eq!(report.cache_entries, 1);
    }
    let batches = first_sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].buys().len(), 1);

    let second_sink = Arc::new(RecordingSink::default());
    let provider = InMemoryMarketDataProvider::new().with_candles("BTCUSDT", candles);
    let runtime = runtime_with(&config, provider, file_cache(&config, &cache_path), second_sink.clone());
    let report = runtime.run_pass(now).await;

    assert_eq!(report.signals_detected, 1);
    assert_eq!(report.signals_admitted(), 0);
    assert_eq!(report.signals_blocked, 1);
    assert!(second_sink.batches().is_empty());
}

#[tokio::test]
async fn failures_and_skips_are_isolated_per_symbol() {
    let config = Config {
        blocked_symbols: vec!["ethusdt".to_string()],
        ..test_config(&["BTCUSDT", "MISSINGUSDT", "FLATUSDT", "ETHUSDT", "ethusdt"])
    };
    let (candles, now) = crossover_window();
    let provider = InMemoryMarketDataProvider::new()
        .with_candles("BTCUSDT", candles.clone())
        .with_candles("FLATUSDT", flat_series(candles.len(), 3.0))
        .with_candles("ETHUSDT", candles);
    let sink = Arc::new(RecordingSink::default());
    let runtime = runtime_with(&config, provider, DedupCache::in_memory(config.dedup_policy()), sink);

    let report = runtime.run_pass(now).await;

    assert_eq!(report.symbols_total, 3);
    assert_eq!(report.symbols_blocked, 1);
    assert_eq!(report.symbols_evaluated, 1);
    assert_eq!(report.symbols_skipped, 1);
    assert_eq!(report.skipped[0].symbol, "FLATUSDT");
    assert_eq!(report.symbols_failed, 1);
    assert_eq!(report.failures[0].symbol, "MISSINGUSDT");
    assert_eq!(report.signals_admitted(), 1);
    assert_eq!(report.events[0].symbol, "BTCUSDT");
}

/// Panics for one symbol, delegates otherwise.
struct PanickingProvider {
    inner: InMemoryMarketDataProvider,
}

#[async_trait]
impl MarketDataProvider for PanickingProvider {
    async fn get_candles(&self, symbol: &str, limit: usize) -> Result<CandleSeries, MarketDataError> {
        if symbol == "PANICUSDT" {
            panic!("feed exploded");
        }
        self.inner.get_candles(symbol, limit).await
    }

    fn source(&self) -> &str {
        "panicking"
    }
}

#[tokio::test]
async fn a_panicking_symbol_does_not_abort_the_pass() {
    let config = test_config(&["PANICUSDT", "BTCUSDT"]);
    let (candles, now) = crossover_window();
    let provider = PanickingProvider {
        inner: InMemoryMarketDataProvider::new().with_candles("BTCUSDT", candles),
    };
    let runtime = SignalRuntime::new(
        &config,
        Arc::new(provider),
        DedupCache::in_memory(config.dedup_policy()),
    );

    let report = runtime.run_pass(now).await;

    assert_eq!(report.symbols_failed, 1);
    assert!(report.failures[0].reason.contains("feed exploded"));
    assert_eq!(report.signals_admitted(), 1);
}

#[tokio::test]
async fn stale_signals_are_dropped_before_dedup() {
    // The crossover candle closed five minutes before `now`.
    let config = Config {
        freshness_minutes: Some(2.0),
        ..test_config(&["BTCUSDT"])
    };
    let (candles, now) = crossover_window();
    let provider = InMemoryMarketDataProvider::new().with_candles("BTCUSDT", candles);
    let runtime = runtime_with(
        &config,
        provider,
        DedupCache::in_memory(config.dedup_policy()),
        Arc::new(RecordingSink::default()),
    );

    let report = runtime.run_pass(now).await;
    assert_eq!(report.signals_detected, 1);
    assert_eq!(report.stale_signals, 1);
    assert_eq!(report.signals_admitted(), 0);
    assert_eq!(report.cache_entries, 0);
}

#[tokio::test]
async fn failed_delivery_does_not_reopen_the_dedup_window() {
    let config = test_config(&["BTCUSDT"]);
    let (candles, now) = crossover_window();
    let provider = InMemoryMarketDataProvider::new().with_candles("BTCUSDT", candles);
    let sink = Arc::new(RecordingSink::failing());
    let runtime = runtime_with(&config, provider, DedupCache::in_memory(config.dedup_policy()), sink.clone());

    let first = runtime.run_pass(now).await;
    assert_eq!(first.signals_admitted(), 1);
    assert_eq!(first.alerts.len(), 1);
    assert!(!first.alerts[0].delivered);
    assert!(first.alerts[0].error.is_some());

    let second = runtime.run_pass(now).await;
    assert_eq!(second.signals_admitted(), 0);
    assert_eq!(second.signals_blocked, 1);
    assert_eq!(sink.batches().len(), 1);
}

#[tokio::test]
async fn sell_spike_and_buy_dip_share_one_batch() {
    let config = test_config(&["BTCUSDT", "ETHUSDT"]);
    let (candles, now) = crossover_window();
    let provider = InMemoryMarketDataProvider::new()
        .with_candles("BTCUSDT", candles.clone())
        .with_candles("ETHUSDT", spike_series(candles.len()));
    let sink = Arc::new(RecordingSink::default());
    let runtime = runtime_with(&config, provider, DedupCache::in_memory(config.dedup_policy()), sink.clone());

    let report = runtime.run_pass(now).await;
    assert_eq!(report.signals_admitted(), 2);
    assert_eq!(report.events[0].symbol, "BTCUSDT");
    assert_eq!(report.events[1].symbol, "ETHUSDT");
    assert_eq!(report.events[1].signal_type, SignalType::Sell);

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].buys().len(), 1);
    assert_eq!(batches[0].sells().len(), 1);
}

#[tokio::test]
async fn shutdown_before_the_pass_processes_nothing() {
    let config = test_config(&["BTCUSDT"]);
    let (candles, now) = crossover_window();
    let provider = InMemoryMarketDataProvider::new().with_candles("BTCUSDT", candles);
    let runtime = runtime_with(
        &config,
        provider,
        DedupCache::in_memory(config.dedup_policy()),
        Arc::new(RecordingSink::default()),
    );
    runtime.request_shutdown();

    let report = runtime.run_pass(now).await;
    assert!(report.interrupted);
    assert_eq!(report.symbols_evaluated, 0);
    assert!(report.events.is_empty());
}

/// Holds one symbol's fetch open and announces when it starts.
struct SlowProvider {
    inner: InMemoryMarketDataProvider,
    slow_symbol: &'static str,
    started: Arc<Notify>,
}

#[async_trait]
impl MarketDataProvider for SlowProvider {
    async fn get_candles(&self, symbol: &str, limit: usize) -> Result<CandleSeries, MarketDataError> {
        if symbol == self.slow_symbol {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_millis(1500)).await;
        }
        self.inner.get_candles(symbol, limit).await
    }

    fn source(&self) -> &str {
        self.inner.source()
    }
}

#[tokio::test]
async fn stopping_the_scheduler_mid_pass_still_delivers_admitted_signals() {
    let config = Config {
        concurrency: 1,
        ..test_config(&["BTCUSDT", "SLOWUSDT", "ETHUSDT"])
    };
    // Ends on the crossover candle, which is long closed at wall-clock time.
    let candles = dip_series(DIP_CROSS_INDEX + 1);
    let started = Arc::new(Notify::new());
    let provider = SlowProvider {
        inner: InMemoryMarketDataProvider::new()
            .with_candles("BTCUSDT", candles.clone())
            .with_candles("SLOWUSDT", flat_series(candles.len(), 3.0))
            .with_candles("ETHUSDT", candles),
        slow_symbol: "SLOWUSDT",
        started: started.clone(),
    };
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("alert_cache.json");
    let sink = Arc::new(RecordingSink::default());
    let runtime = Arc::new(
        SignalRuntime::new(&config, Arc::new(provider), file_cache(&config, &cache_path))
            .with_sink(sink.clone()),
    );

    let scheduler = JobScheduler::with_expression(runtime.clone(), "* * * * * *").unwrap();
    scheduler.start().await;
    tokio::time::timeout(Duration::from_secs(5), started.notified())
        .await
        .expect("pass never reached the slow symbol");
    scheduler.stop().await;
    assert!(!scheduler.is_running().await);

    let batches = sink.batches();
    assert_eq!(batches.len(), 1);
    let buys = batches[0].buys();
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].symbol, "BTCUSDT");

    let report = runtime.latest_report().read().await.clone().expect("report stored");
    assert!(report.interrupted);
    assert_eq!(report.symbols_evaluated, 1);
    assert_eq!(report.symbols_skipped, 1);
    assert_eq!(report.alerts.len(), 1);
    assert!(report.alerts[0].delivered);

    let persisted: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&cache_path).unwrap()).unwrap();
    assert_eq!(persisted.as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn pass_updates_metrics_and_latest_report() {
    let config = test_config(&["BTCUSDT"]);
    let (candles, now) = crossover_window();
    let provider = InMemoryMarketDataProvider::new().with_candles("BTCUSDT", candles);
    let metrics = Arc::new(Metrics::new().expect("metrics"));
    let runtime = runtime_with(
        &config,
        provider,
        DedupCache::in_memory(config.dedup_policy()),
        Arc::new(RecordingSink::default()),
    )
    .with_metrics(metrics.clone());

    runtime.run_pass(now).await;

    let text = metrics.export().unwrap();
    assert!(text.contains("signal_runs_total 1"));
    assert!(text.contains("signal_alerts_admitted_total{signal_type=\"BUY\"} 1"));
    assert!(text.contains("dedup_cache_entries 1"));

    let latest = runtime.latest_report();
    let guard = latest.read().await;
    assert_eq!(guard.as_ref().map(|r| r.signals_admitted()), Some(1));
}
