//! One evaluation pass over the configured symbols.
//!
//! Fetch and evaluation run with bounded concurrency and are consumed in
//! input order. Admission through the dedup cache is serialized behind a
//! single lock, so at most one caller can pass for any key.

use crate::alerts::{AlertBatch, AlertError, AlertSink, LogAlertSink, WebhookAlertSink};
use crate::cache::dedup::{CacheWarning, DedupCache};
use crate::cache::store::{CacheError, JsonFileStore};
use crate::config::Config;
use crate::core::timeframe::DisplayZone;
use crate::metrics::Metrics;
use crate::models::signal::{DetectedSignal, SignalEvent};
use crate::services::market_data::{FileMarketDataProvider, MarketDataError, MarketDataProvider};
use crate::signals::engine::{EvaluationError, SignalEngine};
use chrono::{DateTime, Duration, Utc};
use futures_util::{future, stream, FutureExt, StreamExt};
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

/// Most recent report, shared with the status server.
pub type ReportHandle = Arc<RwLock<Option<RunReport>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolIssue {
    pub symbol: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertOutcome {
    pub sink: String,
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Counters and results of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub symbols_total: usize,
    pub symbols_blocked: usize,
    pub symbols_evaluated: usize,
    pub symbols_skipped: usize,
    pub symbols_failed: usize,
    pub signals_detected: usize,
    pub signals_blocked: usize,
    pub stale_signals: usize,
    pub cache_entries_expired: usize,
    pub cache_entries: usize,
    pub cache_degraded: bool,
    /// Shutdown was requested before every symbol was processed.
    pub interrupted: bool,
    pub duration_ms: u64,
    /// Admitted events, in symbol order.
    pub events: Vec<SignalEvent>,
    pub skipped: Vec<SymbolIssue>,
    pub failures: Vec<SymbolIssue>,
    pub warnings: Vec<CacheWarning>,
    pub alerts: Vec<AlertOutcome>,
}

impl RunReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            symbols_total: 0,
            symbols_blocked: 0,
            symbols_evaluated: 0,
            symbols_skipped: 0,
            symbols_failed: 0,
            signals_detected: 0,
            signals_blocked: 0,
            stale_signals: 0,
            cache_entries_expired: 0,
            cache_entries: 0,
            cache_degraded: false,
            interrupted: false,
            duration_ms: 0,
            events: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            warnings: Vec::new(),
            alerts: Vec::new(),
        }
    }

    pub fn signals_admitted(&self) -> usize {
        self.events.len()
    }
}

enum SymbolOutcome {
    Evaluated {
        symbol: String,
        source: String,
        signals: Vec<DetectedSignal>,
    },
    Skipped(SymbolIssue),
    Failed(SymbolIssue),
}

enum SymbolError {
    Fetch(MarketDataError),
    Evaluation(EvaluationError),
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Write the cache document on the blocking pool. The cache lock is held
/// across the write, so admissions reach the store in order.
async fn save_cache(cache: &mut DedupCache) {
    let Some((store, document)) = cache.pending_save() else {
        return;
    };
    let result = tokio::task::spawn_blocking(move || store.save(&document))
        .await
        .unwrap_or_else(|e| Err(CacheError::Unavailable(format!("save task failed: {}", e))));
    cache.complete_save(result);
}

pub struct SignalRuntime {
    engine: SignalEngine,
    provider: Arc<dyn MarketDataProvider>,
    cache: Mutex<DedupCache>,
    sinks: Vec<Arc<dyn AlertSink>>,
    metrics: Option<Arc<Metrics>>,
    symbols: Vec<String>,
    symbols_blocked: usize,
    candle_limit: usize,
    concurrency: usize,
    cache_ttl: Duration,
    freshness: Option<Duration>,
    display_zone: DisplayZone,
    shutdown: Arc<AtomicBool>,
    latest: ReportHandle,
}

impl SignalRuntime {
    pub fn new(config: &Config, provider: Arc<dyn MarketDataProvider>, cache: DedupCache) -> Self {
        let symbols = config.active_symbols();
        let symbols_blocked = config.blocked_listed_symbols().len();

        Self {
            engine: SignalEngine::from_config(config),
            provider,
            cache: Mutex::new(cache),
            sinks: Vec::new(),
            metrics: None,
            symbols,
            symbols_blocked,
            candle_limit: config.candle_limit,
            concurrency: config.concurrency.max(1),
            cache_ttl: config.cache_ttl(),
            freshness: config.freshness_window(),
            display_zone: config.display_zone(),
            shutdown: Arc::new(AtomicBool::new(false)),
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Production wiring: candle files from `candles_dir`, the JSON cache at
    /// `cache_path`, a log sink, and a webhook sink when a URL is set.
    pub fn from_config(config: &Config) -> Result<Self, AlertError> {
        let provider = Arc::new(FileMarketDataProvider::new(&config.candles_dir));
        let cache = DedupCache::open(
            config.dedup_policy(),
            Box::new(JsonFileStore::new(&config.cache_path)),
        );
        let mut runtime = Self::new(config, provider, cache).with_sink(Arc::new(LogAlertSink));
        if let Some(url) = &config.alert_webhook_url {
            runtime = runtime.with_sink(Arc::new(WebhookAlertSink::new(url.clone())?));
        }
        Ok(runtime)
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn latest_report(&self) -> ReportHandle {
        self.latest.clone()
    }

    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Stop after the symbol currently being admitted.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub async fn run_pass(&self, now: DateTime<Utc>) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new(now);
        report.symbols_total = self.symbols.len();
        report.symbols_blocked = self.symbols_blocked;

        info!(
            symbols = self.symbols.len(),
            blocked = self.symbols_blocked,
            concurrency = self.concurrency,
            "SignalRuntime: starting pass over {} symbols",
            self.symbols.len()
        );

        report.cache_entries_expired = {
            let mut cache = self.cache.lock().await;
            let removed = cache.sweep_expired(self.cache_ttl, now);
            save_cache(&mut cache).await;
            removed
        };

        let outcomes = stream::iter(self.symbols.iter().cloned())
            .take_while(|_| future::ready(!self.is_shutdown()))
            .map(|symbol| self.evaluate_symbol(symbol, now))
            .buffered(self.concurrency);
        futures_util::pin_mut!(outcomes);

        let mut processed = 0;
        while let Some(outcome) = outcomes.next().await {
            processed += 1;
            match outcome {
                SymbolOutcome::Evaluated {
                    symbol,
                    source,
                    signals,
                } => {
                    report.symbols_evaluated += 1;
                    self.admit_signals(&symbol, &source, signals, now, &mut report)
                        .await;
                }
                SymbolOutcome::Skipped(issue) => {
                    info!(symbol = %issue.symbol, reason = %issue.reason, "SignalRuntime: skipped {}", issue.symbol);
                    report.symbols_skipped += 1;
                    report.skipped.push(issue);
                }
                SymbolOutcome::Failed(issue) => {
                    error!(symbol = %issue.symbol, reason = %issue.reason, "SignalRuntime: failed to evaluate {}", issue.symbol);
                    report.symbols_failed += 1;
                    report.failures.push(issue);
                }
            }
            if self.is_shutdown() {
                break;
            }
        }
        report.interrupted = processed < self.symbols.len();
        if report.interrupted {
            warn!(
                processed,
                remaining = self.symbols.len() - processed,
                "SignalRuntime: shutdown requested, remaining symbols not processed"
            );
        }

        self.dispatch(now, &mut report).await;

        {
            let mut cache = self.cache.lock().await;
            if cache.is_dirty() {
                save_cache(&mut cache).await;
            }
            report.warnings = cache.take_warnings();
            report.cache_entries = cache.len();
            report.cache_degraded = cache.is_degraded();
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        self.record_metrics(&report, started.elapsed().as_secs_f64());

        info!(
            evaluated = report.symbols_evaluated,
            skipped = report.symbols_skipped,
            failed = report.symbols_failed,
            detected = report.signals_detected,
            admitted = report.signals_admitted(),
            blocked = report.signals_blocked,
            stale = report.stale_signals,
            duration_ms = report.duration_ms,
            "SignalRuntime: pass complete, {} new signal(s)",
            report.signals_admitted()
        );

        *self.latest.write().await = Some(report.clone());
        report
    }

    async fn evaluate_symbol(&self, symbol: String, now: DateTime<Utc>) -> SymbolOutcome {
        let work = async {
            let series = self
                .provider
                .get_candles(&symbol, self.candle_limit)
                .await
                .map_err(SymbolError::Fetch)?;
            let signals = self
                .engine
                .evaluate(&series.candles, now)
                .map_err(SymbolError::Evaluation)?;
            Ok::<_, SymbolError>((series.source, signals))
        };

        let issue = |reason: String| SymbolIssue {
            symbol: symbol.clone(),
            reason,
        };
        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok((source, signals))) => SymbolOutcome::Evaluated {
                symbol: symbol.clone(),
                source,
                signals,
            },
            Ok(Err(SymbolError::Evaluation(e))) => SymbolOutcome::Skipped(issue(e.to_string())),
            Ok(Err(SymbolError::Fetch(e))) => SymbolOutcome::Failed(issue(e.to_string())),
            Err(payload) => SymbolOutcome::Failed(issue(format!("panicked: {}", panic_message(payload)))),
        }
    }

    async fn admit_signals(
        &self,
        symbol: &str,
        source: &str,
        signals: Vec<DetectedSignal>,
        now: DateTime<Utc>,
        report: &mut RunReport,
    ) {
        for signal in signals {
            report.signals_detected += 1;
            if let Some(metrics) = &self.metrics {
                metrics
                    .signals_detected_total
                    .with_label_values(&[signal.signal_type.as_str()])
                    .inc();
            }

            let age = now - signal.candle_close;
            if let Some(window) = self.freshness {
                if age > window {
                    info!(
                        symbol = %symbol,
                        signal_type = %signal.signal_type,
                        age_seconds = age.num_seconds(),
                        "SignalRuntime: stale {} {} dropped",
                        signal.signal_type,
                        symbol
                    );
                    report.stale_signals += 1;
                    continue;
                }
            }

            let admitted = {
                let mut cache = self.cache.lock().await;
                let admitted = cache.record_admission(
                    symbol,
                    signal.signal_type,
                    signal.candle_time,
                    now,
                    Some(age.num_seconds()),
                );
                if admitted {
                    save_cache(&mut cache).await;
                }
                admitted
            };
            if admitted {
                report
                    .events
                    .push(SignalEvent::from_detected(symbol, source, &signal));
            } else {
                report.signals_blocked += 1;
            }
        }
    }

    async fn dispatch(&self, now: DateTime<Utc>, report: &mut RunReport) {
        if report.events.is_empty() || self.sinks.is_empty() {
            return;
        }
        let batch = AlertBatch::new(now, report.events.clone(), self.display_zone.clone());
        for sink in &self.sinks {
            let outcome = match sink.send(&batch).await {
                Ok(()) => AlertOutcome {
                    sink: sink.name().to_string(),
                    delivered: true,
                    error: None,
                },
                Err(e) => {
                    error!(sink = sink.name(), error = %e, "SignalRuntime: alert delivery failed");
                    AlertOutcome {
                        sink: sink.name().to_string(),
                        delivered: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            report.alerts.push(outcome);
        }
    }

    fn record_metrics(&self, report: &RunReport, seconds: f64) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        metrics.runs_total.inc();
        metrics.symbols_evaluated_total.inc_by(report.symbols_evaluated as u64);
        metrics.symbols_skipped_total.inc_by(report.symbols_skipped as u64);
        metrics.symbols_failed_total.inc_by(report.symbols_failed as u64);
        metrics.alerts_suppressed_total.inc_by(report.signals_blocked as u64);
        metrics.stale_signals_total.inc_by(report.stale_signals as u64);
        for event in &report.events {
            metrics
                .alerts_admitted_total
                .with_label_values(&[event.signal_type.as_str()])
                .inc();
        }
        let failed_sends = report.alerts.iter().filter(|a| !a.delivered).count();
        metrics.alert_send_failures_total.inc_by(failed_sends as u64);
        metrics.cache_entries.set(report.cache_entries as i64);
        metrics.cache_degraded.set(i64::from(report.cache_degraded));
        metrics.run_duration_seconds.observe(seconds);
        metrics.last_run_duration_seconds.set(seconds);
    }
}
