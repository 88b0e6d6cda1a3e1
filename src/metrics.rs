//! Prometheus metrics for the signal worker.
//!
//! Each [`Metrics`] owns its registry, so several instances (tests, the
//! one-shot binary) never collide on registration.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

pub struct Metrics {
    registry: Registry,
    pub runs_total: IntCounter,
    pub symbols_evaluated_total: IntCounter,
    pub symbols_skipped_total: IntCounter,
    pub symbols_failed_total: IntCounter,
    pub signals_detected_total: IntCounterVec,
    pub alerts_admitted_total: IntCounterVec,
    pub alerts_suppressed_total: IntCounter,
    pub stale_signals_total: IntCounter,
    pub alert_send_failures_total: IntCounter,
    pub cache_entries: IntGauge,
    pub cache_degraded: IntGauge,
    pub run_duration_seconds: Histogram,
    pub last_run_duration_seconds: Gauge,
    pub http_requests_total: IntCounter,
    pub http_requests_in_flight: IntGauge,
    pub http_request_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs_total = IntCounter::new("signal_runs_total", "Completed evaluation passes")?;
        let symbols_evaluated_total = IntCounter::new(
            "signal_symbols_evaluated_total",
            "Symbols evaluated without error",
        )?;
        let symbols_skipped_total = IntCounter::new(
            "signal_symbols_skipped_total",
            "Symbols skipped by the data quality gate",
        )?;
        let symbols_failed_total = IntCounter::new(
            "signal_symbols_failed_total",
            "Symbols that failed to fetch or evaluate",
        )?;
        let signals_detected_total = IntCounterVec::new(
            Opts::new("signal_detected_total", "Signals found on closed candles"),
            &["signal_type"],
        )?;
        let alerts_admitted_total = IntCounterVec::new(
            Opts::new("signal_alerts_admitted_total", "Signals admitted by the dedup cache"),
            &["signal_type"],
        )?;
        let alerts_suppressed_total = IntCounter::new(
            "signal_alerts_suppressed_total",
            "Signals rejected as duplicates",
        )?;
        let stale_signals_total = IntCounter::new(
            "signal_stale_total",
            "Signals dropped by the freshness window",
        )?;
        let alert_send_failures_total = IntCounter::new(
            "signal_alert_send_failures_total",
            "Alert batches the sink failed to deliver",
        )?;
        let cache_entries = IntGauge::new("dedup_cache_entries", "Entries in the dedup cache")?;
        let cache_degraded = IntGauge::new(
            "dedup_cache_degraded",
            "1 while the dedup cache runs without persistence",
        )?;
        let run_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "signal_run_duration_seconds",
            "Wall time of one evaluation pass",
        ))?;
        let last_run_duration_seconds = Gauge::new(
            "signal_last_run_duration_seconds",
            "Wall time of the most recent evaluation pass",
        )?;
        let http_requests_total =
            IntCounter::new("http_requests_total", "HTTP requests served")?;
        let http_requests_in_flight =
            IntGauge::new("http_requests_in_flight", "HTTP requests being served")?;
        let http_request_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request latency",
        ))?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(symbols_evaluated_total.clone()))?;
        registry.register(Box::new(symbols_skipped_total.clone()))?;
        registry.register(Box::new(symbols_failed_total.clone()))?;
        registry.register(Box::new(signals_detected_total.clone()))?;
        registry.register(Box::new(alerts_admitted_total.clone()))?;
        registry.register(Box::new(alerts_suppressed_total.clone()))?;
        registry.register(Box::new(stale_signals_total.clone()))?;
        registry.register(Box::new(alert_send_failures_total.clone()))?;
        registry.register(Box::new(cache_entries.clone()))?;
        registry.register(Box::new(cache_degraded.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;
        registry.register(Box::new(last_run_duration_seconds.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_requests_in_flight.clone()))?;
        registry.register(Box::new(http_request_duration_seconds.clone()))?;

        // Touch the labelled series so they show up before the first signal.
        for label in ["BUY", "SELL"] {
            signals_detected_total.with_label_values(&[label]);
            alerts_admitted_total.with_label_values(&[label]);
        }

        Ok(Self {
            registry,
            runs_total,
            symbols_evaluated_total,
            symbols_skipped_total,
            symbols_failed_total,
            signals_detected_total,
            alerts_admitted_total,
            alerts_suppressed_total,
            stale_signals_total,
            alert_send_failures_total,
            cache_entries,
            cache_degraded,
            run_duration_seconds,
            last_run_duration_seconds,
            http_requests_total,
            http_requests_in_flight,
            http_request_duration_seconds,
        })
    }

    /// Text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
