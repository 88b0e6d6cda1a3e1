//! Integration tests for the worker status server

use axum_test::TestServer;
use cipherwatch::cache::dedup::DedupCache;
use cipherwatch::core::http::{create_router, AppState, SERVICE_NAME};
use cipherwatch::metrics::Metrics;
use cipherwatch::services::market_data::InMemoryMarketDataProvider;
use serde_json::Value;
use std::sync::Arc;

use crate::test_utils::{crossover_window, runtime_with, test_config, RecordingSink};

#[tokio::test]
async fn health_endpoint_reports_healthy_status() {
    let metrics = Arc::new(Metrics::new().expect("metrics initialization"));
    let state = AppState::new(metrics, Default::default());
    let server = TestServer::new(create_router(state)).expect("start test server");

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], SERVICE_NAME);
    assert!(body["uptime_seconds"].as_u64().is_some());
    assert!(body["last_run"].is_null());
}

#[tokio::test]
async fn latest_run_is_not_found_before_first_pass() {
    let metrics = Arc::new(Metrics::new().unwrap());
    let server = TestServer::new(create_router(AppState::new(metrics, Default::default()))).unwrap();

    let response = server.get("/api/runs/latest").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn latest_run_and_metrics_reflect_a_completed_pass() {
    let config = test_config(&["BTCUSDT"]);
    let (candles, now) = crossover_window();
    let provider = InMemoryMarketDataProvider::new().with_candles("BTCUSDT", candles);
    let metrics = Arc::new(Metrics::new().unwrap());
    let runtime = runtime_with(
        &config,
        provider,
        DedupCache::in_memory(config.dedup_policy()),
        Arc::new(RecordingSink::default()),
    )
    .with_metrics(metrics.clone());
    runtime.run_pass(now).await;

    let state = AppState::new(metrics, runtime.latest_report());
    let server = TestServer::new(create_router(state)).unwrap();

    let response = server.get("/api/runs/latest").await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["symbols_evaluated"], 1);
    assert_eq!(body["events"][0]["symbol"], "BTCUSDT");
    assert_eq!(body["events"][0]["signal_type"], "BUY");

    let _ = server.get("/health").await;
    let metrics_text = server.get("/metrics").await.text();
    assert!(metrics_text.contains("signal_runs_total 1"));
    assert!(metrics_text.contains("http_requests_total"));
    assert!(metrics_text.contains("http_request_duration_seconds"));
}
