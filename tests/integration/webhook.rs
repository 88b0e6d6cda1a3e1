//! Integration tests for webhook alert delivery

use chrono::{TimeZone, Utc};
use cipherwatch::alerts::{AlertBatch, AlertError, AlertSink, WebhookAlertSink};
use cipherwatch::core::timeframe::DisplayZone;
use cipherwatch::models::signal::{SignalEvent, SignalType};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn batch() -> AlertBatch {
    let event = SignalEvent {
        symbol: "BTCUSDT".to_string(),
        signal_type: SignalType::Buy,
        wt1: -62.4,
        wt2: -64.9,
        source_timestamp: Utc.with_ymd_and_hms(2024, 1, 2, 6, 0, 0).unwrap(),
        exchange_used: "file".to_string(),
    };
    AlertBatch::new(
        Utc.with_ymd_and_hms(2024, 1, 2, 6, 17, 0).unwrap(),
        vec![event],
        DisplayZone::ist(),
    )
}

#[tokio::test]
async fn webhook_posts_consolidated_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/alerts"))
        .and(body_partial_json(serde_json::json!({
            "total": 1,
            "generated_at_display": "2024-01-02 11:47:00 IST",
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let sink = WebhookAlertSink::new(format!("{}/alerts", server.uri())).unwrap();
    sink.send(&batch()).await.expect("delivered");

    let requests = server.received_requests().await.expect("recording enabled");
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["buys"][0]["symbol"], "BTCUSDT");
    assert_eq!(body["buys"][0]["candle_time_display"], "2024-01-02 11:30:00 IST");
    assert!(body["text"].as_str().unwrap().contains("BUY SIGNALS:"));
}

#[tokio::test]
async fn webhook_reports_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let sink = WebhookAlertSink::new(server.uri()).unwrap();
    let err = sink.send(&batch()).await.unwrap_err();
    match err {
        AlertError::Status { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "bad gateway");
        }
        other => panic!("unexpected error: {}", other),
    }
}
