use crate::alerts::batch::AlertBatch;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("alert request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("alert endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, batch: &AlertBatch) -> Result<(), AlertError>;

    fn name(&self) -> &str;
}

/// Writes the batch to the tracing output.
#[derive(Debug, Clone, Default)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn send(&self, batch: &AlertBatch) -> Result<(), AlertError> {
        for event in &batch.events {
            info!(
                symbol = %event.symbol,
                signal_type = %event.signal_type,
                wt1 = event.wt1,
                wt2 = event.wt2,
                candle_time = %event.source_timestamp,
                exchange = %event.exchange_used,
                "Alert: {} {}",
                event.signal_type,
                event.symbol
            );
        }
        info!(total = batch.len(), "Alert batch:\n{}", batch.render_text());
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// POSTs [`AlertBatch::to_payload`] as JSON.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn send(&self, batch: &AlertBatch) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(&batch.to_payload())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url = %self.url, status = status.as_u16(), "Webhook rejected alert batch");
            return Err(AlertError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(url = %self.url, total = batch.len(), "Webhook accepted alert batch");
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
