use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A signal found on the closed candle of a series, before deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSignal {
    pub signal_type: SignalType,
    pub wt1: f64,
    pub wt2: f64,
    /// Open time of the candle the signal fired on.
    pub candle_time: DateTime<Utc>,
    /// Close of the bucket holding that candle.
    pub candle_close: DateTime<Utc>,
    pub index: usize,
}

/// An admitted, deduplicated signal handed to the alert sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub symbol: String,
    pub signal_type: SignalType,
    pub wt1: f64,
    pub wt2: f64,
    pub source_timestamp: DateTime<Utc>,
    pub exchange_used: String,
}

impl SignalEvent {
    pub fn from_detected(symbol: &str, exchange: &str, signal: &DetectedSignal) -> Self {
        Self {
            symbol: symbol.to_string(),
            signal_type: signal.signal_type,
            wt1: signal.wt1,
            wt2: signal.wt2,
            source_timestamp: signal.candle_time,
            exchange_used: exchange.to_string(),
        }
    }
}
