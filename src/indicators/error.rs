use chrono::{DateTime, Utc};
use thiserror::Error;

/// Reasons a candle series is not evaluated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("not enough candles: {actual} < {required}")]
    InsufficientCandles { required: usize, actual: usize },
    #[error("invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: String },
    #[error("candle open times not strictly increasing at index {index} ({timestamp})")]
    NonIncreasingTime { index: usize, timestamp: DateTime<Utc> },
    #[error("latest candle has no traded volume")]
    InactiveMarket,
    #[error("price range {range_pct:.4} below minimum {min_pct:.4}")]
    FlatMarket { range_pct: f64, min_pct: f64 },
}
