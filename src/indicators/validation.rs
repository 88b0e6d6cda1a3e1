//! Data quality gate applied to a candle series before evaluation.

use crate::indicators::error::IndicatorError;
use crate::models::indicators::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesRules {
    pub min_candles: usize,
    /// Minimum `(max high - min low) / mean close`. 0 disables the check.
    pub min_price_range_pct: f64,
}

impl Default for SeriesRules {
    fn default() -> Self {
        Self {
            min_candles: 50,
            min_price_range_pct: 0.005,
        }
    }
}

pub fn validate_candle(index: usize, candle: &Candle) -> Result<(), IndicatorError> {
    let invalid = |reason: &str| IndicatorError::InvalidCandle {
        index,
        reason: reason.to_string(),
    };

    if !candle.is_finite() {
        return Err(invalid("non-finite value"));
    }
    if candle.close <= 0.0 {
        return Err(invalid("close must be positive"));
    }
    if candle.volume < 0.0 {
        return Err(invalid("negative volume"));
    }
    if candle.high < candle.low {
        return Err(invalid("high below low"));
    }
    Ok(())
}

pub fn validate_series(candles: &[Candle], rules: &SeriesRules) -> Result<(), IndicatorError> {
    if candles.is_empty() || candles.len() < rules.min_candles {
        return Err(IndicatorError::InsufficientCandles {
            required: rules.min_candles.max(1),
            actual: candles.len(),
        });
    }

    for (index, candle) in candles.iter().enumerate() {
        validate_candle(index, candle)?;
        if index > 0 && candle.open_time <= candles[index - 1].open_time {
            return Err(IndicatorError::NonIncreasingTime {
                index,
                timestamp: candle.open_time,
            });
        }
    }

    if candles.last().map_or(true, |c| c.volume <= 0.0) {
        return Err(IndicatorError::InactiveMarket);
    }

    if rules.min_price_range_pct > 0.0 {
        let high = candles.iter().map(|c| c.high).fold(f64::MIN, f64::max);
        let low = candles.iter().map(|c| c.low).fold(f64::MAX, f64::min);
        let mean_close = candles.iter().map(|c| c.close).sum::<f64>() / candles.len() as f64;
        let range_pct = (high - low) / mean_close;
        if range_pct < rules.min_price_range_pct {
            return Err(IndicatorError::FlatMarket {
                range_pct,
                min_pct: rules.min_price_range_pct,
            });
        }
    }

    Ok(())
}
