//! Main signal evaluation engine: candles in, closed-candle signals out.

use crate::config::Config;
use crate::core::timeframe::BucketResolver;
use crate::indicators::error::IndicatorError;
use crate::indicators::heikin_ashi::heikin_ashi;
use crate::indicators::momentum::wavetrend::{calculate_wavetrend, WaveTrendParams};
use crate::indicators::validation::{validate_series, SeriesRules};
use crate::models::indicators::{Candle, OscillatorSample};
use crate::models::signal::{DetectedSignal, SignalType};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error(transparent)]
    Series(#[from] IndicatorError),
    #[error("oscillator produced no samples ({candles} candles, {required} required)")]
    NoSamples { candles: usize, required: usize },
    #[error("no closed candle to evaluate")]
    NoClosedCandle,
}

/// Stateless evaluator. Every call recomputes from the full window.
#[derive(Debug, Clone)]
pub struct SignalEngine {
    params: WaveTrendParams,
    rules: SeriesRules,
    resolver: BucketResolver,
    use_heikin_ashi: bool,
}

impl SignalEngine {
    pub fn new(
        params: WaveTrendParams,
        rules: SeriesRules,
        resolver: BucketResolver,
        use_heikin_ashi: bool,
    ) -> Self {
        Self {
            params,
            rules,
            resolver,
            use_heikin_ashi,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.wavetrend_params(),
            config.series_rules(),
            config.bucket_resolver(),
            config.use_heikin_ashi,
        )
    }

    pub fn params(&self) -> &WaveTrendParams {
        &self.params
    }

    pub fn resolver(&self) -> &BucketResolver {
        &self.resolver
    }

    /// Oscillator samples for every candle (after optional Heikin-Ashi
    /// smoothing). No validation, no closed-candle selection.
    pub fn samples(&self, candles: &[Candle]) -> Vec<OscillatorSample> {
        if self.use_heikin_ashi {
            calculate_wavetrend(&heikin_ashi(candles), &self.params)
        } else {
            calculate_wavetrend(candles, &self.params)
        }
    }

    /// Index of the newest candle that is safe to treat as closed at `now`.
    /// The last candle qualifies once its bucket is past the grace period,
    /// otherwise the one before it is used.
    pub fn closed_index(&self, candles: &[Candle], now: DateTime<Utc>) -> Option<usize> {
        let last = candles.last()?;
        let bucket = self.resolver.bucket_of(last.open_time);
        if self.resolver.is_finalized(now, &bucket) {
            Some(candles.len() - 1)
        } else {
            candles.len().checked_sub(2)
        }
    }

    /// Validate the series and return the signals on its closed candle.
    pub fn evaluate(
        &self,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Result<Vec<DetectedSignal>, EvaluationError> {
        validate_series(candles, &self.rules)?;

        let samples = self.samples(candles);
        if samples.is_empty() {
            return Err(EvaluationError::NoSamples {
                candles: candles.len(),
                required: self.params.min_candles(),
            });
        }

        let index = self
            .closed_index(candles, now)
            .ok_or(EvaluationError::NoClosedCandle)?;
        let sample = &samples[index];

        if !sample.wt1.is_finite() || !sample.wt2.is_finite() {
            debug!(
                index,
                wt1 = sample.wt1,
                wt2 = sample.wt2,
                "SignalEngine: non-finite oscillator on closed candle, skipping"
            );
            return Ok(Vec::new());
        }

        let candle_time = candles[index].open_time;
        let candle_close = self.resolver.bucket_of(candle_time).close;
        let detected = |signal_type| DetectedSignal {
            signal_type,
            wt1: sample.wt1,
            wt2: sample.wt2,
            candle_time,
            candle_close,
            index,
        };

        let mut signals = Vec::new();
        if sample.buy_signal {
            signals.push(detected(SignalType::Buy));
        }
        if sample.sell_signal {
            signals.push(detected(SignalType::Sell));
        }

        debug!(
            index,
            candle_time = %candle_time,
            wt1 = sample.wt1,
            wt2 = sample.wt2,
            buy = sample.buy_signal,
            sell = sample.sell_signal,
            "SignalEngine: evaluated closed candle"
        );

        Ok(signals)
    }
}
