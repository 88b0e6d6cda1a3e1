//! WaveTrend (CipherB) oscillator
//!
//! ```text
//! tp   = (high + low + close) / 3
//! esa  = EMA(tp, channel_len)
//! de   = EMA(|tp - esa|, channel_len)
//! ci   = (tp - esa) / (0.015 * de)
//! wt1  = EMA(ci, average_len)
//! wt2  = SMA(wt1, ma_len) | EMA(wt1, ma_len)
//! ```
//!
//! Where `de == 0` (or `ci` is otherwise not finite) the index is singular:
//! `ci` holds the last finite value (0.0 before any) and no signal is
//! evaluated there. Signals are also never flagged inside the filter
//! warm-up, i.e. before index `channel_len + average_len + ma_len`.

use crate::common::math;
use crate::models::indicators::{Candle, OscillatorSample};
use crate::signals::detection::{detect_signals, Bands, SignalPolicy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CI_COEFFICIENT: f64 = 0.015;

/// Smoothing applied to wt1 to obtain wt2.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaType {
    #[default]
    Sma,
    Ema,
}

impl FromStr for MaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sma" => Ok(MaType::Sma),
            "ema" => Ok(MaType::Ema),
            other => Err(format!("unknown moving average type '{}'", other)),
        }
    }
}

impl fmt::Display for MaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaType::Sma => f.write_str("sma"),
            MaType::Ema => f.write_str("ema"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WaveTrendParams {
    pub channel_len: usize,
    pub average_len: usize,
    pub ma_len: usize,
    pub ma_type: MaType,
    pub bands: Bands,
    pub policy: SignalPolicy,
}

impl Default for WaveTrendParams {
    fn default() -> Self {
        Self {
            channel_len: 9,
            average_len: 12,
            ma_len: 3,
            ma_type: MaType::Sma,
            bands: Bands::default(),
            policy: SignalPolicy::Cross,
        }
    }
}

impl WaveTrendParams {
    /// Shortest series the oscillator is computed for; also the first
    /// index on which a signal may fire.
    pub fn min_candles(&self) -> usize {
        self.channel_len + self.average_len + self.ma_len
    }
}

/// Raw oscillator lines before signal detection.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveTrendLines {
    pub wt1: Vec<f64>,
    pub wt2: Vec<f64>,
    pub singular: Vec<bool>,
}

/// Compute wt1/wt2. Returns `None` for an under-length series or a
/// zero-length parameter.
pub fn wavetrend_lines(candles: &[Candle], params: &WaveTrendParams) -> Option<WaveTrendLines> {
    if params.channel_len == 0 || params.average_len == 0 || params.ma_len == 0 {
        return None;
    }
    if candles.is_empty() || candles.len() < params.min_candles() {
        return None;
    }

    let typical: Vec<f64> = candles.iter().map(Candle::typical_price).collect();
    let esa = math::ema_series(&typical, params.channel_len);
    let distance: Vec<f64> = typical
        .iter()
        .zip(&esa)
        .map(|(tp, esa)| (tp - esa).abs())
        .collect();
    let deviation = math::ema_series(&distance, params.channel_len);

    let mut ci = Vec::with_capacity(candles.len());
    let mut singular = Vec::with_capacity(candles.len());
    let mut last_valid = 0.0;
    for i in 0..candles.len() {
        let value = (typical[i] - esa[i]) / (CI_COEFFICIENT * deviation[i]);
        if deviation[i] == 0.0 || !value.is_finite() {
            ci.push(last_valid);
            singular.push(true);
        } else {
            last_valid = value;
            ci.push(value);
            singular.push(false);
        }
    }

    let wt1 = math::ema_series(&ci, params.average_len);
    let wt2 = match params.ma_type {
        MaType::Sma => math::sma_series(&wt1, params.ma_len),
        MaType::Ema => math::ema_series(&wt1, params.ma_len),
    };

    Some(WaveTrendLines { wt1, wt2, singular })
}

/// Full oscillator sample series with buy/sell flags, aligned 1:1 with
/// `candles`. Empty when the series is too short.
pub fn calculate_wavetrend(candles: &[Candle], params: &WaveTrendParams) -> Vec<OscillatorSample> {
    let Some(lines) = wavetrend_lines(candles, params) else {
        return Vec::new();
    };

    let warmup = params.min_candles();
    let eligible: Vec<bool> = lines
        .singular
        .iter()
        .enumerate()
        .map(|(i, singular)| i >= warmup && !singular)
        .collect();
    let flags = detect_signals(params.policy, &lines.wt1, &lines.wt2, &eligible, params.bands);

    candles
        .iter()
        .zip(flags)
        .enumerate()
        .map(|(i, (candle, flags))| OscillatorSample {
            timestamp: candle.open_time,
            wt1: lines.wt1[i],
            wt2: lines.wt2[i],
            buy_signal: flags.buy,
            sell_signal: flags.sell,
            singular: lines.singular[i],
        })
        .collect()
}
