//! Unit tests for the WaveTrend oscillator

use crate::fixtures::{dip_series, flat_series, spike_series, DIP_CROSS_INDEX, DIP_THRESHOLD_INDEX};
use cipherwatch::indicators::momentum::wavetrend::{
    calculate_wavetrend, wavetrend_lines, MaType, WaveTrendParams,
};
use cipherwatch::models::indicators::OscillatorSample;
use cipherwatch::signals::detection::SignalPolicy;

fn buy_indices(samples: &[OscillatorSample]) -> Vec<usize> {
    samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.buy_signal)
        .map(|(i, _)| i)
        .collect()
}

fn sell_indices(samples: &[OscillatorSample]) -> Vec<usize> {
    samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.sell_signal)
        .map(|(i, _)| i)
        .collect()
}

#[test]
fn test_short_series_yields_no_samples() {
    let params = WaveTrendParams::default();
    let short = params.channel_len + params.average_len - 1;
    assert!(calculate_wavetrend(&dip_series(short), &params).is_empty());
    assert!(calculate_wavetrend(&dip_series(params.min_candles() - 1), &params).is_empty());
    assert!(calculate_wavetrend(&[], &params).is_empty());
}

#[test]
fn test_zero_length_parameter_yields_no_samples() {
    let params = WaveTrendParams {
        ma_len: 0,
        ..WaveTrendParams::default()
    };
    assert!(wavetrend_lines(&dip_series(150), &params).is_none());
}

#[test]
fn test_samples_align_with_candles() {
    let candles = dip_series(150);
    let samples = calculate_wavetrend(&candles, &WaveTrendParams::default());
    assert_eq!(samples.len(), candles.len());
    for (sample, candle) in samples.iter().zip(&candles) {
        assert_eq!(sample.timestamp, candle.open_time);
    }
}

#[test]
fn test_recomputation_is_bit_identical() {
    let candles = dip_series(150);
    let params = WaveTrendParams::default();
    let first = calculate_wavetrend(&candles, &params);
    let second = calculate_wavetrend(&candles, &params);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.wt1.to_bits(), b.wt1.to_bits());
        assert_eq!(a.wt2.to_bits(), b.wt2.to_bits());
        assert_eq!(a.buy_signal, b.buy_signal);
        assert_eq!(a.sell_signal, b.sell_signal);
    }
}

#[test]
fn test_dip_produces_single_cross_buy_with_sma() {
    let samples = calculate_wavetrend(&dip_series(150), &WaveTrendParams::default());
    assert_eq!(buy_indices(&samples), vec![DIP_CROSS_INDEX]);
    assert!(sell_indices(&samples).is_empty());

    let at = &samples[DIP_CROSS_INDEX];
    assert!(at.wt1 > at.wt2);
    assert!(at.wt1 <= -60.0 && at.wt2 <= -60.0);
}

#[test]
fn test_dip_produces_single_cross_buy_with_ema() {
    let params = WaveTrendParams {
        ma_type: MaType::Ema,
        ..WaveTrendParams::default()
    };
    let samples = calculate_wavetrend(&dip_series(150), &params);
    assert_eq!(buy_indices(&samples), vec![DIP_CROSS_INDEX]);
    assert!(sell_indices(&samples).is_empty());
}

#[test]
fn test_threshold_policy_fires_on_exit_from_oversold() {
    let params = WaveTrendParams {
        policy: SignalPolicy::Threshold,
        ..WaveTrendParams::default()
    };
    let samples = calculate_wavetrend(&dip_series(150), &params);
    assert_eq!(buy_indices(&samples), vec![DIP_THRESHOLD_INDEX]);
    assert!(sell_indices(&samples).is_empty());

    let prev = &samples[DIP_THRESHOLD_INDEX - 1];
    let at = &samples[DIP_THRESHOLD_INDEX];
    assert!(prev.wt1 <= -60.0);
    assert!(at.wt1 > -60.0);
}

#[test]
fn test_mirrored_spike_produces_single_sell() {
    let samples = calculate_wavetrend(&spike_series(150), &WaveTrendParams::default());
    assert!(buy_indices(&samples).is_empty());
    assert_eq!(sell_indices(&samples), vec![DIP_CROSS_INDEX]);
}

#[test]
fn test_sma_wt2_is_nan_before_first_window() {
    let samples = calculate_wavetrend(&dip_series(60), &WaveTrendParams::default());
    assert!(samples[0].wt2.is_nan());
    assert!(samples[1].wt2.is_nan());
    assert!(samples[2].wt2.is_finite());
}

#[test]
fn test_causal_prefix_matches_full_series() {
    let full = calculate_wavetrend(&dip_series(150), &WaveTrendParams::default());
    let prefix = calculate_wavetrend(&dip_series(122), &WaveTrendParams::default());
    for i in 0..prefix.len() {
        assert_eq!(full[i].wt1.to_bits(), prefix[i].wt1.to_bits());
        assert_eq!(full[i].buy_signal, prefix[i].buy_signal);
    }
}

#[test]
fn test_zero_deviation_is_singular_not_fatal() {
    let samples = calculate_wavetrend(&flat_series(60, 100.0), &WaveTrendParams::default());
    assert_eq!(samples.len(), 60);
    assert!(samples.iter().all(|s| s.singular));
    assert!(samples.iter().all(|s| !s.has_signal()));
    assert_eq!(samples[59].wt1, 0.0);
    assert_eq!(samples[59].wt2, 0.0);
}
