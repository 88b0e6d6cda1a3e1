//! Unit tests for buy/sell flag detection on synthetic oscillator lines

use cipherwatch::signals::detection::{detect_signals, Bands, SignalPolicy};

fn all_eligible(len: usize) -> Vec<bool> {
    vec![true; len]
}

#[test]
fn test_cross_buy_fires_exactly_at_crossing_inside_oversold_band() {
    // wt1 climbs through a flat wt2 between index 4 and 5.
    let wt1 = [-80.0, -79.0, -78.0, -76.0, -72.5, -69.0, -66.0, -64.0];
    let wt2 = [-70.0; 8];
    let flags = detect_signals(SignalPolicy::Cross, &wt1, &wt2, &all_eligible(8), Bands::default());

    for (i, f) in flags.iter().enumerate() {
        assert_eq!(f.buy, i == 5, "unexpected buy flag at {}", i);
        assert!(!f.sell);
    }
}

#[test]
fn test_cross_outside_band_is_ignored() {
    let wt1 = [-30.0, -25.0, -15.0];
    let wt2 = [-20.0, -20.0, -20.0];
    let flags = detect_signals(SignalPolicy::Cross, &wt1, &wt2, &all_eligible(3), Bands::default());
    assert!(flags.iter().all(|f| !f.buy && !f.sell));
}

#[test]
fn test_cross_sell_requires_both_lines_overbought() {
    let wt1 = [75.0, 70.0];
    let wt2 = [72.0, 72.0];
    let flags = detect_signals(SignalPolicy::Cross, &wt1, &wt2, &all_eligible(2), Bands::default());
    assert!(flags[1].sell);

    let wt2_low = [59.0, 59.0];
    let wt1_low = [61.0, 58.0];
    let flags = detect_signals(SignalPolicy::Cross, &wt1_low, &wt2_low, &all_eligible(2), Bands::default());
    assert!(!flags[1].sell);
}

#[test]
fn test_threshold_policy_ignores_wt2() {
    let wt1 = [-65.0, -59.0, 62.0, 58.0];
    let wt2 = [f64::NAN; 4];
    let flags = detect_signals(SignalPolicy::Threshold, &wt1, &wt2, &all_eligible(4), Bands::default());
    assert!(flags[1].buy);
    assert!(!flags[2].buy && !flags[2].sell);
    assert!(flags[3].sell);
}

#[test]
fn test_nan_inputs_and_ineligible_indices_never_signal() {
    let wt1 = [-80.0, -75.0, -68.0];
    let wt2 = [f64::NAN, -70.0, -70.0];
    let eligible = [true, true, false];
    let flags = detect_signals(SignalPolicy::Cross, &wt1, &wt2, &eligible, Bands::default());
    assert!(flags.iter().all(|f| !f.buy && !f.sell));
}

#[test]
fn test_custom_bands() {
    let bands = Bands {
        oversold: -40.0,
        overbought: 40.0,
    };
    let wt1 = [-50.0, -45.0];
    let wt2 = [-48.0, -47.0];
    let flags = detect_signals(SignalPolicy::Cross, &wt1, &wt2, &all_eligible(2), bands);
    assert!(flags[1].buy);
}

#[test]
fn test_policy_parsing_accepts_variant_names() {
    assert_eq!("exact".parse::<SignalPolicy>().unwrap(), SignalPolicy::Cross);
    assert_eq!("Threshold".parse::<SignalPolicy>().unwrap(), SignalPolicy::Threshold);
    assert_eq!("pure".parse::<SignalPolicy>().unwrap(), SignalPolicy::Threshold);
    assert!("crossover-ish".parse::<SignalPolicy>().is_err());
}
