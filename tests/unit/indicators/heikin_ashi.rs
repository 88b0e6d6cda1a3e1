//! Unit tests for Heikin-Ashi smoothing

use crate::fixtures::{dip_series, open_time};
use cipherwatch::indicators::heikin_ashi::heikin_ashi;
use cipherwatch::models::indicators::Candle;

#[test]
fn test_empty_input_gives_empty_output() {
    assert!(heikin_ashi(&[]).is_empty());
}

#[test]
fn test_first_candle_seeds_from_its_own_body() {
    let raw = [Candle::new(10.0, 14.0, 8.0, 12.0, 5.0, open_time(0))];
    let ha = heikin_ashi(&raw);
    assert_eq!(ha[0].close, (10.0 + 14.0 + 8.0 + 12.0) / 4.0);
    assert_eq!(ha[0].open, 11.0);
    assert_eq!(ha[0].high, 14.0);
    assert_eq!(ha[0].low, 8.0);
}

#[test]
fn test_open_follows_previous_output_candle() {
    let raw = [
        Candle::new(10.0, 14.0, 8.0, 12.0, 5.0, open_time(0)),
        Candle::new(12.0, 13.0, 11.0, 12.5, 6.0, open_time(1)),
    ];
    let ha = heikin_ashi(&raw);
    assert_eq!(ha[1].open, (ha[0].open + ha[0].close) / 2.0);
    assert_eq!(ha[1].close, (12.0 + 13.0 + 11.0 + 12.5) / 4.0);
    assert!(ha[1].high >= ha[1].open.max(ha[1].close));
    assert!(ha[1].low <= ha[1].open.min(ha[1].close));
}

#[test]
fn test_alignment_volume_and_time_are_kept() {
    let raw = dip_series(40);
    let ha = heikin_ashi(&raw);
    assert_eq!(ha.len(), raw.len());
    for (h, r) in ha.iter().zip(&raw) {
        assert_eq!(h.open_time, r.open_time);
        assert_eq!(h.volume, r.volume);
    }
}
