//! Heikin-Ashi candle smoothing

use crate::models::indicators::Candle;

/// Transform raw candles into Heikin-Ashi candles.
///
/// `open'` is a first-order recurrence on the previous output candle, so the
/// series is built in a single forward pass. Timestamps and volume are kept.
pub fn heikin_ashi(candles: &[Candle]) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());

    for candle in candles {
        let close = (candle.open + candle.high + candle.low + candle.close) / 4.0;
        let open = match out.last() {
            Some(prev) => (prev.open + prev.close) / 2.0,
            None => (candle.open + candle.close) / 2.0,
        };
        let high = open.max(close).max(candle.high);
        let low = open.min(close).min(candle.low);

        out.push(Candle::new(open, high, low, close, candle.volume, candle.open_time));
    }

    out
}
