//! Moving averages over `f64` series.
//!
//! All series helpers return a vector aligned 1:1 with the input.

/// Smoothing factor `2 / (period + 1)`.
pub fn smoothing_factor(period: usize) -> f64 {
    2.0 / (period as f64 + 1.0)
}

/// One EMA step from the previous average.
pub fn ema_from_previous(value: f64, previous: f64, period: usize) -> f64 {
    previous + smoothing_factor(period) * (value - previous)
}

/// Exponential moving average seeded with the first observation
/// (no bias-correction warm-up).
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut previous: Option<f64> = None;
    for &value in values {
        let next = match previous {
            None => value,
            Some(prev) => ema_from_previous(value, prev, period),
        };
        out.push(next);
        previous = Some(next);
    }
    out
}

/// Simple moving average; indices before the first full window are NaN.
pub fn sma_series(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                f64::NAN
            } else {
                values[i + 1 - period..=i].iter().sum::<f64>() / period as f64
            }
        })
        .collect()
}
