//! Buy/sell flag detection over a wt1/wt2 oscillator pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which condition turns oscillator movement into a signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalPolicy {
    /// wt1 crosses wt2 while both lines sit inside the oversold
    /// (BUY) or overbought (SELL) band.
    #[default]
    Cross,
    /// wt1 alone crosses back over the oversold (BUY) or
    /// overbought (SELL) level, regardless of wt2.
    Threshold,
}

impl FromStr for SignalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cross" | "exact" => Ok(SignalPolicy::Cross),
            "threshold" | "pure" => Ok(SignalPolicy::Threshold),
            other => Err(format!("unknown signal policy '{}'", other)),
        }
    }
}

impl fmt::Display for SignalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalPolicy::Cross => f.write_str("cross"),
            SignalPolicy::Threshold => f.write_str("threshold"),
        }
    }
}

/// Oscillator band levels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands {
    pub oversold: f64,
    pub overbought: f64,
}

impl Default for Bands {
    fn default() -> Self {
        Self {
            oversold: -60.0,
            overbought: 60.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalFlags {
    pub buy: bool,
    pub sell: bool,
}

/// Evaluate the policy at index `i` (which must be >= 1).
pub fn detect_at(policy: SignalPolicy, wt1: &[f64], wt2: &[f64], i: usize, bands: Bands) -> SignalFlags {
    let (prev1, cur1) = (wt1[i - 1], wt1[i]);
    match policy {
        SignalPolicy::Cross => {
            let (prev2, cur2) = (wt2[i - 1], wt2[i]);
            if ![prev1, cur1, prev2, cur2].iter().all(|v| v.is_finite()) {
                return SignalFlags::default();
            }
            let crossed_up = prev1 <= prev2 && cur1 > cur2;
            let crossed_down = prev1 >= prev2 && cur1 < cur2;
            let oversold = cur1 <= bands.oversold && cur2 <= bands.oversold;
            let overbought = cur1 >= bands.overbought && cur2 >= bands.overbought;
            SignalFlags {
                buy: crossed_up && oversold,
                sell: crossed_down && overbought,
            }
        }
        SignalPolicy::Threshold => {
            if !prev1.is_finite() || !cur1.is_finite() {
                return SignalFlags::default();
            }
            SignalFlags {
                buy: prev1 <= bands.oversold && cur1 > bands.oversold,
                sell: prev1 >= bands.overbought && cur1 < bands.overbought,
            }
        }
    }
}

/// Flags for every index. Index 0 and any index with `eligible[i] == false`
/// never carry a signal.
pub fn detect_signals(
    policy: SignalPolicy,
    wt1: &[f64],
    wt2: &[f64],
    eligible: &[bool],
    bands: Bands,
) -> Vec<SignalFlags> {
    let len = wt1.len().min(wt2.len()).min(eligible.len());
    (0..len)
        .map(|i| {
            if i == 0 || !eligible[i] {
                SignalFlags::default()
            } else {
                detect_at(policy, wt1, wt2, i, bands)
            }
        })
        .collect()
}
