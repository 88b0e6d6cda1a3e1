//! Momentum indicators: WaveTrend

pub mod wavetrend;

pub use wavetrend::*;
