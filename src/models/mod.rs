//! Shared data models spanning the engine layers.

pub mod indicators;
pub mod signal;

pub use indicators::{Candle, CandleSeries, OscillatorSample};
pub use signal::{DetectedSignal, SignalEvent, SignalType};
