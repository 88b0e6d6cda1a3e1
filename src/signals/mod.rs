//! Signal detection and evaluation.

pub mod detection;
pub mod engine;

pub use detection::*;
pub use engine::*;
