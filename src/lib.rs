//! WaveTrend (CipherB) signal engine with candle-aligned alert deduplication.

pub mod alerts;
pub mod cache;
pub mod common;
pub mod config;
pub mod core;
pub mod indicators;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod signals;
