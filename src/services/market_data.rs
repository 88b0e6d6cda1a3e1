//! Market data collaborators: where candle series come from.

use crate::config::is_valid_symbol;
use crate::core::timeframe::parse_instant;
use crate::models::indicators::{Candle, CandleSeries};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Error, Debug)]
pub enum MarketDataError {
    #[error("no candles available for {symbol}")]
    NotFound { symbol: String },
    #[error("reading candles for {symbol} from {path}: {source}")]
    Io {
        symbol: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed candles for {symbol}: {reason}")]
    Parse { symbol: String, reason: String },
    #[error("invalid symbol '{symbol}'")]
    InvalidSymbol { symbol: String },
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Up to `limit` most recent candles for `symbol`, oldest first.
    async fn get_candles(&self, symbol: &str, limit: usize) -> Result<CandleSeries, MarketDataError>;

    /// Venue name recorded on emitted events.
    fn source(&self) -> &str;
}

fn tail(mut candles: Vec<Candle>, limit: usize) -> Vec<Candle> {
    if limit > 0 && candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    candles
}

/// Fixed candle sets keyed by symbol.
#[derive(Debug, Default)]
pub struct InMemoryMarketDataProvider {
    series: RwLock<HashMap<String, Vec<Candle>>>,
}

impl InMemoryMarketDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_candles(mut self, symbol: impl Into<String>, candles: Vec<Candle>) -> Self {
        self.series.get_mut().insert(symbol.into(), candles);
        self
    }

    pub async fn set_candles(&self, symbol: impl Into<String>, candles: Vec<Candle>) {
        self.series.write().await.insert(symbol.into(), candles);
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryMarketDataProvider {
    async fn get_candles(&self, symbol: &str, limit: usize) -> Result<CandleSeries, MarketDataError> {
        let series = self.series.read().await;
        let candles = series.get(symbol).cloned().ok_or_else(|| MarketDataError::NotFound {
            symbol: symbol.to_string(),
        })?;
        Ok(CandleSeries::new(symbol, self.source(), tail(candles, limit)))
    }

    fn source(&self) -> &str {
        "memory"
    }
}

/// Reads `<dir>/<SYMBOL>.json`.
///
/// The document is an array of candles (or an object with a `candles`
/// array). Each candle is either an object with `open_time` (alias
/// `timestamp`/`time`), `open`, `high`, `low`, `close`, `volume`, or an
/// exchange row `[open_time_ms, open, high, low, close, volume, ...]`.
/// Numbers may be given as strings; times as epoch milliseconds or ISO text.
#[derive(Debug, Clone)]
pub struct FileMarketDataProvider {
    dir: PathBuf,
}

impl FileMarketDataProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<dir>/<SYMBOL>.json`. Symbols that could leave `dir` are refused.
    fn path_for(&self, symbol: &str) -> Result<PathBuf, MarketDataError> {
        if !is_valid_symbol(symbol) {
            return Err(MarketDataError::InvalidSymbol {
                symbol: symbol.to_string(),
            });
        }
        Ok(self.dir.join(format!("{}.json", symbol)))
    }
}

#[async_trait]
impl MarketDataProvider for FileMarketDataProvider {
    async fn get_candles(&self, symbol: &str, limit: usize) -> Result<CandleSeries, MarketDataError> {
        let path = self.path_for(symbol)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(MarketDataError::NotFound {
                    symbol: symbol.to_string(),
                })
            }
            Err(source) => {
                return Err(MarketDataError::Io {
                    symbol: symbol.to_string(),
                    path,
                    source,
                })
            }
        };

        let candles = parse_candles(&raw).map_err(|reason| MarketDataError::Parse {
            symbol: symbol.to_string(),
            reason,
        })?;
        debug!(symbol = %symbol, count = candles.len(), path = %path.display(), "Loaded candles from file");

        Ok(CandleSeries::new(symbol, self.source(), tail(candles, limit)))
    }

    fn source(&self) -> &str {
        "file"
    }
}

/// Parse a candle document in any of the accepted layouts.
pub fn parse_candles(raw: &str) -> Result<Vec<Candle>, String> {
    let document: Value = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    let rows = match &document {
        Value::Array(rows) => rows,
        Value::Object(map) => match map.get("candles") {
            Some(Value::Array(rows)) => rows,
            _ => return Err("object document without a `candles` array".to_string()),
        },
        _ => return Err("expected an array of candles".to_string()),
    };

    rows.iter()
        .enumerate()
        .map(|(i, row)| parse_candle(row).ok_or_else(|| format!("candle {} is malformed", i)))
        .collect()
}

fn parse_candle(row: &Value) -> Option<Candle> {
    match row {
        Value::Array(fields) if fields.len() >= 6 => Some(Candle::new(
            number(&fields[1])?,
            number(&fields[2])?,
            number(&fields[3])?,
            number(&fields[4])?,
            number(&fields[5])?,
            instant(&fields[0])?,
        )),
        Value::Object(map) => {
            let time = ["open_time", "timestamp", "time"]
                .iter()
                .find_map(|key| map.get(*key))?;
            Some(Candle::new(
                number(map.get("open")?)?,
                number(map.get("high")?)?,
                number(map.get("low")?)?,
                number(map.get("close")?)?,
                number(map.get("volume")?)?,
                instant(time)?,
            ))
        }
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => parse_instant(s),
        _ => None,
    }
}
