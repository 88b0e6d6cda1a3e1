//! Engine configuration.
//!
//! One struct with named fields and documented defaults. Values come from
//! `CIPHERWATCH_*` environment variables (a `.env` file is honoured by the
//! binaries) and are validated once at startup.

use crate::cache::dedup::{DedupMode, DedupPolicy};
use crate::core::timeframe::{BucketResolver, DisplayZone};
use crate::indicators::momentum::wavetrend::{MaType, WaveTrendParams};
use crate::indicators::validation::SeriesRules;
use crate::signals::detection::{Bands, SignalPolicy};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const ENV_PREFIX: &str = "CIPHERWATCH_";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    Parse {
        var: String,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {field} {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WaveTrend channel length (ESA and deviation EMAs). Default 9.
    pub channel_len: usize,
    /// WaveTrend average length (wt1 EMA). Default 12.
    pub average_len: usize,
    /// wt2 smoothing length. Default 3.
    pub ma_len: usize,
    /// wt2 smoothing kind. Default `sma`.
    pub ma_type: MaType,
    /// Default -60.
    pub oversold_threshold: f64,
    /// Default 60.
    pub overbought_threshold: f64,
    /// Default `cross`.
    pub signal_policy: SignalPolicy,
    /// Smooth candles with Heikin-Ashi before the oscillator. Default off.
    pub use_heikin_ashi: bool,
    /// Candle bucket width. Default 15.
    pub bucket_width_minutes: u32,
    /// Time after a bucket close before it counts as finalized. Default 2.
    pub finality_grace_minutes: u32,
    /// Default `per_bucket`.
    pub dedup_mode: DedupMode,
    /// Cooldown between alerts per symbol/type in cooldown mode. Default 15.
    pub cooldown_minutes: f64,
    /// Age after which cache entries are swept. Default 24.
    pub cache_ttl_hours: f64,
    /// Reject signals whose candle closed longer ago than this. Default off.
    pub freshness_minutes: Option<f64>,
    /// Minimum candles for a series to be evaluated. Default 50.
    pub min_candles: usize,
    /// Candles requested per symbol. Default 200.
    pub candle_limit: usize,
    /// Minimum relative high/low range of a series. Default 0.005.
    pub min_price_range_pct: f64,
    pub symbols: Vec<String>,
    pub blocked_symbols: Vec<String>,
    /// Dedup cache document. Default `cache/alert_cache.json`.
    pub cache_path: PathBuf,
    /// Directory read by the file market data provider. Default `data/candles`.
    pub candles_dir: PathBuf,
    /// Symbols fetched concurrently. Default 4.
    pub concurrency: usize,
    /// Display shift for rendered timestamps. Default 330 (IST).
    pub display_offset_minutes: i32,
    pub display_label: String,
    pub alert_webhook_url: Option<String>,
    /// Port for the worker status server; unset disables it.
    pub http_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_len: 9,
            average_len: 12,
            ma_len: 3,
            ma_type: MaType::Sma,
            oversold_threshold: -60.0,
            overbought_threshold: 60.0,
            signal_policy: SignalPolicy::Cross,
            use_heikin_ashi: false,
            bucket_width_minutes: 15,
            finality_grace_minutes: 2,
            dedup_mode: DedupMode::PerBucket,
            cooldown_minutes: 15.0,
            cache_ttl_hours: 24.0,
            freshness_minutes: None,
            min_candles: 50,
            candle_limit: 200,
            min_price_range_pct: 0.005,
            symbols: Vec::new(),
            blocked_symbols: Vec::new(),
            cache_path: PathBuf::from("cache/alert_cache.json"),
            candles_dir: PathBuf::from("data/candles"),
            concurrency: 4,
            display_offset_minutes: 330,
            display_label: "IST".to_string(),
            alert_webhook_url: None,
            http_port: None,
        }
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let var = format!("{}{}", ENV_PREFIX, name);
    match lookup(&var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(value) => value.parse::<T>().map(Some).map_err(|e| ConfigError::Parse {
            var,
            value,
            reason: e.to_string(),
        }),
    }
}

fn parse_list(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<Vec<String>> {
    lookup(&format!("{}{}", ENV_PREFIX, name)).map(|raw| {
        raw.split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("not a boolean: {}", other)),
    }
}

impl Config {
    /// Defaults overlaid with `CIPHERWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        macro_rules! overlay {
            ($field:ident, $name:literal) => {
                if let Some(value) = parse_var(&lookup, $name)? {
                    config.$field = value;
                }
            };
        }

        overlay!(channel_len, "CHANNEL_LEN");
        overlay!(average_len, "AVERAGE_LEN");
        overlay!(ma_len, "MA_LEN");
        overlay!(ma_type, "MA_TYPE");
        overlay!(oversold_threshold, "OVERSOLD_THRESHOLD");
        overlay!(overbought_threshold, "OVERBOUGHT_THRESHOLD");
        overlay!(signal_policy, "SIGNAL_POLICY");
        overlay!(bucket_width_minutes, "BUCKET_WIDTH_MINUTES");
        overlay!(finality_grace_minutes, "FINALITY_GRACE_MINUTES");
        overlay!(dedup_mode, "DEDUP_MODE");
        overlay!(cooldown_minutes, "COOLDOWN_MINUTES");
        overlay!(cache_ttl_hours, "CACHE_TTL_HOURS");
        overlay!(min_candles, "MIN_CANDLES");
        overlay!(candle_limit, "CANDLE_LIMIT");
        overlay!(min_price_range_pct, "MIN_PRICE_RANGE_PCT");
        overlay!(cache_path, "CACHE_PATH");
        overlay!(candles_dir, "CANDLES_DIR");
        overlay!(concurrency, "CONCURRENCY");
        overlay!(display_offset_minutes, "DISPLAY_OFFSET_MINUTES");
        overlay!(display_label, "DISPLAY_LABEL");

        let var = format!("{}USE_HEIKIN_ASHI", ENV_PREFIX);
        if let Some(raw) = lookup(&var).filter(|v| !v.trim().is_empty()) {
            config.use_heikin_ashi = parse_bool(raw.trim()).map_err(|reason| ConfigError::Parse {
                var,
                value: raw.clone(),
                reason,
            })?;
        }

        config.freshness_minutes = parse_var(&lookup, "FRESHNESS_MINUTES")?;
        config.alert_webhook_url = parse_var(&lookup, "ALERT_WEBHOOK_URL")?;
        config.http_port = parse_var(&lookup, "HTTP_PORT")?;

        if let Some(symbols) = parse_list(&lookup, "SYMBOLS") {
            config.symbols = symbols;
        }
        if let Some(blocked) = parse_list(&lookup, "BLOCKED_SYMBOLS") {
            config.blocked_symbols = blocked;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };

        if self.channel_len == 0 {
            return invalid("channel_len", "must be positive");
        }
        if self.average_len == 0 {
            return invalid("average_len", "must be positive");
        }
        if self.ma_len == 0 {
            return invalid("ma_len", "must be positive");
        }
        if !(self.oversold_threshold < self.overbought_threshold) {
            return invalid("oversold_threshold", "must be below overbought_threshold");
        }

        let width = self.bucket_width_minutes;
        if width == 0 || width > 24 * 60 {
            return invalid("bucket_width_minutes", "must be between 1 and 1440");
        }
        let aligned = if width <= 60 {
            60 % width == 0
        } else {
            width % 60 == 0 && (24 * 60) % width == 0
        };
        if !aligned {
            return invalid(
                "bucket_width_minutes",
                "must divide an hour, or be whole hours dividing a day",
            );
        }
        if self.finality_grace_minutes >= width {
            return invalid("finality_grace_minutes", "must be shorter than the bucket width");
        }

        if !(self.cooldown_minutes.is_finite() && self.cooldown_minutes > 0.0) {
            return invalid("cooldown_minutes", "must be positive");
        }
        if !(self.cache_ttl_hours.is_finite() && self.cache_ttl_hours > 0.0) {
            return invalid("cache_ttl_hours", "must be positive");
        }
        if let Some(fresh) = self.freshness_minutes {
            if !(fresh.is_finite() && fresh > 0.0) {
                return invalid("freshness_minutes", "must be positive when set");
            }
        }
        if !(self.min_price_range_pct.is_finite() && self.min_price_range_pct >= 0.0) {
            return invalid("min_price_range_pct", "must be zero or positive");
        }
        if self.candle_limit < self.min_candles {
            return invalid("candle_limit", "must be at least min_candles");
        }
        if self.concurrency == 0 {
            return invalid("concurrency", "must be at least 1");
        }
        if DisplayZone::new(self.display_offset_minutes, self.display_label.clone()).is_none() {
            return invalid("display_offset_minutes", "must be within one day of UTC");
        }
        if let Some(bad) = self
            .symbols
            .iter()
            .map(|s| s.trim())
            .find(|s| !s.is_empty() && !is_valid_symbol(s)) {
            return invalid(
                "symbols",
                &format!("'{}' may only contain letters, digits, '-' or '_'", bad),
            );
        }

        Ok(())
    }

    pub fn wavetrend_params(&self) -> WaveTrendParams {
        WaveTrendParams {
            channel_len: self.channel_len,
            average_len: self.average_len,
            ma_len: self.ma_len,
            ma_type: self.ma_type,
            bands: Bands {
                oversold: self.oversold_threshold,
                overbought: self.overbought_threshold,
            },
            policy: self.signal_policy,
        }
    }

    pub fn series_rules(&self) -> SeriesRules {
        SeriesRules {
            min_candles: self.min_candles,
            min_price_range_pct: self.min_price_range_pct,
        }
    }

    pub fn bucket_resolver(&self) -> BucketResolver {
        BucketResolver::new(self.bucket_width_minutes, self.finality_grace_minutes)
    }

    pub fn dedup_policy(&self) -> DedupPolicy {
        DedupPolicy {
            mode: self.dedup_mode,
            bucket_width_minutes: self.bucket_width_minutes,
            cooldown: minutes(self.cooldown_minutes),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        minutes(self.cache_ttl_hours * 60.0)
    }

    pub fn freshness_window(&self) -> Option<Duration> {
        self.freshness_minutes.map(minutes)
    }

    pub fn display_zone(&self) -> DisplayZone {
        DisplayZone::new(self.display_offset_minutes, self.display_label.clone())
            .unwrap_or_default()
    }

    /// Configured symbols, upper-cased, without duplicates or blocked ones.
    pub fn active_symbols(&self) -> Vec<String> {
        let blocked = self.blocked_set();
        self.listed_symbols()
            .into_iter()
            .filter(|symbol| !blocked.contains(symbol))
            .collect()
    }

    /// Configured symbols removed by `blocked_symbols`, counted once each.
    pub fn blocked_listed_symbols(&self) -> Vec<String> {
        let blocked = self.blocked_set();
        self.listed_symbols()
            .into_iter()
            .filter(|symbol| blocked.contains(symbol))
            .collect()
    }

    fn blocked_set(&self) -> Vec<String> {
        self.blocked_symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .collect()
    }

    fn listed_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = Vec::with_capacity(self.symbols.len());
        for symbol in self.symbols.iter().map(|s| s.trim().to_uppercase()) {
            if symbol.is_empty() || symbols.contains(&symbol) {
                continue;
            }
            symbols.push(symbol);
        }
        symbols
    }
}

/// Symbols name candle files, so they are limited to ASCII letters, digits,
/// `-` and `_`.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn minutes(value: f64) -> Duration {
    Duration::milliseconds((value * 60_000.0).round() as i64)
}

/// Deployment environment, `sandbox` unless `CIPHERWATCH_ENV` says otherwise.
pub fn get_environment() -> String {
    env::var(format!("{}ENV", ENV_PREFIX))
        .ok()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "sandbox".to_string())
}
