//! Admit-or-block decisions for candidate signals.
//!
//! The full key map is loaded once, and rewritten after every admission and
//! every cleanup pass. Storage failures switch the cache to memory-only for
//! the rest of its life and are reported as [`CacheWarning`]s.

use crate::cache::store::{CacheDocument, CacheError, CacheStore};
use crate::core::timeframe::{parse_instant, TimeBucket};
use crate::models::signal::SignalType;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// How dedup keys are shaped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupMode {
    /// `symbol | type | bucket_start`: one alert per symbol/type per bucket.
    #[default]
    PerBucket,
    /// `symbol | type`: one alert per symbol/type per cooldown window.
    Cooldown,
}

impl FromStr for DedupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "per_bucket" | "bucket" => Ok(DedupMode::PerBucket),
            "cooldown" => Ok(DedupMode::Cooldown),
            other => Err(format!("unknown dedup mode '{}'", other)),
        }
    }
}

impl fmt::Display for DedupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupMode::PerBucket => f.write_str("per_bucket"),
            DedupMode::Cooldown => f.write_str("cooldown"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupPolicy {
    pub mode: DedupMode,
    pub bucket_width_minutes: u32,
    pub cooldown: Duration,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            mode: DedupMode::PerBucket,
            bucket_width_minutes: 15,
            cooldown: Duration::minutes(15),
        }
    }
}

impl DedupPolicy {
    pub fn key(&self, symbol: &str, signal_type: SignalType, timestamp: DateTime<Utc>) -> String {
        match self.mode {
            DedupMode::PerBucket => {
                let bucket = TimeBucket::containing(timestamp, self.bucket_width_minutes);
                format!("{}_{}_{}", symbol, signal_type, bucket.label())
            }
            DedupMode::Cooldown => format!("{}_{}", symbol, signal_type),
        }
    }
}

/// What is remembered about an admitted signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// Wall-clock instant of the admission.
    pub alerted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal_time: Option<DateTime<Utc>>,
    /// Age of the signal's candle close at admission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub freshness_seconds: Option<i64>,
}

/// A stored value. Unreadable values are kept verbatim until swept.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Valid(AlertRecord),
    Corrupt(Value),
}

impl CacheEntry {
    /// Accepts a record object or a bare timestamp string.
    pub fn from_value(value: Value) -> Self {
        match &value {
            Value::String(raw) => match parse_instant(raw) {
                Some(alerted_at) => CacheEntry::Valid(AlertRecord {
                    alerted_at,
                    signal_time: None,
                    freshness_seconds: None,
                }),
                None => CacheEntry::Corrupt(value),
            },
            Value::Object(_) => match serde_json::from_value::<AlertRecord>(value.clone()) {
                Ok(record) => CacheEntry::Valid(record),
                Err(_) => CacheEntry::Corrupt(value),
            },
            _ => CacheEntry::Corrupt(value),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            CacheEntry::Valid(record) => serde_json::to_value(record).unwrap_or(Value::Null),
            CacheEntry::Corrupt(value) => value.clone(),
        }
    }

    pub fn record(&self) -> Option<&AlertRecord> {
        match self {
            CacheEntry::Valid(record) => Some(record),
            CacheEntry::Corrupt(_) => None,
        }
    }
}

/// Non-fatal cache conditions reported to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheWarning {
    /// The store could not be read; running memory-only.
    LoadFailed { store: String, reason: String },
    /// The stored document was unreadable; started empty.
    CorruptDocument { store: String, reason: String },
    /// Some stored values were unreadable; they are swept by cleanup.
    CorruptEntries { store: String, count: usize },
    /// A write failed; running memory-only from here on.
    SaveFailed { store: String, reason: String },
}

impl fmt::Display for CacheWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheWarning::LoadFailed { store, reason } => {
                write!(f, "cache {} unreadable, running in memory only: {}", store, reason)
            }
            CacheWarning::CorruptDocument { store, reason } => {
                write!(f, "cache {} corrupt, starting empty: {}", store, reason)
            }
            CacheWarning::CorruptEntries { store, count } => {
                write!(f, "cache {} has {} unreadable entries", store, count)
            }
            CacheWarning::SaveFailed { store, reason } => {
                write!(f, "cache {} not writable, running in memory only: {}", store, reason)
            }
        }
    }
}

pub struct DedupCache {
    policy: DedupPolicy,
    entries: BTreeMap<String, CacheEntry>,
    store: Option<Arc<dyn CacheStore>>,
    store_name: String,
    degraded: bool,
    dirty: bool,
    warnings: Vec<CacheWarning>,
}

impl fmt::Debug for DedupCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupCache")
            .field("policy", &self.policy)
            .field("entries", &self.entries.len())
            .field("store", &self.store_name)
            .field("degraded", &self.degraded)
            .finish()
    }
}

impl DedupCache {
    /// Cache with no backing store.
    pub fn in_memory(policy: DedupPolicy) -> Self {
        Self::empty(policy, "memory".to_string())
    }

    fn empty(policy: DedupPolicy, store_name: String) -> Self {
        Self {
            policy,
            entries: BTreeMap::new(),
            store: None,
            store_name,
            degraded: false,
            dirty: false,
            warnings: Vec::new(),
        }
    }

    /// Load from `store`. Never fails: an unreadable store degrades the
    /// cache, a corrupt document starts it empty.
    pub fn open(policy: DedupPolicy, store: Box<dyn CacheStore>) -> Self {
        let store: Arc<dyn CacheStore> = Arc::from(store);
        let store_name = store.describe();
        let mut cache = Self::empty(policy, store_name.clone());

        match store.load() {
            Ok(Some(document)) => {
                cache.entries = document
                    .into_iter()
                    .map(|(key, value)| (key, CacheEntry::from_value(value)))
                    .collect();
                let corrupt = cache.corrupt_count();
                if corrupt > 0 {
                    warn!(store = %store_name, corrupt, "DedupCache: unreadable entries will be swept");
                    cache.warnings.push(CacheWarning::CorruptEntries {
                        store: store_name.clone(),
                        count: corrupt,
                    });
                }
                info!(
                    store = %store_name,
                    entries = cache.entries.len(),
                    "DedupCache: loaded {} entries",
                    cache.entries.len()
                );
                cache.store = Some(store);
            }
            Ok(None) => {
                debug!(store = %store_name, "DedupCache: no stored document, starting empty");
                cache.store = Some(store);
            }
            Err(CacheError::Corrupt { reason, .. }) => {
                warn!(store = %store_name, reason = %reason, "DedupCache: corrupt document, starting empty");
                cache.warnings.push(CacheWarning::CorruptDocument {
                    store: store_name,
                    reason,
                });
                cache.store = Some(store);
            }
            Err(e) => {
                warn!(store = %store_name, error = %e, "DedupCache: load failed, running in memory only");
                cache.warnings.push(CacheWarning::LoadFailed {
                    store: store_name,
                    reason: e.to_string(),
                });
                cache.degraded = true;
            }
        }

        cache
    }

    pub fn policy(&self) -> &DedupPolicy {
        &self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    /// True once persistence has been abandoned for this cache.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn take_warnings(&mut self) -> Vec<CacheWarning> {
        std::mem::take(&mut self.warnings)
    }

    fn corrupt_count(&self) -> usize {
        self.entries
            .values()
            .filter(|entry| matches!(entry, CacheEntry::Corrupt(_)))
            .count()
    }

    /// [`DedupCache::is_allowed_at`] against the current wall clock.
    pub fn is_allowed(&mut self, symbol: &str, signal_type: SignalType, timestamp: DateTime<Utc>) -> bool {
        self.is_allowed_at(symbol, signal_type, timestamp, Utc::now())
    }

    pub fn is_allowed_at(
        &mut self,
        symbol: &str,
        signal_type: SignalType,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        self.admit(symbol, signal_type, timestamp, now, None)
    }

    /// Check-and-set. Records the admission and persists it before
    /// returning true.
    pub fn admit(
        &mut self,
        symbol: &str,
        signal_type: SignalType,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
        freshness_seconds: Option<i64>,
    ) -> bool {
        let admitted = self.record_admission(symbol, signal_type, timestamp, now, freshness_seconds);
        if admitted {
            self.persist();
        }
        admitted
    }

    /// Check-and-set without writing. The caller persists the admission
    /// through [`DedupCache::pending_save`] before releasing the cache.
    pub fn record_admission(
        &mut self,
        symbol: &str,
        signal_type: SignalType,
        timestamp: DateTime<Utc>,
        now: DateTime<Utc>,
        freshness_seconds: Option<i64>,
    ) -> bool {
        let key = self.policy.key(symbol, signal_type, timestamp);

        let blocked_since = match (self.entries.get(&key), self.policy.mode) {
            (Some(CacheEntry::Valid(record)), DedupMode::PerBucket) => Some(record.alerted_at),
            (Some(CacheEntry::Valid(record)), DedupMode::Cooldown)
                if now - record.alerted_at < self.policy.cooldown =>
            {
                Some(record.alerted_at)
            }
            _ => None,
        };

        if let Some(alerted_at) = blocked_since {
            info!(
                key = %key,
                alerted_at = %alerted_at,
                "DedupCache: BLOCKED {} {} (already alerted)",
                symbol,
                signal_type
            );
            return false;
        }

        self.entries.insert(
            key.clone(),
            CacheEntry::Valid(AlertRecord {
                alerted_at: now,
                signal_time: Some(timestamp),
                freshness_seconds,
            }),
        );
        self.dirty = true;
        info!(key = %key, "DedupCache: ALLOWED {} {}", symbol, signal_type);
        true
    }

    /// [`DedupCache::cleanup_expired_at`] against the current wall clock.
    pub fn cleanup_expired(&mut self, ttl: Duration) -> usize {
        self.cleanup_expired_at(ttl, Utc::now())
    }

    /// Drop entries recorded more than `ttl` before `now`, and every
    /// unreadable entry. Returns how many were removed.
    pub fn cleanup_expired_at(&mut self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let removed = self.sweep_expired(ttl, now);
        self.persist();
        removed
    }

    /// Cleanup without writing. The map is marked for a full rewrite even
    /// when nothing was removed.
    pub fn sweep_expired(&mut self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| match entry {
            CacheEntry::Valid(record) => now - record.alerted_at <= ttl,
            CacheEntry::Corrupt(_) => false,
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            info!(removed, remaining = self.entries.len(), "DedupCache: cleaned up {} expired entries", removed);
        }
        self.dirty = true;
        removed
    }

    /// Write the full map to the store if there is one.
    pub fn flush(&mut self) {
        if self.dirty {
            self.persist();
        }
    }

    fn document(&self) -> CacheDocument {
        self.entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.to_value()))
            .collect()
    }

    /// True when the map holds changes the store has not seen.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The store and a snapshot of the full map, for writing off the
    /// caller's thread. `None` when running memory-only. Hand the result of
    /// the write back to [`DedupCache::complete_save`].
    pub fn pending_save(&self) -> Option<(Arc<dyn CacheStore>, CacheDocument)> {
        self.store
            .as_ref()
            .map(|store| (Arc::clone(store), self.document()))
    }

    fn persist(&mut self) {
        if let Some((store, document)) = self.pending_save() {
            let result = store.save(&document);
            self.complete_save(result);
        }
    }

    /// Record the outcome of a write started from [`DedupCache::pending_save`].
    /// A failure switches the cache to memory-only.
    pub fn complete_save(&mut self, result: Result<(), CacheError>) {
        if self.store.is_none() {
            return;
        }
        match result {
            Ok(()) => self.dirty = false,
            Err(e) => {
                warn!(store = %self.store_name, error = %e, "DedupCache: save failed, running in memory only");
                self.warnings.push(CacheWarning::SaveFailed {
                    store: self.store_name.clone(),
                    reason: e.to_string(),
                });
                self.store = None;
                self.degraded = true;
            }
        }
    }
}

impl Drop for DedupCache {
    fn drop(&mut self) {
        self.flush();
    }
}
