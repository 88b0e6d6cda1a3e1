//! Persistent alert deduplication.

pub mod dedup;
pub mod store;

pub use dedup::{AlertRecord, CacheEntry, CacheWarning, DedupCache, DedupMode, DedupPolicy};
pub use store::{CacheError, CacheStore, JsonFileStore, MemoryStore};
