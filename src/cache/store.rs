//! Durable backing for the dedup cache: one flat JSON object per document.

use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

pub type CacheDocument = Map<String, Value>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cache document {path} is not a JSON object: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("cache serialization: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Whole-document load/save. There are no partial updates.
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<CacheDocument>, CacheError>;
    fn save(&self, document: &CacheDocument) -> Result<(), CacheError>;
    fn describe(&self) -> String;
}

/// JSON file written atomically through a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "alert_cache.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, path: &Path, source: io::Error) -> CacheError {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl CacheStore for JsonFileStore {
    fn load(&self) -> Result<Option<CacheDocument>, CacheError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(other) => Err(CacheError::Corrupt {
                path: self.path.clone(),
                reason: format!("top-level value is {}", json_kind(&other)),
            }),
            Err(e) => Err(CacheError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }
        let body = serde_json::to_string_pretty(document)?;
        let temp = self.temp_path();
        fs::write(&temp, body).map_err(|e| self.io_error(&temp, e))?;
        fs::rename(&temp, &self.path).map_err(|e| self.io_error(&self.path, e))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// In-process store. Clones share the same document.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    document: Arc<Mutex<Option<CacheDocument>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: CacheDocument) -> Self {
        Self {
            document: Arc::new(Mutex::new(Some(document))),
        }
    }

    /// Last saved document.
    pub fn snapshot(&self) -> Option<CacheDocument> {
        self.document.lock().ok().and_then(|guard| guard.clone())
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<Option<CacheDocument>, CacheError> {
        self.document
            .lock()
            .map(|guard| guard.clone())
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    fn save(&self, document: &CacheDocument) -> Result<(), CacheError> {
        let mut guard = self
            .document
            .lock()
            .map_err(|e| CacheError::Unavailable(e.to_string()))?;
        *guard = Some(document.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
