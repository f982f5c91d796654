//! Storage backends for the two persisted records.
//!
//! Backends move raw JSON values; decoding (and purging of records that no
//! longer decode) is the store's job, so a backend never rejects legacy data.

use serde_json::Value;
use std::fmt::Debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::StoreError;

/// File holding the article collection
pub const ARTICLES_FILE: &str = "articles.json";

/// File holding the last-search record
pub const LAST_SEARCH_FILE: &str = "last-search.json";

/// Physical storage for the article collection and the last-search record
///
/// `Ok(None)` means the record has never been written.
pub trait StorageBackend: Send + Sync + Debug {
    fn read_articles(&self) -> Result<Option<Vec<Value>>, StoreError>;

    fn write_articles(&self, records: &[Value]) -> Result<(), StoreError>;

    fn read_last_search(&self) -> Result<Option<Value>, StoreError>;

    fn write_last_search(&self, record: &Value) -> Result<(), StoreError>;

    /// Human-readable location for status output
    fn describe(&self) -> String;
}

/// JSON files in a data directory
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read_json(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write to a sibling temp file and rename over the target
    fn write_json(&self, name: &str, value: &Value) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.dir.join(name);
        let temp = self.dir.join(format!(".{}.tmp", name));

        let mut file = fs::File::create(&temp)?;
        file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, &target)?;
        Ok(())
    }
}

impl StorageBackend for JsonFileBackend {
    fn read_articles(&self) -> Result<Option<Vec<Value>>, StoreError> {
        match self.read_json(ARTICLES_FILE)? {
            None => Ok(None),
            Some(Value::Array(records)) => Ok(Some(records)),
            Some(other) => Err(StoreError::Corrupt(format!(
                "{} is not a JSON array (found {})",
                ARTICLES_FILE,
                json_kind(&other)
            ))),
        }
    }

    fn write_articles(&self, records: &[Value]) -> Result<(), StoreError> {
        self.write_json(ARTICLES_FILE, &Value::Array(records.to_vec()))
    }

    fn read_last_search(&self) -> Result<Option<Value>, StoreError> {
        self.read_json(LAST_SEARCH_FILE)
    }

    fn write_last_search(&self, record: &Value) -> Result<(), StoreError> {
        self.write_json(LAST_SEARCH_FILE, record)
    }

    fn describe(&self) -> String {
        self.dir.display().to_string()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// In-process storage
///
/// Used when no data directory is wanted and in tests. Can be switched to
/// "unavailable" to simulate a storage outage.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    articles: Mutex<Option<Vec<Value>>>,
    last_search: Mutex<Option<Value>>,
    unavailable: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-seeded with raw article records
    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            articles: Mutex::new(Some(records)),
            ..Self::default()
        }
    }

    pub fn with_last_search(self, record: Value) -> Self {
        *self.last_search.lock().unwrap_or_else(|e| e.into_inner()) = Some(record);
        self
    }

    /// Make every subsequent read and write fail (or succeed again)
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Raw article records as currently stored
    pub fn records(&self) -> Option<Vec<Value>> {
        self.articles.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory backend switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn read_articles(&self) -> Result<Option<Vec<Value>>, StoreError> {
        self.check()?;
        Ok(self.records())
    }

    fn write_articles(&self, records: &[Value]) -> Result<(), StoreError> {
        self.check()?;
        *self.articles.lock().unwrap_or_else(|e| e.into_inner()) = Some(records.to_vec());
        Ok(())
    }

    fn read_last_search(&self) -> Result<Option<Value>, StoreError> {
        self.check()?;
        Ok(self.last_search.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn write_last_search(&self, record: &Value) -> Result<(), StoreError> {
        self.check()?;
        *self.last_search.lock().unwrap_or_else(|e| e.into_inner()) = Some(record.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
