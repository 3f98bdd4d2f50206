// Batch files on disk: naming, listing and (de)serialization

use crate::forwarder::error::StoreError;
use crate::forwarder::message::{Message, Page, ReplayOrder};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default directory for cached batches
pub const DEFAULT_CACHE_DIR: &str = "cached_batches";

fn batch_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^batch_(\d+)\.json$").ok())
        .as_ref()
}

/// Storage key for batch number `n`
pub fn batch_key(n: u64) -> String {
    format!("batch_{}.json", n)
}

/// Extract the batch number from a file name, or -1 if it does not match
pub fn extract_batch_number(name: &str) -> i64 {
    batch_pattern()
        .and_then(|re| re.captures(name))
        .and_then(|caps| caps[1].parse::<i64>().ok())
        .unwrap_or(-1)
}

/// Sort keys for replay
///
/// Unparseable names always end up last, whatever the order.
pub fn sort_batch_keys(keys: &mut [String], order: ReplayOrder) {
    keys.sort_by(|a, b| {
        let (na, nb) = (extract_batch_number(a), extract_batch_number(b));
        match (na < 0, nb < 0) {
            (true, true) => a.cmp(b),
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => match order {
                ReplayOrder::OldestFirst => nb.cmp(&na),
                ReplayOrder::AsRecorded => na.cmp(&nb),
            },
        }
    });
}

/// Durable storage for pages
pub trait BatchStore {
    /// Persist a page under `key`, replacing any previous content
    fn write(&self, key: &str, page: &Page) -> Result<(), StoreError>;

    /// Read the page stored under `key`
    fn read(&self, key: &str) -> Result<Page, StoreError>;

    /// All keys currently in the store, unsorted
    fn list_keys(&self) -> Result<Vec<String>, StoreError>;
}

/// Batch store backed by one pretty-printed JSON file per page
pub struct DirBatchStore {
    dir: PathBuf,
}

impl DirBatchStore {
    /// Open (and create if needed) a batch directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }

    /// Keys that look like batch files
    pub fn batch_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list_keys()?
            .into_iter()
            .filter(|k| extract_batch_number(k) >= 0)
            .collect())
    }
}

impl BatchStore for DirBatchStore {
    fn write(&self, key: &str, page: &Page) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let json = serde_json::to_vec_pretty(page.messages()).map_err(|e| StoreError::Malformed {
            key: key.to_string(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| StoreError::io(&path, e))
    }

    fn read(&self, key: &str) -> Result<Page, StoreError> {
        let path = self.path_for(key)?;
        let bytes = std::fs::read(&path).map_err(|e| StoreError::io(&path, e))?;
        let messages: Vec<Message> =
            serde_json::from_slice(&bytes).map_err(|e| StoreError::Malformed {
                key: key.to_string(),
                source: e,
            })?;
        Ok(Page::new(messages))
    }

    fn list_keys(&self) -> Result<Vec<String>, StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.dir, e))?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.to_string());
            }
        }
        Ok(keys)
    }
}
