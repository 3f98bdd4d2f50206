// Checkpoint record: the key of the last fully forwarded batch

use crate::forwarder::error::StoreError;
use std::path::{Path, PathBuf};

/// Default checkpoint file
pub const DEFAULT_CHECKPOINT_FILE: &str = "checkpoint.txt";

/// A single overwritable checkpoint
pub trait CheckpointStore {
    /// The stored key, or `None` if nothing was recorded yet
    fn read(&self) -> Result<Option<String>, StoreError>;

    /// Replace the stored key
    fn write(&self, key: &str) -> Result<(), StoreError>;
}

/// Checkpoint kept in a plain text file
///
/// Writes go through a sibling temp file and a rename, so readers see either
/// the old key or the new one.
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
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
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpoint {
    fn read(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let key = contents.trim();
                if key.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(key.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }

    fn write(&self, key: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let tmp = self.temp_path();
        std::fs::write(&tmp, key).map_err(|e| StoreError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::io(&self.path, e))?;

        tracing::debug!("Checkpoint {:?} -> {}", self.path, key);
        Ok(())
    }
}
