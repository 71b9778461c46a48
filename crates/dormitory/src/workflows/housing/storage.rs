use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::ledger::LedgerSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("ledger storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("ledger lock poisoned")]
    Poisoned,
    #[error("ledger storage unavailable: {0}")]
    Unavailable(String),
}

/// Durable home of the ledger. `save` must be atomic: after a failed save the previously
/// saved snapshot is still the one `load` returns.
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError>;
    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError>;
}

/// Single JSON document on disk, replaced by write-to-temp then rename.
#[derive(Debug)]
pub struct JsonFileSnapshotStore {
    path: PathBuf,
}

impl JsonFileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileSnapshotStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = serde_json::to_vec_pretty(snapshot)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, bytes)?;
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }
}

/// Keeps the last saved snapshot in memory; used when no data path is configured.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    saved: Mutex<Option<LedgerSnapshot>>,
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<LedgerSnapshot>, StorageError> {
        let guard = self.saved.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StorageError> {
        let mut guard = self.saved.lock().map_err(|_| StorageError::Poisoned)?;
        *guard = Some(snapshot.clone());
        Ok(())
    }
}
