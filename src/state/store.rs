//! Persistence of the authoritative timer record
//!
//! The record lives under a single key (`focusTimerState.json` on disk).
//! Writes go through a temp file + rename so a crash mid-write never leaves
//! a half-written record behind.

use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use tempfile::NamedTempFile;
use thiserror::Error;

use super::TimerState;

/// Name of the persisted record
pub const STATE_KEY: &str = "focusTimerState";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Failed to replace state file: {0}")]
    Persist(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Backend holding the one persisted timer record
pub trait StateStore: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet
    fn load(&self) -> Result<Option<TimerState>, StoreError>;

    fn save(&self, state: &TimerState) -> Result<(), StoreError>;
}

/// JSON file store inside a data directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Open (and create if needed) the data directory
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(format!("{}.json", STATE_KEY)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<TimerState>, StoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            tracing::warn!(path = %self.path.display(), "Empty state file");
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, state: &TimerState) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(state)?;
        let parent = self
            .path
            .parent()
            .ok_or_else(|| StoreError::Persist("state file has no parent directory".to_string()))?;

        let mut temp_file = NamedTempFile::new_in(parent)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.flush()?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StoreError::Persist(e.error.to_string()))?;
        Ok(())
    }
}

/// In-memory store for `--ephemeral` runs and tests.
///
/// Keeps the serialized JSON rather than the struct so loads go through the
/// same decoding path as the file store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<String>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a raw record, which need not be valid JSON
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(raw.into())),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn with_state(state: &TimerState) -> Result<Self, StoreError> {
        Ok(Self::with_raw(serde_json::to_string(state)?))
    }

    /// Make every subsequent `save` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self) -> Option<String> {
        self.record.lock().ok().and_then(|record| record.clone())
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<TimerState>, StoreError> {
        let record = self
            .record
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Failed to lock record: {}", e)))?;
        match record.as_deref() {
            Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
            None => Ok(None),
        }
    }

    fn save(&self, state: &TimerState) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }
        let content = serde_json::to_string(state)?;
        let mut record = self
            .record
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("Failed to lock record: {}", e)))?;
        *record = Some(content);
        Ok(())
    }
}
