//! State storage: trait plus JSON file implementation.
//!
//! The file store writes each document to a sibling temporary file, syncs
//! it, and renames it over the previous document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::{migrate, PersistedState, SCHEMA_VERSION};

/// Errors that can occur during state storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Corrupt state in {path}: {reason}")]
    CorruptState { path: String, reason: String },

    #[error("Unsupported state schema version {found} (newest known: {newest})", newest = SCHEMA_VERSION)]
    UnsupportedVersion { found: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the stored document exists but cannot be used.
    pub fn is_unrecoverable_state(&self) -> bool {
        matches!(self, Self::CorruptState { .. } | Self::UnsupportedVersion { .. })
    }
}

/// Trait for monitor state persistence backends.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load the saved state, migrating older schemas. `Ok(None)` when nothing
    /// has been saved yet.
    async fn load(&self) -> Result<Option<PersistedState>, StoreError>;

    /// Replace the saved state.
    async fn save(&self, state: &PersistedState) -> Result<(), StoreError>;
}

/// File-system backed state store holding one JSON document.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn corrupt(&self, reason: impl ToString) -> StoreError {
        StoreError::CorruptState {
            path: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Decode a stored document of any known schema version.
    fn decode(&self, bytes: &[u8]) -> Result<PersistedState, StoreError> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| self.corrupt(e))?;
        if !value.is_object() {
            return Err(self.corrupt("document is not a JSON object"));
        }

        // Version 1 documents predate the version key.
        let version = match value.get("version") {
            None => 1,
            Some(v) => v
                .as_u64()
                .ok_or_else(|| self.corrupt("version is not an unsigned integer"))?,
        };

        let mut state = match version {
            1 => migrate::from_v1(value).map_err(|e| self.corrupt(e))?,
            2 => serde_json::from_value::<PersistedState>(value).map_err(|e| self.corrupt(e))?,
            found if found > u64::from(SCHEMA_VERSION) => {
                return Err(StoreError::UnsupportedVersion { found })
            }
            other => return Err(self.corrupt(format!("unknown schema version {other}"))),
        };

        if version != u64::from(SCHEMA_VERSION) {
            tracing::info!(
                path = %self.path.display(),
                from = version,
                to = SCHEMA_VERSION,
                "Migrated state schema"
            );
        }

        state.version = SCHEMA_VERSION;
        state.devices = migrate::rekey(state.devices);
        Ok(state)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self) -> Result<Option<PersistedState>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = self.decode(&bytes)?;
        tracing::debug!(
            path = %self.path.display(),
            devices = state.devices.len(),
            "State loaded"
        );
        Ok(Some(state))
    }

    async fn save(&self, state: &PersistedState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)?;
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            devices = state.devices.len(),
            "State saved"
        );
        Ok(())
    }
}
