//! Durable snapshot of last-known content per URL.
//!
//! The snapshot file is a JSON object mapping url -> record. Loading is
//! tolerant: a missing or malformed file yields an empty map so a corrupt
//! snapshot never prevents startup. Saving writes a temp file in the same
//! directory and renames it over the target so a concurrently-restarted
//! process never reads a partial write.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error writing snapshot {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Persisted per-URL state: the last successfully fetched content, its
/// fingerprint, and when it was fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub content: String,
    pub hash: String,
    pub last_checked: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, returning an empty map when the file is missing
    /// or unreadable.
    pub fn load(&self) -> HashMap<String, StateRecord> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read snapshot, starting empty");
                return HashMap::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(map) => map,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Malformed snapshot, starting empty");
                HashMap::new()
            }
        }
    }

    /// Persist the full map atomically.
    pub fn save(&self, records: &HashMap<String, StateRecord>) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records)?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json).map_err(|e| StoreError::Io {
            path: tmp.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| StoreError::Io {
            path: self.path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}
