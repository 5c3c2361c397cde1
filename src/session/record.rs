//! Persisted session record.
//!
//! The record is read and written wholesale — no partial updates. The
//! bundled [`JsonRecordStore`] keeps it in a single JSON file; hosts with
//! their own save system implement [`RecordStore`] instead.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::PersistError;

/// The whole persisted state of the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Best score ever reached.
    pub best_score: u32,
    /// When the record was last written.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Asynchronous persistence collaborator.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Loads the record. A store with no record yet returns the default.
    async fn load(&self) -> Result<SessionRecord, PersistError>;

    /// Writes the record wholesale.
    async fn save(&self, record: &SessionRecord) -> Result<(), PersistError>;
}

/// [`RecordStore`] over a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    path: PathBuf,
}

impl JsonRecordStore {
    /// Creates a store backed by the given file. The file and its parent
    /// directory are created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[async_trait]
impl RecordStore for JsonRecordStore {
    async fn load(&self) -> Result<SessionRecord, PersistError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no session record yet; using defaults");
                Ok(SessionRecord::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(record)?;
        tokio::fs::write(&self.path, bytes).await?;
        debug!(path = %self.path.display(), best_score = record.best_score, "session record saved");
        Ok(())
    }
}
