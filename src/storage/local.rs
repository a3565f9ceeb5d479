//! Local filesystem storage implementation.
//!
//! Snapshots are pretty-printed JSON files named after the account's display
//! name, written atomically so an interrupted run never leaves half a file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::Report;
use crate::storage::{SnapshotStore, WriteMetadata};
use crate::utils::safe_file_name;

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Storage key of a user's snapshot.
    pub fn snapshot_key(user: &str) -> String {
        format!("old_grades_{}.json", safe_file_name(user))
    }

    /// Get the full path for a relative key.
    pub fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SnapshotStore for LocalStorage {
    async fn load(&self, user: &str) -> Result<Report> {
        let key = Self::snapshot_key(user);
        match self.read_json::<Report>(&key).await? {
            Some(report) => {
                log::debug!("Loaded {key}: {} subjects", report.subject_count());
                Ok(report)
            }
            None => {
                log::info!("No snapshot for {user} yet ({key})");
                Ok(Report::default())
            }
        }
    }

    async fn save(&self, user: &str, report: &Report) -> Result<WriteMetadata> {
        let key = Self::snapshot_key(user);
        self.write_json(&key, report).await?;
        log::debug!("Snapshot written to {}", self.path(&key).display());
        Ok(WriteMetadata {
            key,
            subject_count: report.subject_count(),
            timestamp: Utc::now(),
        })
    }

    async fn exists(&self, user: &str) -> Result<bool> {
        let path = self.path(&Self::snapshot_key(user));
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
