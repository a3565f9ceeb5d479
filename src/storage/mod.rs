//! Storage abstractions for grade snapshots.
//!
//! One snapshot per watched account: the last report seen for it, used as
//! the baseline of the next poll.
//!
//! ## Directory Structure
//!
//! ```text
//! {storage.dir}/
//! ├── old_grades_Anna.json
//! └── old_grades_Ben_M_.json      # "Ben M." with unsafe characters replaced
//! ```

pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::Report;

// Re-export for convenience
pub use local::LocalStorage;

/// Metadata about a snapshot write.
#[derive(Debug, Clone)]
pub struct WriteMetadata {
    /// Storage key the snapshot was written to
    pub key: String,
    /// Number of subjects in the snapshot
    pub subject_count: usize,
    /// Timestamp of the write
    pub timestamp: DateTime<Utc>,
}

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the stored report of `user`.
    ///
    /// A user without a snapshot gets the empty report.
    async fn load(&self, user: &str) -> Result<Report>;

    /// Replace the stored report of `user`.
    async fn save(&self, user: &str, report: &Report) -> Result<WriteMetadata>;

    /// Whether `user` has a stored snapshot.
    async fn exists(&self, user: &str) -> Result<bool>;
}
