//! Durable records for downloads, groups, extracted files, and
//! directory-mapping hints, with atomic updates.
//!
//! The store is single-writer: a successful write is durable before the
//! call returns, which is what lets the retry controller trust a persisted
//! `retry_count`/`status` across a crash-restart.

pub mod directory_mappings;
pub mod downloads;
pub mod error;
pub mod extracted_files;
pub mod groups;
pub mod models;

use chrono::{Duration, Utc};

pub use downloads::{NewDownload, SortOrder};
pub use error::{StoreDbErrorKind, StoreError};
pub use models::{Download, DownloadGroup, DownloadStatus, DirectoryMapping, ExtractedFile, GroupStatus};

use crate::db::Database;

/// Thin persistent mapping over the four tables in `migrations/0001_init.sql`.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
}

impl Store {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Soft-deletes every terminal download older than `max_age`. A thin
    /// convenience wrapper over [`Store::delete_downloads_older_than`] for
    /// callers that think in durations rather than absolute instants.
    pub async fn prune_history(&self, max_age: Duration) -> Result<u64, StoreError> {
        let cutoff = Utc::now() - max_age;
        self.delete_downloads_older_than(cutoff).await
    }
}
