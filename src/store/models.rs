//! Row types for the four tables the engine persists to.

use std::fmt;

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Lifecycle status of a [`Download`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
}

impl DownloadStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal statuses are the only ones a group barrier or history prune
    /// will consider settled.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "downloading" => Ok(Self::Downloading),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid download status: {s}")),
        }
    }
}

/// Lifecycle status of a [`DownloadGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    Downloading,
    Processing,
    Completed,
    Failed,
}

impl GroupStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GroupStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "downloading" => Ok(Self::Downloading),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid group status: {s}")),
        }
    }
}

/// The unit of work. Mutated exclusively by the Worker and Post-processor,
/// never concurrently for the same id.
#[derive(Debug, Clone, FromRow)]
pub struct Download {
    pub id: i64,
    pub original_url: String,
    pub direct_url: String,
    pub filename: String,
    pub directory: String,
    pub file_size: i64,
    pub downloaded_bytes: i64,
    pub progress_percent: f64,
    pub speed: f64,
    pub retry_count: i64,
    pub error_message: Option<String>,
    pub group_id: Option<String>,
    pub is_archive: bool,
    pub extracted_files_json: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub total_paused_seconds: f64,
    #[sqlx(rename = "status")]
    pub status_str: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Download {
    /// Parsed status. Falls back to `Pending` if the column somehow holds a
    /// value outside the `CHECK` constraint's domain.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.status_str.parse().unwrap_or(DownloadStatus::Pending)
    }

    /// The `.tmp` sidecar path used for every byte written during transfer.
    /// The `<id>` infix prevents cross-download collisions on shared filenames.
    #[must_use]
    pub fn temp_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.directory).join(format!("{}.{}.tmp", self.filename, self.id))
    }

    /// The final resting place of the file, populated by the atomic rename
    /// on successful completion.
    #[must_use]
    pub fn final_path(&self) -> std::path::PathBuf {
        std::path::Path::new(&self.directory).join(&self.filename)
    }
}

/// A batch of co-submitted URLs whose post-processing is gated on every
/// member finishing.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadGroup {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub total_downloads: i64,
    pub completed_downloads: i64,
    #[sqlx(rename = "status")]
    pub status_str: String,
    pub processing_error: Option<String>,
}

impl DownloadGroup {
    #[must_use]
    pub fn status(&self) -> GroupStatus {
        self.status_str.parse().unwrap_or(GroupStatus::Downloading)
    }
}

/// One file produced by extracting an archive. Soft-deleted (`deleted_at`)
/// once cleanup removes it from disk - the row survives as an audit trail.
#[derive(Debug, Clone, FromRow)]
pub struct ExtractedFile {
    pub id: i64,
    pub download_id: i64,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// A remembered `(filename pattern, source URL) -> directory` hint. Written
/// by the engine on every successful submit; read only by the (out-of-scope)
/// directory-suggestion collaborator.
#[derive(Debug, Clone, FromRow)]
pub struct DirectoryMapping {
    pub id: i64,
    pub filename_pattern: String,
    pub original_url: String,
    pub directory: String,
    pub use_count: i64,
    pub last_used: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
