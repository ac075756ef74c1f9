//! The archive decoder itself is out of scope for this engine - modeled as
//! a collaborator trait (`IsArchive`/`Extract`). The default implementation
//! here handles the two formats premium file-hosts actually serve: zip and
//! (possibly multi-part) rar.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("failed to open archive: {0}")]
    Open(String),
    #[error("failed to extract entry: {0}")]
    Extract(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// `IsArchive(filename) -> bool`; `Extract(archivePath, destDir) -> [absPath]`.
#[async_trait]
pub trait ArchiveExtractor: Send + Sync {
    fn is_archive(&self, filename: &str) -> bool;

    /// Extracts every file entry in `archive_path` into `dest_dir`, flattened
    /// (internal directory structure collapsed). Returns the absolute paths
    /// of every file produced.
    async fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError>;
}

/// Zip via the `zip` crate, rar (including multi-part) via `unrar`.
#[derive(Debug, Clone, Default)]
pub struct DefaultArchiveExtractor;

impl DefaultArchiveExtractor {
    fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        let file = std::fs::File::open(archive_path)?;
        let mut zip = zip::ZipArchive::new(file).map_err(|e| ArchiveError::Open(e.to_string()))?;

        let mut produced = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| ArchiveError::Extract(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }

            let Some(name) = Path::new(entry.name()).file_name() else { continue };
            let out_path = dest_dir.join(name);

            let mut out_file = std::fs::File::create(&out_path)?;
            io::copy(&mut entry, &mut out_file)?;
            produced.push(out_path);
        }

        Ok(produced)
    }

    fn extract_rar(archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        let before: std::collections::HashSet<PathBuf> = list_dir(dest_dir);

        let mut archive = unrar::Archive::new(archive_path)
            .open_for_processing()
            .map_err(|e| ArchiveError::Open(e.to_string()))?;

        while let Some(header) = archive.read_header().map_err(|e| ArchiveError::Extract(e.to_string()))? {
            archive = if header.entry().is_file() {
                header.extract_with_base(dest_dir).map_err(|e| ArchiveError::Extract(e.to_string()))?
            } else {
                header.skip().map_err(|e| ArchiveError::Extract(e.to_string()))?
            };
        }

        let after = list_dir(dest_dir);
        Ok(after.difference(&before).cloned().collect())
    }
}

fn list_dir(dir: &Path) -> std::collections::HashSet<PathBuf> {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok().map(|e| e.path())).collect())
        .unwrap_or_default()
}

/// Extensions recognized as multi-part-aware rar/zip containers.
const ARCHIVE_EXTENSIONS: &[&str] = &["zip", "rar"];

#[async_trait]
impl ArchiveExtractor for DefaultArchiveExtractor {
    fn is_archive(&self, filename: &str) -> bool {
        let lower = filename.to_ascii_lowercase();
        let Some(ext) = lower.rsplit('.').next() else { return false };

        // `foo.part2.rar` style multi-part names: the volume extension is
        // `rar`, which the simple extension check above already matches.
        ARCHIVE_EXTENSIONS.contains(&ext)
    }

    async fn extract(&self, archive_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>, ArchiveError> {
        let archive_path = archive_path.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();
        let is_zip = archive_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);

        tokio::task::spawn_blocking(move || {
            if is_zip {
                Self::extract_zip(&archive_path, &dest_dir)
            } else {
                Self::extract_rar(&archive_path, &dest_dir)
            }
        })
        .await
        .map_err(|e| ArchiveError::Extract(format!("extraction task panicked: {e}")))?
    }
}
