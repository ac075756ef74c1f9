//! For each archive in a completed group: extract via the archive
//! collaborator, record outputs, delete the archive (and sibling rar
//! parts), clean up non-media files, and drop directories left empty.

pub mod classify;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::archive::ArchiveExtractor;
use crate::store::{Download, DownloadGroup, GroupStatus, Store};
use classify::{classify_extension, select_qualifying_archives, Classification};

/// Runs the extraction + cleanup pipeline for groups whose barrier has
/// flipped them to `processing`.
pub struct PostProcessor {
    store: Store,
    extractor: Arc<dyn ArchiveExtractor>,
    base_downloads_path: PathBuf,
}

impl PostProcessor {
    #[must_use]
    pub fn new(store: Store, extractor: Arc<dyn ArchiveExtractor>, base_downloads_path: PathBuf) -> Self {
        Self { store, extractor, base_downloads_path }
    }

    /// Entry point invoked by the group barrier, asynchronously, once a
    /// group transitions to `processing`.
    #[instrument(skip(self), fields(group_id = %group_id))]
    pub async fn process(&self, group_id: &str) {
        if let Err(e) = self.process_inner(group_id).await {
            error!(group_id, error = %e, "post-processing failed to run");
        }
    }

    async fn process_inner(&self, group_id: &str) -> Result<(), crate::store::StoreError> {
        let group = self.store.get_group(group_id).await?;
        let members = self.store.list_downloads_by_group(group_id).await?;

        if members.iter().any(|m| !m.status().is_terminal()) {
            warn!(group_id, "post-processor invoked with non-terminal members, aborting defensively");
            return Ok(());
        }

        let qualifying: Vec<Download> =
            select_qualifying_archives(&members, self.extractor.as_ref()).into_iter().cloned().collect();

        if qualifying.is_empty() {
            self.finish_group(&group, true, None).await?;
            return Ok(());
        }

        let mut any_succeeded = false;
        let mut first_error: Option<String> = None;

        for archive in &qualifying {
            match self.process_one_archive(archive, &members).await {
                Ok(()) => any_succeeded = true,
                Err(e) => {
                    error!(id = archive.id, error = %e, "archive processing failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        self.finish_group(&group, any_succeeded, first_error).await?;
        Ok(())
    }

    async fn process_one_archive(&self, archive: &Download, members: &[Download]) -> Result<(), String> {
        let archive_path = archive.final_path();
        let dest_dir = Path::new(&archive.directory);

        let produced = self
            .extractor
            .extract(&archive_path, dest_dir)
            .await
            .map_err(|e| format!("extraction failed: {e}"))?;

        let mut recorded_paths = Vec::with_capacity(produced.len());
        for path in &produced {
            self.store
                .insert_extracted_file(archive.id, &path.to_string_lossy())
                .await
                .map_err(|e| format!("failed to record extracted file: {e}"))?;
            recorded_paths.push(path.to_string_lossy().to_string());
        }

        if let Ok(json) = serde_json::to_string(&recorded_paths) {
            let mut updated = archive.clone();
            updated.extracted_files_json = Some(json);
            let _ = self.store.update_download(&updated).await;
        }

        self.delete_archive_and_rar_siblings(archive, members).await;
        self.cleanup_extracted_files(archive.id, &produced).await;
        self.sweep_empty_directories(dest_dir).await;

        Ok(())
    }

    /// Deletes the extracted archive file itself, plus every sibling row in
    /// the same group whose filename ends in `.rar` - this removes the
    /// remaining rar volumes whether or not they were individually flagged
    /// `is_archive`. A missing file is not an error.
    async fn delete_archive_and_rar_siblings(&self, archive: &Download, members: &[Download]) {
        let _ = tokio::fs::remove_file(archive.final_path()).await;

        let Some(group_id) = &archive.group_id else { return };
        for sibling in members {
            if sibling.group_id.as_deref() != Some(group_id.as_str()) {
                continue;
            }
            if !sibling.filename.to_ascii_lowercase().ends_with(".rar") {
                continue;
            }
            let _ = tokio::fs::remove_file(sibling.final_path()).await;
        }
    }

    /// Soft-deletes and unlinks every produced file classified `Delete`.
    /// Any path escaping [`PostProcessor::base_downloads_path`] is skipped
    /// entirely - a safety guard against a hostile archive using symlinks
    /// or `..` traversal to point extraction outside the sandbox.
    async fn cleanup_extracted_files(&self, download_id: i64, produced: &[PathBuf]) {
        let Ok(extracted_rows) = self.store.list_extracted_files(download_id).await else { return };

        for path in produced {
            if !self.is_within_base(path) {
                warn!(path = %path.display(), "skipping cleanup of path outside base downloads directory");
                continue;
            }

            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if classify_extension(filename) != Classification::Delete {
                continue;
            }

            let _ = tokio::fs::remove_file(path).await;

            if let Some(row) = extracted_rows.iter().find(|r| r.file_path == path.to_string_lossy()) {
                let _ = self.store.mark_extracted_file_deleted(row.id).await;
            }
        }
    }

    fn is_within_base(&self, path: &Path) -> bool {
        let Ok(base) = self.base_downloads_path.canonicalize() else { return false };
        match path.canonicalize() {
            Ok(canonical) => canonical.starts_with(&base),
            // A file we just deleted may no longer canonicalize; fall back
            // to a lexical check against the un-resolved base directory.
            Err(_) => path.starts_with(&self.base_downloads_path),
        }
    }

    /// Removes directories beneath `dir` (not the base itself) left empty
    /// after cleanup, deepest first.
    async fn sweep_empty_directories(&self, dir: &Path) {
        let mut subdirs = Vec::new();
        collect_subdirs(dir, &mut subdirs);
        subdirs.sort_by_key(|p| std::cmp::Reverse(p.components().count()));

        for subdir in subdirs {
            if let Ok(mut entries) = tokio::fs::read_dir(&subdir).await {
                if entries.next_entry().await.ok().flatten().is_none() {
                    let _ = tokio::fs::remove_dir(&subdir).await;
                }
            }
        }
    }

    async fn finish_group(
        &self,
        group: &DownloadGroup,
        any_succeeded: bool,
        first_error: Option<String>,
    ) -> Result<(), crate::store::StoreError> {
        let mut updated = group.clone();
        if any_succeeded {
            updated.status_str = GroupStatus::Completed.as_str().to_string();
            updated.processing_error = None;
            info!(group_id = %group.id, "group post-processing completed");
        } else {
            updated.status_str = GroupStatus::Failed.as_str().to_string();
            updated.processing_error = first_error;
        }
        self.store.update_group(&updated).await
    }
}

fn collect_subdirs(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            collect_subdirs(&path, out);
            out.push(path);
        }
    }
}
