//! Top-level composition wiring the Store, Worker, group barrier, and
//! post-processor together, plus the `submit` convenience the distilled
//! spec left implicit at the "external submitter" boundary.
//!
//! Everything this module depends on outside the lifecycle engine itself -
//! the unrestrict collaborator, the archive collaborator - is injected as a
//! trait object, so the engine is fully runnable standalone against the
//! default implementations while a real deployment swaps in its own.

use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Client;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::archive::ArchiveExtractor;
use crate::group_barrier::GroupBarrier;
use crate::postprocess::PostProcessor;
use crate::store::{Download, NewDownload, Store, StoreError};
use crate::unrestrict::{UnrestrictError, Unrestrictor};
use crate::worker::{Worker, WorkerError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("unrestrict failed: {0}")]
    Unrestrict(#[from] UnrestrictError),
}

/// Composes the full download lifecycle engine: Store (C1), Worker (C5) -
/// which itself drives Transfer (C3) through the retry controller (C4) -
/// and the Group barrier (C6) feeding the Post-processor (C7).
#[derive(Clone)]
pub struct Engine {
    store: Store,
    worker: Worker,
    unrestrictor: Arc<dyn Unrestrictor>,
    base_downloads_path: PathBuf,
}

impl Engine {
    /// Uses the retry controller's default max-attempts ceiling
    /// (`crate::retry::DEFAULT_MAX_RETRIES`).
    #[must_use]
    pub fn new(
        store: Store,
        client: Client,
        extractor: Arc<dyn ArchiveExtractor>,
        unrestrictor: Arc<dyn Unrestrictor>,
        base_downloads_path: PathBuf,
    ) -> Self {
        Self::with_max_retries(
            store,
            client,
            extractor,
            unrestrictor,
            base_downloads_path,
            crate::retry::DEFAULT_MAX_RETRIES,
        )
    }

    #[must_use]
    pub fn with_max_retries(
        store: Store,
        client: Client,
        extractor: Arc<dyn ArchiveExtractor>,
        unrestrictor: Arc<dyn Unrestrictor>,
        base_downloads_path: PathBuf,
        max_retries: u32,
    ) -> Self {
        let post_processor =
            Arc::new(PostProcessor::new(store.clone(), extractor, base_downloads_path.clone()));
        let group_barrier = GroupBarrier::new(store.clone(), post_processor);
        let worker = Worker::with_max_retries(store.clone(), client, group_barrier, max_retries);

        Self { store, worker, unrestrictor, base_downloads_path }
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    #[must_use]
    pub fn base_downloads_path(&self) -> &PathBuf {
        &self.base_downloads_path
    }

    /// Runs the worker loop until `shutdown` resolves. Intended to be
    /// spawned as the process's single long-lived worker task.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        self.worker.run(shutdown).await;
    }

    /// Resolves `url` through the unrestrict collaborator, writes a
    /// `pending` row (solo, no `group_id`), records a directory-suggestion
    /// hint, and enqueues it. Returns the assigned id.
    #[instrument(skip(self))]
    pub async fn submit(&self, url: &str, directory: &str, is_archive: bool) -> Result<i64, EngineError> {
        let resolved = self.unrestrictor.unrestrict(url).await?;

        let id = self
            .store
            .create_download(&NewDownload {
                original_url: url.to_string(),
                direct_url: resolved.direct_url,
                filename: resolved.filename.clone(),
                directory: directory.to_string(),
                file_size: resolved.file_size as i64,
                group_id: None,
                is_archive,
            })
            .await?;

        self.record_directory_hint(&resolved.filename, url, directory).await;
        self.worker.enqueue(id);
        Ok(id)
    }

    /// Resolves every URL in `urls`, registers them under one freshly
    /// minted group id, and enqueues each. Used for co-submitted batches
    /// whose post-processing is gated on every member finishing (§4.6).
    #[instrument(skip(self, urls))]
    pub async fn submit_group(
        &self,
        urls: &[(String, bool)],
        directory: &str,
    ) -> Result<String, EngineError> {
        let group_id = Uuid::new_v4().to_string();
        self.store.create_group(&group_id, urls.len() as i64).await?;

        for (url, is_archive) in urls {
            let resolved = self.unrestrictor.unrestrict(url).await?;

            let id = self
                .store
                .create_download(&NewDownload {
                    original_url: url.clone(),
                    direct_url: resolved.direct_url,
                    filename: resolved.filename.clone(),
                    directory: directory.to_string(),
                    file_size: resolved.file_size as i64,
                    group_id: Some(group_id.clone()),
                    is_archive: *is_archive,
                })
                .await?;

            self.record_directory_hint(&resolved.filename, url, directory).await;
            self.worker.enqueue(id);
        }

        info!(group_id, count = urls.len(), "submitted group");
        Ok(group_id)
    }

    async fn record_directory_hint(&self, filename: &str, url: &str, directory: &str) {
        let pattern = filename
            .rsplit('.')
            .next()
            .map(|ext| format!("*.{ext}"))
            .unwrap_or_else(|| filename.to_string());
        let _ = self.store.record_directory_mapping(&pattern, url, directory).await;
    }

    #[instrument(skip(self))]
    pub async fn current(&self) -> Option<Download> {
        self.worker.current().await
    }

    #[instrument(skip(self))]
    pub async fn pause_current(&self) -> Result<(), EngineError> {
        self.worker.pause_current().await.map_err(Into::into)
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, id: i64) -> Result<(), EngineError> {
        self.worker.resume(id).await.map_err(Into::into)
    }

    #[instrument(skip(self))]
    pub async fn cancel_current_if_matches(&self, id: i64) -> bool {
        self.worker.cancel_current_if_matches(id).await
    }
}
