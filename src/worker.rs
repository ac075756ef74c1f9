//! Single-consumer queue draining download ids, owning the "current
//! download" slot and the pause/cancel signals for whichever one is active.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use reqwest::Client;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, instrument, warn};

use crate::group_barrier::GroupBarrier;
use crate::retry::{run_with_retries, RetryOutcome, DEFAULT_MAX_RETRIES};
use crate::store::{Download, DownloadStatus, Store, StoreError};
use crate::transfer::TransferContext;

/// Bounded FIFO capacity. A full queue drops the newest enqueue (logged)
/// rather than blocking the submitter.
pub const QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("no active download to pause")]
    NoActiveDownload,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Snapshot of the id + cancellation plumbing for whichever download is
/// presently being transferred. `None` when the worker is idle between
/// dequeues.
struct CurrentSlot {
    id: i64,
    cancel: Arc<AtomicBool>,
}

/// Owns at most one active download and the signals that steer it.
///
/// The queue is a bounded `mpsc` channel rather than a raw `VecDeque` so
/// `enqueue` is lock-free and non-blocking from the caller's perspective -
/// a full channel fails `try_send` immediately instead of awaiting capacity.
#[derive(Clone)]
pub struct Worker {
    store: Store,
    client: Client,
    group_barrier: GroupBarrier,
    sender: mpsc::Sender<i64>,
    receiver: Arc<Mutex<mpsc::Receiver<i64>>>,
    current: Arc<Mutex<Option<CurrentSlot>>>,
    /// Mirrors `current`'s id for lock-free reads from `cancel_current_if_matches`
    /// callers that only need to compare, not snapshot the full row.
    current_id: Arc<AtomicI64>,
    paused: Arc<AtomicBool>,
    max_retries: u32,
}

/// Sentinel stored in `current_id` when no download is active.
const NO_CURRENT: i64 = -1;

impl Worker {
    #[must_use]
    pub fn new(store: Store, client: Client, group_barrier: GroupBarrier) -> Self {
        Self::with_max_retries(store, client, group_barrier, DEFAULT_MAX_RETRIES)
    }

    #[must_use]
    pub fn with_max_retries(
        store: Store,
        client: Client,
        group_barrier: GroupBarrier,
        max_retries: u32,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            store,
            client,
            group_barrier,
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
            current: Arc::new(Mutex::new(None)),
            current_id: Arc::new(AtomicI64::new(NO_CURRENT)),
            paused: Arc::new(AtomicBool::new(false)),
            max_retries,
        }
    }

    /// Non-blocking; `id` is appended unless the queue is already full, in
    /// which case the enqueue is dropped and logged - the caller is expected
    /// to retry by re-submitting.
    #[instrument(skip(self))]
    pub fn enqueue(&self, id: i64) {
        if let Err(err) = self.sender.try_send(id) {
            error!(id, error = %err, "enqueue dropped: queue is full");
        }
    }

    /// Snapshot of the active row, or `None` if the worker is idle.
    #[instrument(skip(self))]
    pub async fn current(&self) -> Option<Download> {
        let id = self.current_id.load(Ordering::SeqCst);
        if id == NO_CURRENT {
            return None;
        }
        self.store.get_download(id).await.ok()
    }

    /// Fires the cancel signal on the active transfer, stamps the row
    /// `paused`/`paused_at`, and sets the worker's `paused` flag so the
    /// retry controller abandons rather than recording a failure.
    #[instrument(skip(self))]
    pub async fn pause_current(&self) -> Result<(), WorkerError> {
        let guard = self.current.lock().await;
        let Some(slot) = guard.as_ref() else { return Err(WorkerError::NoActiveDownload) };

        self.paused.store(true, Ordering::SeqCst);
        slot.cancel.store(true, Ordering::SeqCst);

        let mut row = self.store.get_download(slot.id).await?;
        row.status_str = DownloadStatus::Paused.as_str().to_string();
        row.paused_at = Some(Utc::now());
        self.store.update_download(&row).await?;

        Ok(())
    }

    /// Requeues a paused download: folds the pause duration into
    /// `total_paused_seconds`, resets to `pending`, and re-enqueues.
    #[instrument(skip(self))]
    pub async fn resume(&self, id: i64) -> Result<(), WorkerError> {
        let mut row = self.store.get_download(id).await?;
        if row.status() != DownloadStatus::Paused {
            warn!(id, status = %row.status(), "resume requested on a non-paused download");
            return Ok(());
        }

        if let Some(paused_at) = row.paused_at.take() {
            let elapsed = (Utc::now() - paused_at).num_milliseconds() as f64 / 1000.0;
            row.total_paused_seconds += elapsed.max(0.0);
        }
        row.status_str = DownloadStatus::Pending.as_str().to_string();
        self.store.update_download(&row).await?;

        self.enqueue(id);
        Ok(())
    }

    /// Fires the cancel signal on the active transfer only if `id` is still
    /// the one presently running. Returns whether it matched.
    #[instrument(skip(self))]
    pub async fn cancel_current_if_matches(&self, id: i64) -> bool {
        let guard = self.current.lock().await;
        match guard.as_ref() {
            Some(slot) if slot.id == id => {
                slot.cancel.store(true, Ordering::SeqCst);
                true
            }
            _ => false,
        }
    }

    /// Drains the queue until `shutdown` resolves. Strictly sequential: the
    /// next id is only pulled after the current download terminates in any
    /// sense (success, failure, pause, cancel, or delete-race).
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut receiver = self.receiver.lock().await;

        loop {
            let id = tokio::select! {
                biased;
                () = &mut shutdown => {
                    info!("worker shutting down");
                    return;
                }
                next = receiver.recv() => {
                    match next {
                        Some(id) => id,
                        None => {
                            info!("worker queue closed");
                            return;
                        }
                    }
                }
            };

            self.run_one(id).await;
        }
    }

    #[instrument(skip(self), fields(id))]
    async fn run_one(&self, id: i64) {
        let download = match self.store.get_download(id).await {
            Ok(download) => download,
            Err(StoreError::NotFound(_)) => {
                info!(id, "dequeued id no longer exists, dropping silently");
                return;
            }
            Err(e) => {
                error!(id, error = %e, "failed to load download for processing");
                return;
            }
        };

        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut guard = self.current.lock().await;
            *guard = Some(CurrentSlot { id, cancel: Arc::clone(&cancel) });
        }
        self.current_id.store(id, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);

        let transfer_ctx = TransferContext::new(Arc::clone(&cancel));
        let outcome = run_with_retries(
            &self.store,
            &self.client,
            download.clone(),
            &transfer_ctx,
            &self.paused,
            self.max_retries,
        )
        .await;

        {
            let mut guard = self.current.lock().await;
            *guard = None;
        }
        self.current_id.store(NO_CURRENT, Ordering::SeqCst);

        if outcome == RetryOutcome::Succeeded {
            if let Some(group_id) = &download.group_id {
                if let Err(e) = self.group_barrier.notify(group_id).await {
                    error!(id, group_id, error = %e, "group barrier notify failed");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::archive::DefaultArchiveExtractor;
    use crate::db::Database;
    use crate::postprocess::PostProcessor;
    use crate::store::downloads::NewDownload;
    use std::time::Duration;

    async fn worker_with_memory_store() -> (Store, Worker) {
        let db = Database::new_in_memory().await.unwrap();
        let store = Store::new(db);
        let post_processor = Arc::new(PostProcessor::new(
            store.clone(),
            Arc::new(DefaultArchiveExtractor),
            std::env::temp_dir(),
        ));
        let barrier = GroupBarrier::new(store.clone(), post_processor);
        let worker = Worker::new(store.clone(), Client::new(), barrier);
        (store, worker)
    }

    #[tokio::test]
    async fn test_enqueue_beyond_capacity_drops_newest() {
        let (store, worker) = worker_with_memory_store().await;
        let mut ids = Vec::new();
        for i in 0..QUEUE_CAPACITY {
            let id = store
                .create_download(&NewDownload {
                    original_url: format!("https://host/{i}"),
                    direct_url: format!("https://cdn/{i}"),
                    filename: format!("f{i}.bin"),
                    directory: std::env::temp_dir().to_string_lossy().to_string(),
                    file_size: 0,
                    group_id: None,
                    is_archive: false,
                })
                .await
                .unwrap();
            ids.push(id);
            worker.enqueue(id);
        }

        // the channel is now full (capacity ids already buffered and nothing
        // has drained them); the N+1-th enqueue must be dropped, not panic
        // or block.
        worker.enqueue(999_999);
        assert_eq!(ids.len(), QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn test_current_is_none_when_idle() {
        let (_store, worker) = worker_with_memory_store().await;
        assert!(worker.current().await.is_none());
    }

    #[tokio::test]
    async fn test_pause_current_without_active_download_errors() {
        let (_store, worker) = worker_with_memory_store().await;
        let result = worker.pause_current().await;
        assert!(matches!(result, Err(WorkerError::NoActiveDownload)));
    }

    #[tokio::test]
    async fn test_cancel_current_if_matches_false_when_idle() {
        let (_store, worker) = worker_with_memory_store().await;
        assert!(!worker.cancel_current_if_matches(1).await);
    }

    #[tokio::test]
    async fn test_resume_requires_paused_status() {
        let (store, worker) = worker_with_memory_store().await;
        let id = store
            .create_download(&NewDownload {
                original_url: "https://host/a".to_string(),
                direct_url: "https://cdn/a".to_string(),
                filename: "a.bin".to_string(),
                directory: std::env::temp_dir().to_string_lossy().to_string(),
                file_size: 0,
                group_id: None,
                is_archive: false,
            })
            .await
            .unwrap();

        // row is still `pending`, not `paused` - resume should leave it alone.
        worker.resume(id).await.unwrap();
        let row = store.get_download(id).await.unwrap();
        assert_eq!(row.status(), DownloadStatus::Pending);
    }

    #[tokio::test]
    async fn test_resume_folds_paused_duration_and_reenqueues() {
        let (store, worker) = worker_with_memory_store().await;
        let id = store
            .create_download(&NewDownload {
                original_url: "https://host/a".to_string(),
                direct_url: "https://cdn/a".to_string(),
                filename: "a.bin".to_string(),
                directory: std::env::temp_dir().to_string_lossy().to_string(),
                file_size: 0,
                group_id: None,
                is_archive: false,
            })
            .await
            .unwrap();
        let mut row = store.get_download(id).await.unwrap();
        row.status_str = "paused".to_string();
        row.paused_at = Some(Utc::now() - chrono::Duration::seconds(5));
        store.update_download(&row).await.unwrap();

        worker.resume(id).await.unwrap();

        let reloaded = store.get_download(id).await.unwrap();
        assert_eq!(reloaded.status(), DownloadStatus::Pending);
        assert!(reloaded.paused_at.is_none());
        assert!(reloaded.total_paused_seconds >= 4.0);
    }

    #[tokio::test]
    async fn test_run_one_drops_silently_when_row_missing() {
        let (store, worker) = worker_with_memory_store().await;
        let id = store
            .create_download(&NewDownload {
                original_url: "https://host/a".to_string(),
                direct_url: "https://cdn/a".to_string(),
                filename: "a.bin".to_string(),
                directory: std::env::temp_dir().to_string_lossy().to_string(),
                file_size: 0,
                group_id: None,
                is_archive: false,
            })
            .await
            .unwrap();
        store.delete_download(id).await.unwrap();

        // must return promptly without panicking
        tokio::time::timeout(Duration::from_secs(2), worker.run_one(id)).await.unwrap();
        assert!(worker.current().await.is_none());
    }
}
