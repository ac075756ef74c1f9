//! Bounded exponential-backoff wrapper around one [`crate::transfer::transfer`]
//! call, distinguishing cancel from failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::store::{Download, Store};
use crate::transfer::{transfer, TransferContext, TransferError};

/// `maxRetries=5` means 6 total attempts (0..5 inclusive).
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// How often a preemptible backoff sleep wakes up to check the cancel flag.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of a full retry run for one download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The transfer completed; the row is `completed`.
    Succeeded,
    /// All attempts were exhausted; the row is `failed`.
    Failed,
    /// Retrying was abandoned without recording a failure - the row was
    /// deleted mid-retry, or a pause request already stamped it `paused`.
    Abandoned,
}

/// Runs `download` through up to `max_retries + 1` attempts of
/// [`transfer`], sleeping `2^attempt` seconds between attempts (attempt >= 1).
///
/// `paused` is the worker's pause flag for the *current* download: if it is
/// set when an attempt returns canceled, this abandons silently rather than
/// recording a failure, since the pause path already stamped the row.
#[instrument(skip(store, client, download, transfer_ctx, paused), fields(id = download.id))]
pub async fn run_with_retries(
    store: &Store,
    client: &Client,
    mut download: Download,
    transfer_ctx: &TransferContext,
    paused: &AtomicBool,
    max_retries: u32,
) -> RetryOutcome {
    let id = download.id;

    for attempt in 0..=max_retries {
        if attempt >= 1 {
            let backoff = Duration::from_secs(1 << (attempt - 1));
            sleep_preemptible(backoff, &transfer_ctx.cancel).await;

            match store.get_download(id).await {
                Ok(fresh) => download = fresh,
                Err(_) => {
                    info!(id, "row vanished during backoff, abandoning retries");
                    return RetryOutcome::Abandoned;
                }
            }
        }

        let mut attempt_copy = download.clone();
        let result = transfer(store, client, &mut attempt_copy, transfer_ctx).await;
        download = attempt_copy;

        match result {
            Ok(()) => return RetryOutcome::Succeeded,
            Err(TransferError::Canceled) => {
                if paused.load(Ordering::SeqCst) {
                    return RetryOutcome::Abandoned;
                }
                // Canceled without a pause request: the worker only fires
                // cancel this way on an external delete, and the row is
                // already gone or about to be - nothing further to record.
                return RetryOutcome::Abandoned;
            }
            Err(TransferError::Transient(message)) => {
                download.retry_count = i64::from(attempt) + 1;
                download.error_message = Some(message);
                download.updated_at = Utc::now();

                if attempt < max_retries {
                    download.status_str = "pending".to_string();
                } else {
                    download.status_str = "failed".to_string();
                    download.completed_at = Some(Utc::now());
                }

                if let Err(e) = store.update_download(&download).await {
                    warn!(id, error = %e, "failed to persist retry decision");
                }

                if attempt == max_retries {
                    let _ = tokio::fs::remove_file(download.temp_path()).await;
                    return RetryOutcome::Failed;
                }
            }
        }
    }

    // Unreachable: the loop above always returns on its final iteration.
    RetryOutcome::Failed
}

/// Sleeps for `duration`, waking early (without completing the full sleep)
/// if `cancel` becomes true. A coarse poll rather than a condvar since the
/// worker's cancel signal is a plain flag shared across attempts.
async fn sleep_preemptible(duration: Duration, cancel: &AtomicBool) {
    let deadline = tokio::time::Instant::now() + duration;
    while tokio::time::Instant::now() < deadline {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        tokio::time::sleep(remaining.min(CANCEL_POLL_INTERVAL)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::store::downloads::NewDownload;
    use std::sync::Arc;

    async fn store_with_memory_db() -> Store {
        let db = Database::new_in_memory().await.unwrap();
        Store::new(db)
    }

    #[test]
    fn test_default_max_retries_yields_six_total_attempts() {
        assert_eq!(DEFAULT_MAX_RETRIES, 5);
        // 0..=5 inclusive is 6 attempts
        assert_eq!((0..=DEFAULT_MAX_RETRIES).count(), 6);
    }

    #[tokio::test]
    async fn test_sleep_preemptible_wakes_early_on_cancel() {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_clone = Arc::clone(&cancel);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel_clone.store(true, Ordering::SeqCst);
        });

        let started = tokio::time::Instant::now();
        sleep_preemptible(Duration::from_secs(30), &cancel).await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_abandons_when_row_vanishes_before_attempt() {
        let store = store_with_memory_db().await;
        let id = store
            .create_download(&NewDownload {
                original_url: "https://example.invalid/a".to_string(),
                direct_url: "https://example.invalid/a".to_string(),
                filename: "a.bin".to_string(),
                directory: std::env::temp_dir().to_string_lossy().to_string(),
                file_size: 0,
                group_id: None,
                is_archive: false,
            })
            .await
            .unwrap();
        let download = store.get_download(id).await.unwrap();
        store.delete_download(id).await.unwrap();

        let client = Client::new();
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = TransferContext::new(Arc::clone(&cancel));
        let paused = AtomicBool::new(false);

        // attempt 0 runs against a dead host and fails transiently, then the
        // pre-sleep recheck on attempt 1 discovers the row is gone.
        let outcome = run_with_retries(&store, &client, download, &ctx, &paused, 1).await;
        assert_eq!(outcome, RetryOutcome::Abandoned);
    }
}
