//! One resumable HTTP GET, streamed to a `.tmp` sidecar with periodic
//! progress persistence.

pub mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

pub use error::TransferError;

use crate::speed::SpeedEstimator;
use crate::store::{Download, Store};

/// Wall-clock interval between progress persists.
const PROGRESS_TICK: Duration = Duration::from_millis(500);

/// Flat per-request deadline. Oversized to tolerate multi-GiB objects;
/// cancellation still preempts it. See [`TransferContext::idle_timeout`]
/// for the alternative that avoids spurious timeouts on very large, very
/// slow transfers - a documented behavior change, not the source's default.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(3600);

/// Per-attempt cancellation and timeout knobs handed in by the worker/retry
/// controller. A fresh `TransferContext` is not required per attempt - the
/// same `cancel` flag is shared across retries of one download so a single
/// pause/cancel request reaches whichever attempt is currently running.
#[derive(Clone)]
pub struct TransferContext {
    pub cancel: Arc<AtomicBool>,
    /// When set, no-bytes-received-for-this-long aborts the attempt instead
    /// of the flat [`REQUEST_TIMEOUT`]. Flagged in `SPEC_FULL.md` as an
    /// intentional deviation from the 1-hour flat deadline the design notes
    /// describe as a known open question.
    pub idle_timeout: Option<Duration>,
}

impl TransferContext {
    #[must_use]
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel, idle_timeout: None }
    }

    #[must_use]
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    fn is_canceled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

/// Performs at most one end-to-end HTTP GET for `download`, streaming the
/// body to its `.tmp` sidecar and persisting progress through `store`.
///
/// Mutates `download` in place; every mutation has already been flushed to
/// `store` by the time this returns, success or failure.
#[instrument(skip(store, client, download, ctx), fields(id = download.id))]
pub async fn transfer(
    store: &Store,
    client: &Client,
    download: &mut Download,
    ctx: &TransferContext,
) -> Result<(), TransferError> {
    download.status_str = "downloading".to_string();
    if download.started_at.is_none() {
        download.started_at = Some(Utc::now());
    }
    persist(store, download).await?;

    let temp_path = download.temp_path();
    let final_path = download.final_path();

    let resume_from = match tokio::fs::metadata(&temp_path).await {
        Ok(meta) if meta.len() > 0 => meta.len(),
        _ => 0,
    };

    let mut request = client.get(&download.direct_url).timeout(REQUEST_TIMEOUT);
    if resume_from > 0 {
        request = request.header("Range", format!("bytes={resume_from}-"));
    }

    let response = request
        .send()
        .await
        .map_err(|e| TransferError::Transient(format!("request failed: {e}")))?;

    let status = response.status();
    if status.as_u16() != 200 && status.as_u16() != 206 {
        return Err(TransferError::Transient(format!("unexpected status {status}")));
    }

    if download.file_size == 0 {
        if let Some(content_length) = response.content_length() {
            download.file_size = content_length as i64 + resume_from as i64;
            persist(store, download).await?;
        }
    }

    tokio::fs::create_dir_all(&download.directory)
        .await
        .map_err(|e| TransferError::Transient(format!("mkdir failed: {e}")))?;

    let mut file = OpenOptions::new()
        .append(resume_from > 0)
        .create(true)
        .write(true)
        .truncate(resume_from == 0)
        .open(&temp_path)
        .await
        .map_err(|e| TransferError::Transient(format!("open temp file failed: {e}")))?;

    let mut downloaded = resume_from;
    let mut stream = response.bytes_stream();
    let mut last_tick = Instant::now();
    let mut bytes_since_tick: u64 = 0;
    let mut speed_estimator = SpeedEstimator::new();

    loop {
        if ctx.is_canceled() {
            drop(file);
            return Err(TransferError::Canceled);
        }

        let next = if let Some(idle_timeout) = ctx.idle_timeout {
            match tokio::time::timeout(idle_timeout, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    drop(file);
                    return Err(TransferError::Transient("idle timeout exceeded".to_string()));
                }
            }
        } else {
            stream.next().await
        };

        let Some(chunk) = next else { break };
        let chunk = chunk.map_err(|e| TransferError::Transient(format!("read failed: {e}")))?;

        file.write_all(&chunk)
            .await
            .map_err(|e| TransferError::Transient(format!("write failed: {e}")))?;

        downloaded += chunk.len() as u64;
        bytes_since_tick += chunk.len() as u64;

        if last_tick.elapsed() >= PROGRESS_TICK {
            let tick_duration = last_tick.elapsed();
            if tick_duration >= Duration::from_millis(150) {
                speed_estimator.add_sample(bytes_since_tick, tick_duration);
            }

            download.downloaded_bytes = downloaded as i64;
            download.progress_percent = if download.file_size > 0 {
                100.0 * downloaded as f64 / download.file_size as f64
            } else {
                0.0
            };
            download.speed = speed_estimator.calculate_speed(0, Duration::ZERO);
            persist(store, download).await?;

            bytes_since_tick = 0;
            last_tick = Instant::now();
        }
    }

    file.flush().await.map_err(|e| TransferError::Transient(format!("flush failed: {e}")))?;
    drop(file);

    download.downloaded_bytes = downloaded as i64;
    download.progress_percent = 100.0;
    download.status_str = "completed".to_string();
    let now = Utc::now();
    download.completed_at = Some(now);

    if let Some(started_at) = download.started_at {
        let wall_seconds = (now - started_at).num_milliseconds() as f64 / 1000.0;
        let effective = wall_seconds - download.total_paused_seconds;
        if effective > 0.0 {
            download.speed = downloaded as f64 / effective;
        }
    }

    persist(store, download).await?;

    tokio::fs::rename(&temp_path, &final_path)
        .await
        .map_err(|e| TransferError::Transient(format!("rename failed: {e}")))?;

    Ok(())
}

async fn persist(store: &Store, download: &Download) -> Result<(), TransferError> {
    store
        .update_download(download)
        .await
        .map_err(|e| TransferError::Transient(format!("store write failed: {e}")))?;
    Ok(())
}
