//! CLI entry point for manually driving the download lifecycle engine.
//!
//! The HTTP/HTML front-end, the real unrestrict credentials client, and
//! directory-suggestion heuristics are out of scope for this crate (see
//! `SPEC_FULL.md` §1); this binary exists only to exercise the engine
//! end-to-end against a directory for local testing, using the collaborator
//! default implementations (`EchoUnrestrictor`, `DefaultArchiveExtractor`).

use std::io::{self, IsTerminal, Read};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use premium_dl_engine::archive::DefaultArchiveExtractor;
use premium_dl_engine::store::DownloadStatus;
use premium_dl_engine::unrestrict::EchoUnrestrictor;
use premium_dl_engine::{Config, Database, Engine, Store};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");
    info!("premium-dl engine starting");

    let config = Config::from_env()?;

    let urls = if !args.urls.is_empty() {
        args.urls.clone()
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string).collect()
    } else {
        info!("No input provided. Pipe URLs via stdin or pass as arguments.");
        return Ok(());
    };

    if urls.is_empty() {
        info!("No URLs to submit");
        return Ok(());
    }

    tokio::fs::create_dir_all(&config.base_downloads_path).await?;

    let db = Database::new(&config.store_path).await?;
    let store = Store::new(db);
    let client = reqwest::Client::new();

    let engine = Engine::with_max_retries(
        store,
        client,
        Arc::new(DefaultArchiveExtractor),
        Arc::new(EchoUnrestrictor),
        config.base_downloads_path.clone(),
        u32::from(args.max_retries),
    );

    let shutdown = Arc::new(Notify::new());
    let worker_shutdown = Arc::clone(&shutdown);
    let engine_for_worker = engine.clone();
    let worker_handle =
        tokio::spawn(async move { engine_for_worker.run(worker_shutdown.notified()).await });

    let directory = args
        .directory
        .unwrap_or_else(|| config.base_downloads_path.to_string_lossy().to_string());

    let tracked_ids = if urls.len() == 1 {
        let id = engine.submit(&urls[0], &directory, false).await?;
        vec![id]
    } else {
        let batch: Vec<(String, bool)> = urls.iter().map(|u| (u.clone(), false)).collect();
        let group_id = engine.submit_group(&batch, &directory).await?;
        let members = engine.store().list_downloads_by_group(&group_id).await?;
        members.iter().map(|m| m.id).collect()
    };

    info!(count = tracked_ids.len(), "submitted downloads, waiting for completion");

    let progress = ProgressBar::new(tracked_ids.len() as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} downloads terminal")
    {
        progress.set_style(style);
    }

    loop {
        let mut terminal = 0;
        for id in &tracked_ids {
            if let Ok(row) = engine.store().get_download(*id).await {
                if row.status().is_terminal() {
                    terminal += 1;
                }
            } else {
                terminal += 1; // deleted mid-run counts as settled
            }
        }
        progress.set_position(terminal as u64);

        if terminal == tracked_ids.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    progress.finish();

    let mut completed = 0;
    let mut failed = 0;
    for id in &tracked_ids {
        if let Ok(row) = engine.store().get_download(*id).await {
            match row.status() {
                DownloadStatus::Completed => completed += 1,
                DownloadStatus::Failed => {
                    failed += 1;
                    warn!(id, error = ?row.error_message, "download failed");
                }
                other => warn!(id, status = %other, "download left in unexpected non-terminal state"),
            }
        }
    }

    info!(completed, failed, total = tracked_ids.len(), "run complete");

    shutdown.notify_one();
    let _ = worker_handle.await;

    Ok(())
}
