//! Download lifecycle engine for premium file-host links.
//!
//! This crate owns the queued, single-active-slot worker that drives each
//! download's state machine (`pending -> downloading -> completed/failed/paused`),
//! its byte-accurate resumable HTTP transfer with smoothed speed reporting,
//! the retry controller with exponential backoff, the group completion
//! barrier that triggers post-processing once every sibling in a batch
//! finishes, and the archive extraction + cleanup pipeline that runs after
//! the barrier.
//!
//! # Architecture
//!
//! - [`store`] - durable records for downloads, groups, extracted files
//! - [`speed`] - ring-buffer smoother turning byte deltas into bytes/sec
//! - [`transfer`] - one resumable HTTP GET streamed to a `.tmp` sidecar
//! - [`retry`] - bounded exponential-backoff wrapper around a transfer
//! - [`worker`] - single-consumer queue owning the active download slot
//! - [`group_barrier`] - idempotent gate into post-processing
//! - [`postprocess`] - archive extraction and selective cleanup
//! - [`unrestrict`] / [`archive`] - collaborator traits for out-of-scope systems
//! - [`engine`] - top-level composition wiring the above together
//!
//! The HTTP/HTML front-end, the unrestrict credentials client, configuration
//! bootstrap, and directory-suggestion heuristics are out of scope and
//! modeled as collaborator traits with runnable default implementations.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod config;
pub mod db;
pub mod engine;
pub mod group_barrier;
pub mod postprocess;
pub mod retry;
pub mod speed;
pub mod store;
pub mod transfer;
pub mod unrestrict;
pub mod worker;

pub use config::Config;
pub use db::Database;
pub use engine::{Engine, EngineError};
pub use store::Store;
