//! Failure kinds for a single [`super::transfer`] attempt.

use thiserror::Error;

/// The behavioral classes a transfer attempt can end in, besides success.
///
/// Deliberately flat: per the design notes, every non-cancel failure
/// (network, 5xx, a 4xx, a failed rename) is treated identically by the
/// retry controller rather than split into permanent/transient.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The worker's cancel/pause signal fired. Not a failure: the caller
    /// inspects the worker's pause flag to decide what to record.
    #[error("transfer canceled")]
    Canceled,

    /// Network error, non-2xx status, truncated read, failed rename, or a
    /// store write failure encountered during the attempt.
    #[error("transient transfer failure: {0}")]
    Transient(String),
}

impl TransferError {
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
