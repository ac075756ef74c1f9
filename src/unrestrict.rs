//! The credentials/API client that turns a submitted URL into a direct
//! download URL. Out of scope for this engine - modeled as a collaborator
//! trait so the engine can be driven in tests and local runs without a
//! real premium-host account.

use async_trait::async_trait;
use thiserror::Error;

/// What the unrestrict collaborator returns for a resolved URL.
#[derive(Debug, Clone)]
pub struct UnrestrictResult {
    pub direct_url: String,
    pub filename: String,
    pub file_size: u64,
}

/// Failure kinds surfaced by the unrestrict collaborator. Distinct from the
/// engine's own error types since these never produce a download row.
#[derive(Error, Debug, Clone)]
pub enum UnrestrictError {
    #[error("authentication required or rejected: {0}")]
    Auth(String),
    #[error("invalid or unsupported link: {0}")]
    InvalidLink(String),
    #[error("transient unrestrict failure: {0}")]
    Transient(String),
}

/// `Unrestrict(url) -> {directURL, filename, size}` or failure.
///
/// `async_trait` is required here, not Rust's native async-fn-in-trait,
/// because the engine dispatches through `dyn Unrestrictor`.
#[async_trait]
pub trait Unrestrictor: Send + Sync {
    async fn unrestrict(&self, url: &str) -> Result<UnrestrictResult, UnrestrictError>;
}

/// Development/test collaborator that treats every input URL as already
/// direct. Named `EchoUnrestrictor` to be unmistakable about what it does -
/// this must never be wired up against a real account.
#[derive(Debug, Clone, Default)]
pub struct EchoUnrestrictor;

#[async_trait]
impl Unrestrictor for EchoUnrestrictor {
    async fn unrestrict(&self, url: &str) -> Result<UnrestrictResult, UnrestrictError> {
        let filename = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("download.bin")
            .to_string();

        Ok(UnrestrictResult { direct_url: url.to_string(), filename, file_size: 0 })
    }
}
