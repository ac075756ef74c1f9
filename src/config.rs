//! Process-boot configuration.
//!
//! Loading configuration and wiring the process together is explicitly out
//! of scope for the engine itself, but every component still needs a handle
//! on the handful of values the engine's owner is expected to supply:
//! where the credential for the unrestrict collaborator lives, which port
//! the (also out-of-scope) UI binds to, where the store file and the
//! downloads tree live, and how verbose logging should be. `Config` is kept
//! intentionally thin — field-by-field parsing and validation, no config
//! file format, no layered sources.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Boot-time configuration consumed only at process startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the unrestrict collaborator. Never logged.
    pub api_key: String,
    /// Port the (out-of-scope) UI binds to.
    pub server_port: u16,
    /// Path to the `SQLite` store file.
    pub store_path: PathBuf,
    /// Root under which every download directory and cleanup path must reside.
    pub base_downloads_path: PathBuf,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"info"` or `"debug"`.
    pub log_level: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Recognized variables: `PDL_API_KEY`, `PDL_SERVER_PORT` (default 8080),
    /// `PDL_STORE_PATH` (default `./premium-dl.db`), `PDL_BASE_DOWNLOADS_PATH`
    /// (default `./downloads`), `PDL_LOG_LEVEL` (default `info`).
    ///
    /// # Errors
    ///
    /// Returns an error if `PDL_API_KEY` is unset or empty, or if
    /// `PDL_SERVER_PORT` is set but not a valid `u16`.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("PDL_API_KEY")
            .context("PDL_API_KEY must be set (credential for the unrestrict collaborator)")?;
        if api_key.trim().is_empty() {
            bail!("PDL_API_KEY must not be empty");
        }

        let server_port = match env::var("PDL_SERVER_PORT") {
            Ok(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("invalid PDL_SERVER_PORT value: {raw}"))?,
            Err(_) => 8080,
        };

        let store_path = env::var("PDL_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./premium-dl.db"));

        let base_downloads_path = env::var("PDL_BASE_DOWNLOADS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./downloads"));

        let log_level = env::var("PDL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_key,
            server_port,
            store_path,
            base_downloads_path,
            log_level,
        })
    }
}
