//! CLI argument definitions for the local/manual operation harness.
//!
//! The HTTP front-end is out of scope for this engine; this binary exists
//! only so the engine can be driven directly against a directory for manual
//! testing, mirroring how the teacher's `downloader-cli` wraps its engine.

use clap::Parser;

use premium_dl_engine::retry::DEFAULT_MAX_RETRIES;

/// Resolve and download premium file-host links via the lifecycle engine.
#[derive(Parser, Debug)]
#[command(name = "premium-dl")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to submit as one co-completing group. Reads from stdin (one per
    /// line) when omitted.
    pub urls: Vec<String>,

    /// Directory the files are downloaded into. Must live under
    /// `PDL_BASE_DOWNLOADS_PATH`.
    #[arg(short = 'd', long)]
    pub directory: Option<String>,

    /// Maximum retry attempts for transient failures (0-10).
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: u8,

    /// Increase output verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output.
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["premium-dl"]).unwrap();
        assert!(args.urls.is_empty());
        assert_eq!(args.max_retries, 5);
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_accepts_positional_urls() {
        let args = Args::try_parse_from(["premium-dl", "https://host/a", "https://host/b"]).unwrap();
        assert_eq!(args.urls, vec!["https://host/a", "https://host/b"]);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["premium-dl", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_max_retries_over_max_rejected() {
        let result = Args::try_parse_from(["premium-dl", "-r", "11"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_directory_flag() {
        let args = Args::try_parse_from(["premium-dl", "-d", "/downloads/batch1"]).unwrap();
        assert_eq!(args.directory.as_deref(), Some("/downloads/batch1"));
    }
}
