//! Configuration types for replication-walker
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - The fixed marker table (base URL per sequencing marker)
//! - Runtime configuration with validation

use crate::error::ConfigError;
use crate::walker::ForkPolicy;
use clap::Parser;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum reasonable worker count for the parallel mode
const MAX_WORKERS: usize = 256;

/// Maximum retry attempts per listing fetch
const MAX_RETRIES: u32 = 10;

/// Default worker count for the parallel mode
pub const DEFAULT_WORKERS: usize = 20;

/// Readset sources every marker is resolved against
pub const DEFAULT_SOURCES: &[&str] = &[
    "coral_readset_info.csv",
    "ssed_readset_info.csv",
    "fish_readset_info.csv",
    "plankton_readset_info.csv",
];

/// Crawl a sequencing listing tree and classify replicate read sets
#[derive(Parser, Debug, Clone)]
#[command(
    name = "replication-walker",
    version,
    about = "Find and classify replicate sequencing runs in a remote listing tree",
    long_about = "Walks an Apache-style directory listing depth-first, looking for directories \
                  that hold more fastq.gz files than one forward/reverse pair per sample.\n\n\
                  Each such group is classified as sequencing_replicate, unknown_replication \
                  or method_replication using the readset reference tables.\n\n\
                  The sequential walk checkpoints after every directory and resumes \
                  automatically; --parallel splits the tree into top-level subtrees.",
    after_help = "EXAMPLES:\n    \
        replication-walker its2 --readset-dir readset_csvs -o output\n    \
        replication-walker 16s_45 --parallel -w 20 --subtree-timeout 7200\n    \
        replication-walker 18s --fresh --checkpoint cache/walk.db"
)]
pub struct CliArgs {
    /// Marker to crawl (its2, 18s, 16s_45, 16s_full_45)
    #[arg(value_name = "MARKER")]
    pub marker: String,

    /// Override the marker's base URL (must end with '/')
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Directory holding the readset CSV sources
    #[arg(long, default_value = "readset_csvs", value_name = "DIR")]
    pub readset_dir: PathBuf,

    /// Explicit reference sources (replaces the default file set, can be repeated)
    #[arg(long = "source", value_name = "CSV", action = clap::ArgAction::Append)]
    pub sources: Vec<PathBuf>,

    /// Credentials file: first line user name, second line password
    #[arg(long, env = "REPLICATION_WALKER_AUTH", default_value = "auth.txt", value_name = "FILE")]
    pub auth: PathBuf,

    /// User-Agent header sent with every request
    #[arg(long, default_value = concat!("replication-walker/", env!("CARGO_PKG_VERSION")))]
    pub user_agent: String,

    /// Contact address sent in the From header
    #[arg(long, value_name = "EMAIL")]
    pub from: Option<String>,

    /// Output directory for the report
    #[arg(short, long, default_value = "output", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Checkpoint database for the sequential walk
    #[arg(long, default_value = "cache/checkpoint.db", value_name = "FILE")]
    pub checkpoint: PathBuf,

    /// Discard any existing checkpoint for this marker before walking
    #[arg(long)]
    pub fresh: bool,

    /// Partition the tree into top-level subtrees walked by a worker pool
    #[arg(long)]
    pub parallel: bool,

    /// Number of concurrent subtree workers (parallel mode)
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKERS, value_name = "NUM")]
    pub workers: usize,

    /// Per-subtree time limit in seconds (parallel mode)
    #[arg(long, value_name = "SECS")]
    pub subtree_timeout: Option<u64>,

    /// Retry attempts for transient HTTP errors
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub retries: u32,

    /// HTTP request timeout in seconds
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub timeout: u64,

    /// Abort on the first directory that cannot be classified or listed
    #[arg(long)]
    pub strict: bool,

    /// Remember only the most recent fork instead of a stack of forks
    #[arg(long)]
    pub legacy_fork_memory: bool,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Sequencing marker being crawled; selects the remote base directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    Its2,
    Ssu18sV9,
    Ssu16sV4V5,
    Ssu16sFullLength,
}

impl Marker {
    /// Parse a marker name as used on the command line
    pub fn parse(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "its2" => Ok(Marker::Its2),
            "18s" => Ok(Marker::Ssu18sV9),
            "16s" | "16s_45" => Ok(Marker::Ssu16sV4V5),
            "16s_full_45" => Ok(Marker::Ssu16sFullLength),
            _ => Err(ConfigError::UnknownMarker(name.to_string())),
        }
    }

    /// Canonical name; also scopes checkpoint keys and the report file name
    pub fn name(&self) -> &'static str {
        match self {
            Marker::Its2 => "its2",
            Marker::Ssu18sV9 => "18s",
            Marker::Ssu16sV4V5 => "16s_45",
            Marker::Ssu16sFullLength => "16s_full_45",
        }
    }

    /// Reference sources read from `--readset-dir` when no `--source` is given
    ///
    /// Every marker's libraries are registered in the same readset tables.
    pub fn sources(&self) -> &'static [&'static str] {
        match self {
            Marker::Its2 | Marker::Ssu18sV9 | Marker::Ssu16sV4V5 | Marker::Ssu16sFullLength => {
                DEFAULT_SOURCES
            }
        }
    }

    /// Remote directory the walk starts from
    pub fn base_url(&self) -> &'static str {
        match self {
            Marker::Its2 => {
                "https://www.genoscope.cns.fr/sadc/tarapacific/METABARCODING/ITS2/ITS2_SYM_VAR_5.8S2_SYM_VAR_REV/"
            }
            Marker::Ssu18sV9 => {
                "https://www.genoscope.cns.fr/sadc/tarapacific/METABARCODING/18S_V9/18S_V9_1389F_1510R/"
            }
            Marker::Ssu16sV4V5 => {
                "https://www.genoscope.cns.fr/sadc/tarapacific/METABARCODING/16S_V4V5/Fuhrman_primers/"
            }
            Marker::Ssu16sFullLength => {
                "https://www.genoscope.cns.fr/sadc/tarapacific/METABARCODING/16S_Full_Length_plus_16S_V4V5/16S_FL_27F_1492R_plus_Fuhrman_primers/"
            }
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// HTTP basic-auth credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Read credentials from a two-line file (user, then password)
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|e| ConfigError::InvalidCredentials {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::parse(&text).ok_or_else(|| ConfigError::InvalidCredentials {
            path: path.to_path_buf(),
            reason: "expected two non-empty lines: user and password".into(),
        })
    }

    fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines().map(str::trim_end);
        let user = lines.next().filter(|l| !l.is_empty())?;
        let password = lines.next().filter(|l| !l.is_empty())?;
        Some(Self {
            user: user.to_string(),
            password: password.to_string(),
        })
    }
}

// Never print the password
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Marker being crawled
    pub marker: Marker,

    /// Directory the walk starts from (always ends with '/')
    pub base_url: String,

    /// Reference table sources, in load order
    pub sources: Vec<PathBuf>,

    /// Basic-auth credentials
    pub credentials: Credentials,

    /// User-Agent header
    pub user_agent: String,

    /// Optional From header
    pub from: Option<String>,

    /// Report output directory
    pub output_dir: PathBuf,

    /// Checkpoint database path
    pub checkpoint_path: PathBuf,

    /// Drop an existing checkpoint before starting
    pub fresh: bool,

    /// Parallel (partitioned) mode
    pub parallel: bool,

    /// Worker count for parallel mode
    pub worker_count: usize,

    /// Per-subtree deadline for parallel mode
    pub subtree_timeout: Option<Duration>,

    /// Retry count for transient errors
    pub retry_count: u32,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Abort on classification errors
    pub strict: bool,

    /// Fork memory policy
    pub fork_policy: ForkPolicy,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl CrawlConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let marker = Marker::parse(&args.marker)?;

        let base_url = match &args.base_url {
            Some(url) => validate_base_url(url)?,
            None => marker.base_url().to_string(),
        };

        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        if args.retries > MAX_RETRIES {
            return Err(ConfigError::InvalidRetries {
                count: args.retries,
                max: MAX_RETRIES,
            });
        }

        if args.timeout == 0 || args.subtree_timeout == Some(0) {
            return Err(ConfigError::InvalidTimeout);
        }

        let credentials = Credentials::from_file(&args.auth)?;

        let sources = if args.sources.is_empty() {
            marker
                .sources()
                .iter()
                .map(|name| args.readset_dir.join(name))
                .collect()
        } else {
            args.sources.clone()
        };

        if args.output_dir.exists() && !args.output_dir.is_dir() {
            return Err(ConfigError::InvalidOutputPath {
                path: args.output_dir.clone(),
                reason: "exists and is not a directory".into(),
            });
        }

        let fork_policy = if args.legacy_fork_memory {
            ForkPolicy::SingleSlot
        } else {
            ForkPolicy::Stack
        };

        Ok(Self {
            marker,
            base_url,
            sources,
            credentials,
            user_agent: args.user_agent,
            from: args.from,
            output_dir: args.output_dir,
            checkpoint_path: args.checkpoint,
            fresh: args.fresh,
            parallel: args.parallel,
            worker_count: args.workers,
            subtree_timeout: args.subtree_timeout.map(Duration::from_secs),
            retry_count: args.retries,
            request_timeout: Duration::from_secs(args.timeout),
            strict: args.strict,
            fork_policy,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Report file for this marker
    pub fn report_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("replication_df_{}.csv", self.marker.name()))
    }
}

/// Check a base URL override: http(s) scheme, directory form
fn validate_base_url(url: &str) -> Result<String, ConfigError> {
    let url = url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ConfigError::InvalidBaseUrl {
            url: url.to_string(),
            reason: "scheme must be http or https".into(),
        });
    }
    if url.ends_with('/') {
        Ok(url.to_string())
    } else {
        Ok(format!("{}/", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args_with(marker: &str, auth: &Path) -> CliArgs {
        CliArgs::parse_from([
            "replication-walker",
            marker,
            "--auth",
            auth.to_str().unwrap(),
        ])
    }

    fn write_auth(dir: &Path) -> PathBuf {
        let path = dir.join("auth.txt");
        fs::write(&path, "reader\nsecret\n").unwrap();
        path
    }

    #[test]
    fn test_marker_parse() {
        assert_eq!(Marker::parse("its2").unwrap(), Marker::Its2);
        assert_eq!(Marker::parse("16S").unwrap(), Marker::Ssu16sV4V5);
        assert_eq!(Marker::parse("16s_45").unwrap(), Marker::Ssu16sV4V5);
        assert_eq!(Marker::parse("16s_full_45").unwrap(), Marker::Ssu16sFullLength);
        assert!(Marker::parse("28s").is_err());
    }

    #[test]
    fn test_marker_base_urls_are_directories() {
        for marker in [
            Marker::Its2,
            Marker::Ssu18sV9,
            Marker::Ssu16sV4V5,
            Marker::Ssu16sFullLength,
        ] {
            assert!(marker.base_url().ends_with('/'), "{}", marker);
        }
    }

    #[test]
    fn test_marker_sources() {
        for marker in [
            Marker::Its2,
            Marker::Ssu18sV9,
            Marker::Ssu16sV4V5,
            Marker::Ssu16sFullLength,
        ] {
            assert!(marker.sources().contains(&"fish_readset_info.csv"), "{}", marker);
        }
    }

    #[test]
    fn test_explicit_sources_replace_marker_set() {
        let dir = tempdir().unwrap();
        let auth = write_auth(dir.path());
        let mut args = args_with("18s", &auth);
        args.sources = vec![PathBuf::from("only.csv")];
        let config = CrawlConfig::from_args(args).unwrap();
        assert_eq!(config.sources, [PathBuf::from("only.csv")]);
    }

    #[test]
    fn test_credentials_parse() {
        let creds = Credentials::parse("user\npass\n").unwrap();
        assert_eq!(creds.user, "user");
        assert_eq!(creds.password, "pass");
        assert!(Credentials::parse("only-user\n").is_none());
        let shown = format!("{:?}", creds);
        assert!(shown.contains("***"));
        assert!(!shown.contains("\"pass\""));
    }

    #[test]
    fn test_from_args_defaults() {
        let dir = tempdir().unwrap();
        let auth = write_auth(dir.path());
        let config = CrawlConfig::from_args(args_with("its2", &auth)).unwrap();

        assert_eq!(config.marker, Marker::Its2);
        assert_eq!(config.base_url, Marker::Its2.base_url());
        assert_eq!(config.sources.len(), Marker::Its2.sources().len());
        assert!(config.sources[0].ends_with("coral_readset_info.csv"));
        assert_eq!(config.worker_count, DEFAULT_WORKERS);
        assert_eq!(config.fork_policy, ForkPolicy::Stack);
        assert!(config.report_path().ends_with("replication_df_its2.csv"));
    }

    #[test]
    fn test_base_url_override_gets_trailing_slash() {
        let dir = tempdir().unwrap();
        let auth = write_auth(dir.path());
        let mut args = args_with("18s", &auth);
        args.base_url = Some("http://mirror.local/data".into());
        let config = CrawlConfig::from_args(args).unwrap();
        assert_eq!(config.base_url, "http://mirror.local/data/");

        let mut args = args_with("18s", &auth);
        args.base_url = Some("ftp://mirror.local/data/".into());
        assert!(matches!(
            CrawlConfig::from_args(args),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn test_invalid_worker_count() {
        let dir = tempdir().unwrap();
        let auth = write_auth(dir.path());
        let mut args = args_with("its2", &auth);
        args.workers = 0;
        assert!(matches!(
            CrawlConfig::from_args(args),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));
    }

    #[test]
    fn test_missing_credentials() {
        let dir = tempdir().unwrap();
        let args = args_with("its2", &dir.path().join("nope.txt"));
        assert!(matches!(
            CrawlConfig::from_args(args),
            Err(ConfigError::InvalidCredentials { .. })
        ));
    }
}
