//! Error types for replication-walker
//!
//! This module defines the error hierarchy for:
//! - Fetching and parsing remote directory listings
//! - Resolving read file names against the reference table
//! - Loading the reference table sources
//! - Persisting crawl checkpoints
//! - Configuration and worker pool failures
//!
//! Library code returns these structured errors; the binary wraps them in
//! `anyhow` and maps them onto exit codes.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the crawler
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Listing fetch/parse errors
    #[error("Listing error: {0}")]
    Fetch(#[from] FetchError),

    /// Classification errors (only surfaced in strict mode)
    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    /// Reference table errors
    #[error("Reference table error: {0}")]
    Reference(#[from] ReferenceError),

    /// Checkpoint store errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker pool errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Report output errors
    #[error("Report error: {0}")]
    Report(#[from] csv::Error),

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Operation interrupted")]
    Interrupted,

    /// A walk ran past its own time limit
    #[error("Time limit of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: std::time::Duration },
}

impl CrawlerError {
    /// True if re-running the same command later is expected to make progress
    pub fn is_retryable(&self) -> bool {
        match self {
            CrawlerError::Fetch(e) => e.is_retryable(),
            CrawlerError::Interrupted => true,
            _ => false,
        }
    }
}

/// Errors reaching or parsing a directory listing
#[derive(Error, Debug, Clone)]
pub enum FetchError {
    /// Network failure or server-side error; retried with backoff
    #[error("Transient failure fetching '{url}' after {attempts} attempt(s): {reason}")]
    Transient {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Non-retryable HTTP status (4xx)
    #[error("HTTP {status} fetching '{url}'")]
    Status { url: String, status: u16 },

    /// Page does not have the expected anchor structure
    #[error("Malformed listing at '{url}': {reason}")]
    MalformedListing { url: String, reason: String },

    /// Failed to build the HTTP client
    #[error("Failed to initialize HTTP client: {0}")]
    ClientInit(String),
}

impl FetchError {
    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }

    /// URL the error relates to, if any
    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::Transient { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::MalformedListing { url, .. } => Some(url),
            FetchError::ClientInit(_) => None,
        }
    }
}

/// Errors raised while classifying one directory's read files
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// No reference row contains the derived key
    #[error("No readset matches '{key}' for sample '{sample_id}'")]
    LookupNotFound { key: String, sample_id: String },

    /// More than one reference row contains the derived key
    #[error("{matches} readsets match '{key}' for sample '{sample_id}'")]
    LookupAmbiguous {
        key: String,
        sample_id: String,
        matches: usize,
    },

    /// Group shape does not match what the category requires
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// File name does not have the expected segments
    #[error("Unexpected read file name '{name}': {reason}")]
    MalformedName { name: String, reason: String },
}

/// Reference table loading errors
#[derive(Error, Debug)]
pub enum ReferenceError {
    /// CSV parsing failed
    #[error("Failed to read '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Source file is missing
    #[error("Reference source '{0}' does not exist")]
    MissingSource(PathBuf),

    /// Row has a column count we do not know how to normalize
    #[error("'{path}' line {line}: expected 5 or 6 columns, found {found}")]
    UnexpectedLayout {
        path: PathBuf,
        line: u64,
        found: usize,
    },

    /// Same readset key appears twice across the sources
    #[error("Duplicate readset key '{key}' (in '{first}' and '{second}')")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },
}

/// Checkpoint store errors
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Stored value could not be (de)serialized
    #[error("Failed to (de)serialize '{key}': {source}")]
    Serde {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Checkpoint is incomplete (some keys missing)
    #[error("Checkpoint for run '{run_id}' is missing key '{key}'")]
    Incomplete { run_id: String, key: String },

    /// Checkpoint belongs to a different start URL
    #[error("Checkpoint for run '{run_id}' was taken from '{stored}', not '{requested}'")]
    StartMismatch {
        run_id: String,
        stored: String,
        requested: String,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Unknown marker name
    #[error("Unknown marker '{0}': expected one of its2, 18s, 16s_45, 16s_full_45")]
    UnknownMarker(String),

    /// Invalid worker count
    #[error("Invalid worker count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Invalid retry count
    #[error("Invalid retry count {count}: must be at most {max}")]
    InvalidRetries { count: u32, max: u32 },

    /// Invalid timeout
    #[error("Invalid timeout: must be greater than zero")]
    InvalidTimeout,

    /// Base URL is not an http(s) directory URL
    #[error("Invalid base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// Credentials file could not be read
    #[error("Invalid credentials file '{path}': {reason}")]
    InvalidCredentials { path: PathBuf, reason: String },

    /// Output path error
    #[error("Invalid output path '{path}': {reason}")]
    InvalidOutputPath { path: PathBuf, reason: String },
}

/// Worker pool errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker panicked
    #[error("Worker {id} panicked")]
    Panicked { id: usize },

    /// Worker thread could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Subtree queue closed before all work was handed out
    #[error("Subtree queue closed unexpectedly")]
    QueueClosed,
}

/// Result type alias for CrawlerError
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for FetchError
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for ClassifyError
pub type ClassifyResult<T> = std::result::Result<T, ClassifyError>;

/// Result type alias for CheckpointError
pub type CheckpointResult<T> = std::result::Result<T, CheckpointError>;

/// Represents the outcome of classifying a single directory
#[derive(Debug)]
pub enum StepOutcome {
    /// Directory processed; `anomalies` rows were appended
    Classified { url: String, anomalies: usize },

    /// Directory's group dropped because it could not be classified
    Skipped { url: String, error: ClassifyError },

    /// Directory had already been processed (revisit through a fork or ascent)
    Revisited { url: String },

    /// Directory listing failed for good; the walk moved on without it
    Unlistable { url: String, error: FetchError },
}

impl StepOutcome {
    /// Returns true if this step's group was dropped
    pub fn is_skipped(&self) -> bool {
        matches!(self, StepOutcome::Skipped { .. })
    }

    /// Returns the directory URL associated with this outcome
    pub fn url(&self) -> &str {
        match self {
            StepOutcome::Classified { url, .. } => url,
            StepOutcome::Skipped { url, .. } => url,
            StepOutcome::Revisited { url } => url,
            StepOutcome::Unlistable { url, .. } => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_retryable() {
        let transient = FetchError::Transient {
            url: "https://host/a/".into(),
            attempts: 3,
            reason: "connection reset".into(),
        };
        assert!(transient.is_retryable());

        let malformed = FetchError::MalformedListing {
            url: "https://host/a/".into(),
            reason: "no anchors".into(),
        };
        assert!(!malformed.is_retryable());
        assert_eq!(malformed.url(), Some("https://host/a/"));
    }

    #[test]
    fn test_error_conversion() {
        let fetch = FetchError::Status {
            url: "https://host/missing/".into(),
            status: 404,
        };
        let err: CrawlerError = fetch.into();
        assert!(matches!(err, CrawlerError::Fetch(_)));
        assert!(!err.is_retryable());
        assert!(CrawlerError::Interrupted.is_retryable());

        let late = CrawlerError::DeadlineExceeded {
            timeout: std::time::Duration::from_secs(7200),
        };
        assert!(!late.is_retryable());
        assert_eq!(late.to_string(), "Time limit of 7200s exceeded");
    }

    #[test]
    fn test_step_outcome_url() {
        let outcome = StepOutcome::Skipped {
            url: "https://host/d/".into(),
            error: ClassifyError::InvariantViolation("5 files".into()),
        };
        assert!(outcome.is_skipped());
        assert_eq!(outcome.url(), "https://host/d/");
    }
}
