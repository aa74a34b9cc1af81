//! replication-walker - Replicate sequencing run finder
//!
//! Crawls an Apache-style directory listing of paired-end sequencing data,
//! finds directories holding more read files than one forward/reverse pair
//! per sample, and classifies each such group against readset reference
//! tables.
//!
//! # Features
//!
//! - **Resumable Crawl**: The depth-first walk checkpoints its whole state to
//!   SQLite after every directory, so an interrupted run picks up where it
//!   stopped.
//!
//! - **Fleet Mode**: The tree can be split into top-level subtrees crawled
//!   by a fixed pool of worker threads, each with its own HTTP session.
//!
//! - **Fault Isolation**: A directory that cannot be classified is logged and
//!   skipped; a failing subtree does not stop the others.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Remote listing server                         │
//! │                  (Apache index pages, basic auth)                │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ GET
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  listing::HttpListingClient  ──►  walker::Walker                 │
//! │   retry + backoff                  CrawlState, fork memory       │
//! │                                        │            │            │
//! │                                        ▼            ▼            │
//! │                          classify::Classifier   checkpoint::     │
//! │                                 │               SqliteStore      │
//! │                                 ▼                                │
//! │                       reference::ReferenceTable                  │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//!                    ┌──────────────────────┐
//!                    │ replication_df_*.csv │
//!                    └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Sequential, resumable crawl of the ITS2 tree
//! replication-walker its2 --readset-dir readset_csvs -o output
//!
//! # Twenty subtree workers, two hours per subtree at most
//! replication-walker 16s_45 --parallel -w 20 --subtree-timeout 7200
//! ```

pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod error;
pub mod listing;
pub mod progress;
pub mod reference;
pub mod report;
pub mod walker;

pub use classify::{ClassifiedAnomaly, Classifier, ColorCode, ReplicationCategory};
pub use config::{CliArgs, CrawlConfig, Marker};
pub use error::{CrawlerError, Result};
pub use walker::{FleetCoordinator, FleetResult, WalkResult, Walker};
