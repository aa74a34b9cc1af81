//! Single-tree traversal engine
//!
//! One `Walker` owns one `CrawlState` and advances it one directory at a
//! time:
//!
//! ```text
//! list current ─► classify reads (first visit only) ─► mark visited
//!      ▲                                                    │
//!      │                                               checkpoint
//!      │                                                    │
//!      └── first unvisited subdir / last fork / nearest non-empty parent
//! ```
//!
//! The walk ends when the start directory has nothing left to descend into.
//! Every step is followed by a checkpoint write, so a crash repeats at most
//! one directory.

use crate::checkpoint::CheckpointStore;
use crate::classify::names::is_read_file;
use crate::classify::Classifier;
use crate::error::{CrawlerError, Result, StepOutcome};
use crate::listing::{is_directory_entry, join_url, parent_url, ListingClient};
use crate::walker::state::{CrawlState, ForkPolicy};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Why a `CancelToken` fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The shared flag was set (Ctrl-C, or the whole run is stopping)
    Signal,
    /// This token's own deadline passed
    Deadline,
}

/// Cooperative stop signal checked between directory steps
///
/// Clones share the flag. A deadline belongs to one token only, so a
/// subtree running out of time never stops its siblings.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
    timeout: Option<Duration>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token sharing an existing flag (e.g. one set by a signal handler)
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self {
            flag,
            deadline: None,
            timeout: None,
        }
    }

    /// Same flag, plus a deadline `timeout` from now
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(Instant::now() + timeout),
            timeout: Some(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// What stopped this token, if anything; the flag wins over the deadline
    pub fn reason(&self) -> Option<CancelReason> {
        if self.flag.load(Ordering::Relaxed) {
            Some(CancelReason::Signal)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(CancelReason::Deadline)
        } else {
            None
        }
    }

    /// Error a walk stopped by this token returns
    fn error(&self, reason: CancelReason) -> CrawlerError {
        match reason {
            CancelReason::Signal => CrawlerError::Interrupted,
            CancelReason::Deadline => CrawlerError::DeadlineExceeded {
                timeout: self.timeout.unwrap_or_default(),
            },
        }
    }

    /// Underlying flag, for signal handlers
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Counters for one walk
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Listings fetched
    pub dirs_listed: u64,

    /// Listings of directories already processed
    pub revisits: u64,

    /// Directories whose reads were handed to the classifier
    pub groups_classified: u64,

    /// Directories whose rows were dropped on a classification error
    pub groups_skipped: u64,

    /// Directories that could not be listed and were left as dead ends
    pub dirs_unlistable: u64,

    /// Rows added during this run
    pub anomalies: u64,

    pub duration: Duration,
}

/// Snapshot handed to the progress callback after every step
#[derive(Debug, Clone, Default)]
pub struct WalkProgress {
    pub dirs_listed: u64,
    pub visited: usize,
    pub anomalies: usize,
    pub skipped: u64,
    pub pending_forks: usize,
    pub current_url: String,
    pub elapsed: Duration,
}

impl WalkProgress {
    pub fn dirs_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.dirs_listed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Result of a walk that reached its end
#[derive(Debug, Clone)]
pub struct WalkResult {
    pub state: CrawlState,
    pub stats: WalkStats,
}

impl WalkResult {
    pub fn completed(&self) -> bool {
        self.state.completed
    }
}

type ProgressCallback = Box<dyn FnMut(&WalkProgress) + Send>;

/// Depth-first crawler over one directory tree
pub struct Walker<L, S> {
    run_id: String,
    client: L,
    store: S,
    classifier: Classifier,
    policy: ForkPolicy,
    strict: bool,
    cancel: CancelToken,
    on_progress: Option<ProgressCallback>,
}

impl<L: ListingClient, S: CheckpointStore> Walker<L, S> {
    /// Create a walker; `run_id` scopes its checkpoint
    pub fn new(run_id: impl Into<String>, client: L, store: S, classifier: Classifier) -> Self {
        Self {
            run_id: run_id.into(),
            client,
            store,
            classifier,
            policy: ForkPolicy::default(),
            strict: false,
            cancel: CancelToken::new(),
            on_progress: None,
        }
    }

    pub fn with_policy(mut self, policy: ForkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Abort on the first classification error instead of skipping the group
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&WalkProgress) + Send + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Discard any checkpoint saved for this run
    pub fn reset(&mut self) -> Result<()> {
        self.store.clear(&self.run_id)?;
        Ok(())
    }

    /// Hand the store back (e.g. to inspect the final checkpoint)
    pub fn into_store(self) -> S {
        self.store
    }

    /// Hand the listing client back so its session can be reused
    pub fn into_client(self) -> L {
        self.client
    }

    /// Crawl from `start_url`, resuming from the checkpoint when one exists
    ///
    /// Returns `CrawlerError::Interrupted` when the cancel flag is set and
    /// `CrawlerError::DeadlineExceeded` when the token's deadline passes; the
    /// last checkpoint stays valid in both cases.
    pub fn run(&mut self, start_url: &str) -> Result<WalkResult> {
        let start_url = dir_url(start_url);
        let started = Instant::now();
        let mut stats = WalkStats::default();

        let mut state = match self.store.resume(&self.run_id, &start_url)? {
            Some(state) => {
                info!(
                    run_id = %self.run_id,
                    visited = state.visited.len(),
                    anomalies = state.anomalies.len(),
                    current = %state.current_url,
                    "Resuming from checkpoint"
                );
                self.reconcile_policy(state)
            }
            None => CrawlState::new(&start_url, self.policy),
        };
        if state.completed {
            info!(run_id = %self.run_id, "Checkpoint is already complete, nothing left to crawl");
        }

        while !state.completed {
            if let Some(reason) = self.cancel.reason() {
                info!(current = %state.current_url, ?reason, "Walk cancelled");
                return Err(self.cancel.error(reason));
            }

            let outcome = self.step(&mut state, &mut stats)?;
            debug!(url = %outcome.url(), ?outcome, "Step done");

            if let Some(callback) = self.on_progress.as_mut() {
                callback(&WalkProgress {
                    dirs_listed: stats.dirs_listed,
                    visited: state.visited.len(),
                    anomalies: state.anomalies.len(),
                    skipped: stats.groups_skipped,
                    pending_forks: state.forks.len(),
                    current_url: state.current_url.clone(),
                    elapsed: started.elapsed(),
                });
            }
        }

        stats.duration = started.elapsed();
        info!(
            run_id = %self.run_id,
            dirs = stats.dirs_listed,
            anomalies = state.anomalies.len(),
            skipped = stats.groups_skipped,
            duration_secs = stats.duration.as_secs(),
            "Walk completed"
        );

        Ok(WalkResult { state, stats })
    }

    /// Switch a resumed state to the requested fork policy
    fn reconcile_policy(&self, mut state: CrawlState) -> CrawlState {
        let stored = state.forks.policy();
        if stored != self.policy {
            warn!(
                run_id = %self.run_id,
                ?stored,
                requested = ?self.policy,
                pending = state.forks.len(),
                "Checkpoint was taken with another fork policy, switching"
            );
            state.forks.set_policy(self.policy);
        }
        state
    }

    /// List, classify, mark, advance, checkpoint
    fn step(&mut self, state: &mut CrawlState, stats: &mut WalkStats) -> Result<StepOutcome> {
        let url = state.current_url.clone();
        let names = match self.client.list(&url) {
            Ok(names) => names,
            Err(e) if e.is_retryable() || self.strict || url == state.start_url => {
                return Err(e.into())
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Could not list directory, leaving it as a dead end");
                stats.dirs_unlistable += 1;
                state.empty.insert(url.clone());
                state.visited.insert(url.clone());
                advance(state, url.clone(), None);
                self.store.save(&self.run_id, state)?;
                return Ok(StepOutcome::Unlistable { url, error: e });
            }
        };
        stats.dirs_listed += 1;

        let mut reads = Vec::new();
        let mut subdirs = Vec::new();
        for name in names {
            if is_read_file(&name) {
                reads.push(name);
                continue;
            }
            if !is_directory_entry(&name) {
                debug!(url = %url, entry = %name, "Skipping plain file");
                continue;
            }
            let child = dir_url(&join_url(&url, &name));
            if !state.is_visited(&child) {
                subdirs.push(child);
            }
        }

        if subdirs.len() > 1 {
            state.forks.remember(&url);
        } else {
            state.empty.insert(url.clone());
        }

        let outcome = if state.is_visited(&url) {
            stats.revisits += 1;
            StepOutcome::Revisited { url: url.clone() }
        } else {
            self.classify(state, stats, &reads, &url)?
        };
        state.visited.insert(url.clone());

        advance(state, url, subdirs.into_iter().next());

        self.store.save(&self.run_id, state)?;
        Ok(outcome)
    }

    fn classify(
        &self,
        state: &mut CrawlState,
        stats: &mut WalkStats,
        reads: &[String],
        url: &str,
    ) -> Result<StepOutcome> {
        if reads.is_empty() {
            return Ok(StepOutcome::Classified {
                url: url.to_string(),
                anomalies: 0,
            });
        }

        stats.groups_classified += 1;
        match self.classifier.classify(reads, url) {
            Ok(rows) => {
                let count = rows.len();
                if count > 0 {
                    info!(url = %url, rows = count, category = %rows[0].difference_category, "Replicates found");
                }
                stats.anomalies += count as u64;
                state.anomalies.extend(rows);
                Ok(StepOutcome::Classified {
                    url: url.to_string(),
                    anomalies: count,
                })
            }
            Err(e) if self.strict => Err(e.into()),
            Err(e) => {
                warn!(url = %url, files = ?reads, error = %e, "Could not classify directory, rows dropped");
                stats.groups_skipped += 1;
                Ok(StepOutcome::Skipped {
                    url: url.to_string(),
                    error: e,
                })
            }
        }
    }
}

/// Move past `url`: into `next` if there is one, otherwise backtrack
///
/// The walk completes when the start directory or the whole tree above
/// `url` has nothing left.
fn advance(state: &mut CrawlState, url: String, next: Option<String>) {
    state.current_url = match next {
        Some(next) => next,
        None if url == state.start_url => {
            state.completed = true;
            url
        }
        None => match backtrack(state) {
            Some(next) => next,
            None => {
                state.completed = true;
                url
            }
        },
    };
}

/// Where to go once the current directory has nothing left to descend into
///
/// `None` means the walk is over.
fn backtrack(state: &mut CrawlState) -> Option<String> {
    if let Some(fork) = state.forks.take() {
        debug!(fork = %fork, "Jumping back to fork");
        return Some(fork);
    }

    let mut cursor = state.current_url.clone();
    loop {
        let parent = parent_url(&cursor)?;
        if parent == state.start_url {
            return (!state.is_empty_subtree(&parent)).then_some(parent);
        }
        if !state.is_empty_subtree(&parent) {
            debug!(parent = %parent, "Ascending");
            return Some(parent);
        }
        cursor = parent;
    }
}

/// Directory URL in its normalized form (trailing '/')
fn dir_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}
