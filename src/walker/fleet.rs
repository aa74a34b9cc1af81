//! Fleet mode: one crawler per top-level subtree
//!
//! The start directory is listed once and every child directory becomes an
//! independent subtree. A fixed pool of worker threads pulls subtree roots
//! from a channel and crawls each with a private `Walker` and listing client:
//!
//! ```text
//!                 start directory
//!                        │ list once
//!                        ▼
//!        ┌──── subtree queue (crossbeam) ────┐
//!        │              │                    │
//!   ┌────▼────┐    ┌────▼────┐          ┌────▼────┐
//!   │walker-0 │    │walker-1 │   ...    │walker-N │
//!   │ client  │    │ client  │          │ client  │
//!   └────┬────┘    └────┬────┘          └────┬────┘
//!        └──────────────┼────────────────────┘
//!                       ▼
//!              results (merged after join)
//! ```
//!
//! Workers share nothing mutable and never checkpoint. A subtree that fails
//! or runs past its deadline contributes no rows; the other subtrees carry on.
//! Only the shared cancel flag marks the whole fleet as incomplete.

use crate::checkpoint::NullCheckpointStore;
use crate::classify::names::is_read_file;
use crate::classify::{ClassifiedAnomaly, Classifier};
use crate::error::{CrawlerError, FetchResult, Result, WorkerError};
use crate::listing::{is_directory_entry, join_url, ListingClient};
use crate::walker::engine::{CancelToken, WalkStats, Walker};
use crate::walker::state::ForkPolicy;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Fleet settings
#[derive(Debug, Clone)]
pub struct FleetConfig {
    /// Prefix for per-subtree run ids (only used in logs)
    pub run_id: String,
    pub worker_count: usize,
    /// Deadline for a single subtree
    pub subtree_timeout: Option<Duration>,
    pub policy: ForkPolicy,
    pub strict: bool,
}

/// Outcome of one subtree
#[derive(Debug, Clone)]
pub struct SubtreeResult {
    /// Position of the subtree in the start directory listing
    pub index: usize,
    pub root: String,
    pub anomalies: Vec<ClassifiedAnomaly>,
    pub stats: WalkStats,
    /// Why the subtree contributed nothing, if it failed
    pub error: Option<String>,
    /// Stopped by the shared cancel flag (not by its own deadline)
    pub interrupted: bool,
}

impl SubtreeResult {
    fn failed(index: usize, root: String, err: &CrawlerError) -> Self {
        Self {
            index,
            root,
            anomalies: Vec::new(),
            stats: WalkStats::default(),
            error: Some(err.to_string()),
            interrupted: matches!(err, CrawlerError::Interrupted),
        }
    }
}

/// Merged fleet result
#[derive(Debug, Clone, Default)]
pub struct FleetResult {
    /// Rows from the start directory, then every subtree in listing order
    pub anomalies: Vec<ClassifiedAnomaly>,
    pub subtrees: Vec<SubtreeResult>,
    pub dirs_listed: u64,
    pub dirs_unlistable: u64,
    pub groups_skipped: u64,
    pub duration: Duration,
    /// False if the run was cancelled before every subtree finished
    pub completed: bool,
}

impl FleetResult {
    pub fn failed_subtrees(&self) -> impl Iterator<Item = &SubtreeResult> {
        self.subtrees.iter().filter(|s| s.error.is_some())
    }
}

/// Live counters shared by all workers
#[derive(Debug, Default)]
pub struct FleetProgress {
    pub subtrees_total: AtomicUsize,
    pub subtrees_done: AtomicUsize,
    pub subtrees_failed: AtomicUsize,
    pub dirs_listed: AtomicU64,
    pub anomalies: AtomicU64,
    pub active_workers: AtomicUsize,
}

struct SubtreeTask {
    index: usize,
    root: String,
}

/// Runs a pool of walkers over the subtrees of one start directory
pub struct FleetCoordinator<F> {
    config: FleetConfig,
    client_factory: Arc<F>,
    classifier: Classifier,
    cancel: CancelToken,
    progress: Arc<FleetProgress>,
}

impl<F, L> FleetCoordinator<F>
where
    F: Fn() -> FetchResult<L> + Send + Sync + 'static,
    L: ListingClient + 'static,
{
    /// `client_factory` builds one private listing client per worker
    pub fn new(config: FleetConfig, client_factory: F, classifier: Classifier) -> Self {
        Self {
            config,
            client_factory: Arc::new(client_factory),
            classifier,
            cancel: CancelToken::new(),
            progress: Arc::new(FleetProgress::default()),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Shared counters, for progress display
    pub fn progress(&self) -> Arc<FleetProgress> {
        Arc::clone(&self.progress)
    }

    /// Crawl every subtree of `start_url` and merge the results
    ///
    /// `on_tick` is called from the calling thread roughly every 100ms while
    /// workers run.
    pub fn run<P>(&self, start_url: &str, mut on_tick: P) -> Result<FleetResult>
    where
        P: FnMut(&FleetProgress),
    {
        let started = Instant::now();
        let (roots, mut anomalies) = self.partition(start_url)?;
        let total = roots.len();
        self.progress.subtrees_total.store(total, Ordering::Relaxed);
        info!(
            url = %start_url,
            subtrees = total,
            workers = self.config.worker_count,
            "Starting fleet crawl"
        );

        let (task_tx, task_rx) = bounded::<SubtreeTask>(total.max(1));
        let (result_tx, result_rx) = unbounded::<SubtreeResult>();

        for (index, root) in roots.iter().enumerate() {
            task_tx
                .send(SubtreeTask {
                    index,
                    root: root.clone(),
                })
                .map_err(|_| WorkerError::QueueClosed)?;
        }
        drop(task_tx);

        let handles = self.spawn_workers(task_rx, result_tx)?;

        let mut results: Vec<Option<SubtreeResult>> = vec![None; total];
        let mut received = 0;
        while received < total {
            match result_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(result) => {
                    let index = result.index;
                    results[index] = Some(result);
                    received += 1;
                }
                Err(RecvTimeoutError::Timeout) => on_tick(&self.progress),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        on_tick(&self.progress);

        for (id, handle) in handles.into_iter().enumerate() {
            if handle.join().is_err() {
                let err = WorkerError::Panicked { id };
                error!(worker = id, error = %err, "Worker died");
            }
        }

        let mut merged = FleetResult {
            dirs_listed: 1,
            completed: !self.cancel.is_cancelled(),
            ..Default::default()
        };

        for (index, slot) in results.into_iter().enumerate() {
            let subtree = slot.unwrap_or_else(|| SubtreeResult {
                index,
                root: roots[index].clone(),
                anomalies: Vec::new(),
                stats: WalkStats::default(),
                error: Some("worker exited before reporting this subtree".into()),
                interrupted: false,
            });
            if subtree.interrupted {
                merged.completed = false;
            }
            merged.dirs_listed += subtree.stats.dirs_listed;
            merged.dirs_unlistable += subtree.stats.dirs_unlistable;
            merged.groups_skipped += subtree.stats.groups_skipped;
            anomalies.extend(subtree.anomalies.iter().cloned());
            merged.subtrees.push(subtree);
        }

        merged.anomalies = anomalies;
        merged.duration = started.elapsed();

        info!(
            subtrees = total,
            failed = merged.failed_subtrees().count(),
            anomalies = merged.anomalies.len(),
            duration_secs = merged.duration.as_secs(),
            "Fleet crawl finished"
        );
        Ok(merged)
    }

    /// List the start directory: subtree roots, plus rows for its own reads
    fn partition(&self, start_url: &str) -> Result<(Vec<String>, Vec<ClassifiedAnomaly>)> {
        let mut client = (self.client_factory)()?;
        let names = client.list(start_url)?;
        self.progress.dirs_listed.fetch_add(1, Ordering::Relaxed);

        let (reads, dirs): (Vec<String>, Vec<String>) =
            names.into_iter().partition(|n| is_read_file(n));

        let mut roots: Vec<String> = Vec::with_capacity(dirs.len());
        for name in dirs {
            if !is_directory_entry(&name) {
                debug!(url = %start_url, entry = %name, "Skipping plain file");
                continue;
            }
            let mut url = join_url(start_url, &name);
            if !url.ends_with('/') {
                url.push('/');
            }
            if !roots.contains(&url) {
                roots.push(url);
            }
        }

        let anomalies = if reads.is_empty() {
            Vec::new()
        } else {
            match self.classifier.classify(&reads, start_url) {
                Ok(rows) => rows,
                Err(e) if self.config.strict => return Err(e.into()),
                Err(e) => {
                    warn!(url = %start_url, files = ?reads, error = %e, "Could not classify directory, rows dropped");
                    Vec::new()
                }
            }
        };

        Ok((roots, anomalies))
    }

    fn spawn_workers(
        &self,
        task_rx: Receiver<SubtreeTask>,
        result_tx: Sender<SubtreeResult>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let mut handles = Vec::with_capacity(self.config.worker_count);

        for id in 0..self.config.worker_count {
            let ctx = WorkerContext {
                id,
                config: self.config.clone(),
                client_factory: Arc::clone(&self.client_factory),
                classifier: self.classifier.clone(),
                cancel: self.cancel.clone(),
                progress: Arc::clone(&self.progress),
            };
            let task_rx = task_rx.clone();
            let result_tx = result_tx.clone();

            let handle = thread::Builder::new()
                .name(format!("walker-{}", id))
                .spawn(move || ctx.run(task_rx, result_tx))
                .map_err(|e| WorkerError::SpawnFailed {
                    id,
                    reason: e.to_string(),
                })?;
            handles.push(handle);
        }

        debug!(count = handles.len(), "Workers spawned");
        Ok(handles)
    }
}

/// Everything one worker thread owns
struct WorkerContext<F> {
    id: usize,
    config: FleetConfig,
    client_factory: Arc<F>,
    classifier: Classifier,
    cancel: CancelToken,
    progress: Arc<FleetProgress>,
}

impl<F, L> WorkerContext<F>
where
    F: Fn() -> FetchResult<L>,
    L: ListingClient,
{
    fn run(self, task_rx: Receiver<SubtreeTask>, result_tx: Sender<SubtreeResult>) {
        self.progress.active_workers.fetch_add(1, Ordering::Relaxed);
        let mut client: Option<L> = None;

        for task in task_rx.iter() {
            let result = if self.cancel.is_cancelled() {
                SubtreeResult::failed(task.index, task.root, &CrawlerError::Interrupted)
            } else {
                self.crawl_subtree(&mut client, task)
            };

            if result.error.is_some() {
                self.progress.subtrees_failed.fetch_add(1, Ordering::Relaxed);
            }
            self.progress.subtrees_done.fetch_add(1, Ordering::Relaxed);

            if result_tx.send(result).is_err() {
                break;
            }
        }

        self.progress.active_workers.fetch_sub(1, Ordering::Relaxed);
    }

    fn crawl_subtree(&self, client: &mut Option<L>, task: SubtreeTask) -> SubtreeResult {
        let SubtreeTask { index, root } = task;

        let listing = match client.take() {
            Some(existing) => existing,
            None => match (self.client_factory)() {
                Ok(fresh) => fresh,
                Err(e) => {
                    let err = CrawlerError::Fetch(e);
                    error!(worker = self.id, root = %root, error = %err, "Could not build listing client");
                    return SubtreeResult::failed(index, root, &err);
                }
            },
        };

        let cancel = match self.config.subtree_timeout {
            Some(timeout) => self.cancel.with_timeout(timeout),
            None => self.cancel.clone(),
        };

        let dirs = Arc::clone(&self.progress);
        let mut last_dirs = 0u64;
        let mut walker = Walker::new(
            format!("{}:{}", self.config.run_id, root),
            listing,
            NullCheckpointStore,
            self.classifier.clone(),
        )
        .with_policy(self.config.policy)
        .strict(self.config.strict)
        .with_cancel(cancel)
        .on_progress(move |p| {
            dirs.dirs_listed
                .fetch_add(p.dirs_listed - last_dirs, Ordering::Relaxed);
            last_dirs = p.dirs_listed;
        });

        debug!(worker = self.id, root = %root, "Crawling subtree");
        let outcome = walker.run(&root);
        let result = match outcome {
            Ok(walk) => {
                self.progress
                    .anomalies
                    .fetch_add(walk.state.anomalies.len() as u64, Ordering::Relaxed);
                SubtreeResult {
                    index,
                    root,
                    anomalies: walk.state.anomalies,
                    stats: walk.stats,
                    error: None,
                    interrupted: false,
                }
            }
            Err(e) => {
                warn!(worker = self.id, root = %root, error = %e, "Subtree failed, its rows are dropped");
                SubtreeResult::failed(index, root, &e)
            }
        };

        *client = Some(walker.into_client());
        result
    }
}
