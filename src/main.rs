//! replication-walker - Replicate sequencing run finder
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use replication_walker::checkpoint::SqliteCheckpointStore;
use replication_walker::config::{CliArgs, CrawlConfig};
use replication_walker::listing::HttpListingClient;
use replication_walker::progress::{print_header, print_summary, ProgressReporter, RunSummary};
use replication_walker::reference::load_sources;
use replication_walker::report::write_report;
use replication_walker::walker::{CancelToken, FleetConfig, FleetCoordinator, Walker};
use replication_walker::{ClassifiedAnomaly, Classifier, CrawlerError, ReplicationCategory};
use std::fs;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Exit code for transient failures worth retrying later (EX_TEMPFAIL)
const EXIT_RETRYABLE: u8 = 75;

/// Exit code after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    }
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<CrawlerError>() {
        Some(CrawlerError::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Some(e) if e.is_retryable() => ExitCode::from(EXIT_RETRYABLE),
        _ => ExitCode::FAILURE,
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = CrawlConfig::from_args(args).context("Invalid configuration")?;

    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("Failed to create output directory {}", config.output_dir.display())
    })?;

    let reference = load_sources(&config.sources)
        .map_err(CrawlerError::from)
        .context("Failed to load reference tables")?;
    let classifier = Classifier::new(Arc::new(reference));

    if config.show_progress {
        print_header(
            config.marker.name(),
            &config.base_url,
            &mode_name(&config),
            &config.report_path().display().to_string(),
        );
    }

    // Setup signal handler for graceful shutdown
    let cancel = CancelToken::new();
    let flag = cancel.flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, stopping after the current directory...");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let progress = config.show_progress.then(ProgressReporter::new);

    let outcome = if config.parallel {
        run_fleet(&config, classifier, cancel, progress.as_ref())
    } else {
        run_sequential(&config, classifier, cancel, progress.as_ref())
    };

    if let Some(ref p) = progress {
        match &outcome {
            Ok(_) => p.finish("Crawl completed"),
            Err(_) => p.finish("Crawl stopped"),
        }
    }

    let (mut summary, rows) = outcome?;
    write_report(&config.report_path(), &rows).context("Failed to write report")?;

    summary.report_path = config.report_path().display().to_string();
    if config.show_progress {
        print_summary(&summary);
    }

    if summary.skipped > 0 || summary.unlistable > 0 || summary.failed_subtrees > 0 {
        warn!(
            skipped = summary.skipped,
            unlistable = summary.unlistable,
            failed_subtrees = summary.failed_subtrees,
            "Crawl completed with errors"
        );
    }

    Ok(())
}

/// Sequential walk, checkpointed after every directory
fn run_sequential(
    config: &CrawlConfig,
    classifier: Classifier,
    cancel: CancelToken,
    progress: Option<&ProgressReporter>,
) -> Result<(RunSummary, Vec<ClassifiedAnomaly>)> {
    if let Some(parent) = config.checkpoint_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| {
            format!("Failed to create checkpoint directory {}", parent.display())
        })?;
    }

    let store = SqliteCheckpointStore::open(&config.checkpoint_path)
        .map_err(CrawlerError::from)
        .context("Failed to open checkpoint store")?;
    let client = HttpListingClient::new(config)
        .map_err(CrawlerError::from)
        .context("Failed to initialize HTTP client")?;

    let reporter = progress.cloned();
    let mut walker = Walker::new(config.marker.name(), client, store, classifier)
        .with_policy(config.fork_policy)
        .strict(config.strict)
        .with_cancel(cancel)
        .on_progress(move |p| {
            if let Some(ref r) = reporter {
                r.update(p);
            }
        });

    if config.fresh {
        info!(marker = %config.marker, "Discarding existing checkpoint");
        walker.reset().context("Failed to clear checkpoint")?;
    }

    if let Some(p) = progress {
        p.set_status("Connecting...");
    }

    let result = walker.run(&config.base_url).context("Walk failed")?;

    let anomalies = result.state.anomalies;
    let summary = RunSummary {
        dirs_listed: result.stats.dirs_listed,
        skipped: result.stats.groups_skipped,
        unlistable: result.stats.dirs_unlistable,
        duration: result.stats.duration,
        ..summarize(&anomalies)
    };
    Ok((summary, anomalies))
}

/// Partitioned walk on a worker pool, no checkpoints
fn run_fleet(
    config: &CrawlConfig,
    classifier: Classifier,
    cancel: CancelToken,
    progress: Option<&ProgressReporter>,
) -> Result<(RunSummary, Vec<ClassifiedAnomaly>)> {
    let fleet_config = FleetConfig {
        run_id: config.marker.name().to_string(),
        worker_count: config.worker_count,
        subtree_timeout: config.subtree_timeout,
        policy: config.fork_policy,
        strict: config.strict,
    };

    let client_config = config.clone();
    let coordinator = FleetCoordinator::new(
        fleet_config,
        move || HttpListingClient::new(&client_config),
        classifier,
    )
    .with_cancel(cancel);

    let result = coordinator
        .run(&config.base_url, |p| {
            if let Some(reporter) = progress {
                reporter.update_fleet(p);
            }
        })
        .context("Fleet crawl failed")?;

    for failed in result.failed_subtrees() {
        warn!(
            root = %failed.root,
            error = failed.error.as_deref().unwrap_or_default(),
            "Subtree produced no rows"
        );
    }

    if !result.completed {
        return Err(CrawlerError::Interrupted.into());
    }

    let summary = RunSummary {
        dirs_listed: result.dirs_listed,
        skipped: result.groups_skipped,
        unlistable: result.dirs_unlistable,
        failed_subtrees: result.failed_subtrees().count(),
        duration: result.duration,
        ..summarize(&result.anomalies)
    };
    Ok((summary, result.anomalies))
}

/// Per-category row counts
fn summarize(rows: &[ClassifiedAnomaly]) -> RunSummary {
    let count = |category: ReplicationCategory| {
        rows.iter()
            .filter(|r| r.difference_category == category)
            .count()
    };
    RunSummary {
        anomalies: rows.len(),
        sequencing: count(ReplicationCategory::SequencingReplicate),
        unknown: count(ReplicationCategory::UnknownReplication),
        method: count(ReplicationCategory::MethodReplication),
        ..Default::default()
    }
}

fn mode_name(config: &CrawlConfig) -> String {
    if config.parallel {
        format!("parallel ({} workers)", config.worker_count)
    } else {
        format!("sequential (checkpoint {})", config.checkpoint_path.display())
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("replication_walker=debug,warn")
    } else {
        EnvFilter::new("replication_walker=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
