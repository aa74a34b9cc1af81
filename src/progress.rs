//! Progress reporting for the crawler
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::walker::{FleetProgress, WalkProgress};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Longest URL tail shown on the spinner line
const URL_TAIL: usize = 60;

/// Progress reporter that displays crawl status
///
/// Clones share the same spinner.
#[derive(Clone)]
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update from a sequential walk step
    pub fn update(&self, progress: &WalkProgress) {
        let msg = format!(
            "Dirs: {} | Rate: {:.1}/s | Anomalies: {} | Skipped: {} | Forks: {} | {}",
            format_number(progress.dirs_listed),
            progress.dirs_per_second(),
            format_number(progress.anomalies as u64),
            progress.skipped,
            progress.pending_forks,
            url_tail(&progress.current_url),
        );

        self.bar.set_message(msg);
    }

    /// Update from the fleet's shared counters
    pub fn update_fleet(&self, progress: &FleetProgress) {
        let msg = format!(
            "Subtrees: {}/{} | Failed: {} | Dirs: {} | Anomalies: {} | Workers: {}",
            progress.subtrees_done.load(Ordering::Relaxed),
            progress.subtrees_total.load(Ordering::Relaxed),
            progress.subtrees_failed.load(Ordering::Relaxed),
            format_number(progress.dirs_listed.load(Ordering::Relaxed)),
            format_number(progress.anomalies.load(Ordering::Relaxed)),
            progress.active_workers.load(Ordering::Relaxed),
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Last `URL_TAIL` characters of a URL, prefixed with "..." when cut
fn url_tail(url: &str) -> String {
    let count = url.chars().count();
    if count <= URL_TAIL {
        url.to_string()
    } else {
        let tail: String = url.chars().skip(count - URL_TAIL).collect();
        format!("...{}", tail)
    }
}

/// Totals printed at the end of a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub dirs_listed: u64,
    pub anomalies: usize,
    pub sequencing: usize,
    pub unknown: usize,
    pub method: usize,
    pub skipped: u64,
    pub unlistable: u64,
    pub failed_subtrees: usize,
    pub duration: Duration,
    pub report_path: String,
}

/// Print a summary of the crawl results
pub fn print_summary(summary: &RunSummary) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.dirs_listed as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Crawl Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(summary.dirs_listed)
    );
    println!(
        "  {} {} ({} {}, {} {}, {} {})",
        style("Anomalies:").bold(),
        format_number(summary.anomalies as u64),
        style(summary.sequencing).green(),
        "sequencing",
        style(summary.unknown).yellow(),
        "unknown",
        style(summary.method).red(),
        "method"
    );
    println!(
        "  {} {:.1}s ({:.1} dirs/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.skipped > 0 {
        println!(
            "  {} {}",
            style("Skipped groups:").yellow().bold(),
            format_number(summary.skipped)
        );
    }
    if summary.unlistable > 0 {
        println!(
            "  {} {}",
            style("Unlistable dirs:").yellow().bold(),
            format_number(summary.unlistable)
        );
    }
    if summary.failed_subtrees > 0 {
        println!(
            "  {} {}",
            style("Failed subtrees:").red().bold(),
            summary.failed_subtrees
        );
    }
    println!("  {} {}", style("Report:").bold(), summary.report_path);
    println!();
}

/// Print a header at the start of the crawl
pub fn print_header(marker: &str, url: &str, mode: &str, output: &str) {
    println!();
    println!(
        "{} {}",
        style("replication-walker").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Marker:").bold(), marker);
    println!("  {} {}", style("Source:").bold(), url);
    println!("  {} {}", style("Mode:").bold(), mode);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_url_tail() {
        assert_eq!(url_tail("https://h/a/"), "https://h/a/");
        let long = format!("https://h/{}/", "x".repeat(100));
        let tail = url_tail(&long);
        assert!(tail.starts_with("..."));
        assert_eq!(tail.chars().count(), URL_TAIL + 3);
        assert!(tail.ends_with("x/"));
    }
}
