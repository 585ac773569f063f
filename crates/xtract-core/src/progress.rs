//! Progress reporting module

use crate::batch::{BatchReport, ExtractionJob, JobStatus};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

/// Receives batch and entry events
///
/// Called concurrently from worker threads. Every method defaults to a no-op.
pub trait ProgressSink: Send + Sync {
    /// A worker picked up `source`
    fn archive_started(&self, _source: &Path) {}

    /// An entry of `source` was materialized
    fn entry_written(&self, _source: &Path, _entry: &str, _bytes: u64) {}

    /// `job` reached its terminal status
    fn archive_finished(&self, _job: &ExtractionJob) {}

    /// Every job finished
    fn batch_finished(&self, _report: &BatchReport) {}
}

/// No-op progress sink
pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Turns events into log lines
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn archive_finished(&self, job: &ExtractionJob) {
        match &job.status {
            JobStatus::Succeeded(stats) => info!(
                source = ?job.source,
                destination = ?job.destination,
                entries = stats.entries,
                elapsed = ?job.elapsed,
                "extracted"
            ),
            JobStatus::Skipped { reason } => info!(source = ?job.source, reason = %reason, "skipped"),
            JobStatus::Failed { reason, .. } => {
                warn!(source = ?job.source, reason = %reason, elapsed = ?job.elapsed, "failed")
            }
        }
    }

    fn batch_finished(&self, report: &BatchReport) {
        info!(
            destination = ?report.destination,
            succeeded = report.succeeded(),
            failed = report.failed(),
            skipped = report.skipped(),
            elapsed = ?report.elapsed,
            "batch complete"
        );
    }
}

/// Terminal progress: one bar for the batch, one spinner per archive in flight
pub struct ProgressReporter {
    multi: MultiProgress,
    main_bar: ProgressBar,
    spinners: Mutex<HashMap<PathBuf, ProgressBar>>,
}

impl ProgressReporter {
    /// Create a reporter for `total` archives
    pub fn new(total: u64) -> Self {
        let multi = MultiProgress::new();
        let main_bar = multi.add(ProgressBar::new(total));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} archives")
        {
            main_bar.set_style(style.progress_chars("#>-"));
        }
        main_bar.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            main_bar,
            spinners: Mutex::new(HashMap::new()),
        }
    }

    fn display_name(source: &Path) -> String {
        source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string())
    }
}

impl ProgressSink for ProgressReporter {
    fn archive_started(&self, source: &Path) {
        let spinner = self.multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.yellow} {prefix}: {pos} entries {msg}") {
            spinner.set_style(style);
        }
        spinner.set_prefix(Self::display_name(source));
        spinner.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut spinners) = self.spinners.lock() {
            spinners.insert(source.to_path_buf(), spinner);
        }
    }

    fn entry_written(&self, source: &Path, entry: &str, _bytes: u64) {
        if let Ok(spinners) = self.spinners.lock() {
            if let Some(spinner) = spinners.get(source) {
                spinner.inc(1);
                spinner.set_message(entry.to_string());
            }
        }
    }

    fn archive_finished(&self, job: &ExtractionJob) {
        let spinner = self
            .spinners
            .lock()
            .ok()
            .and_then(|mut spinners| spinners.remove(&job.source));
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        let line = match &job.status {
            JobStatus::Succeeded(_) => format!(
                "{} extracted to {} in {:.2?}",
                job.source.display(),
                job.destination.display(),
                job.elapsed
            ),
            JobStatus::Skipped { reason } => format!("{} skipped: {}", job.source.display(), reason),
            JobStatus::Failed { reason, .. } => format!("{} failed: {}", job.source.display(), reason),
        };
        let _ = self.multi.println(line);
        self.main_bar.inc(1);
    }

    fn batch_finished(&self, _report: &BatchReport) {
        self.main_bar.finish_with_message("Complete");
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if !self.main_bar.is_finished() {
            self.main_bar.finish_and_clear();
        }
    }
}
