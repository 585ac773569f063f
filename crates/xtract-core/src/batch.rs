//! Concurrent batch extraction
//!
//! Sources are processed on a dedicated thread pool whose size is the
//! concurrency limit, so at most that many archives are open at once. Each
//! job ends in its own terminal status; one archive failing never affects the
//! others. Only the destination root being impossible to create stops a
//! batch.

use crate::archive::{ArchiveFormat, ExtractOptions, ExtractStats, FormatDetector};
use crate::config::DEFAULT_CONCURRENCY;
use crate::error::ErrorKind;
use crate::progress::ProgressSink;
use crate::{Error, Result};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

/// Options for a batch run
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Maximum archives in flight
    pub concurrency: usize,
    /// Applied to every archive, including its detection read limit
    pub extract: ExtractOptions,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            extract: ExtractOptions::default(),
        }
    }
}

/// Terminal status of one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded(ExtractStats),
    /// Not an archive this tool extracts, or cancelled before it started
    Skipped { reason: String },
    Failed { kind: ErrorKind, reason: String },
}

/// One source file and what became of it
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionJob {
    pub source: PathBuf,
    /// Effective destination once extraction succeeded, the batch root otherwise
    pub destination: PathBuf,
    pub format: Option<ArchiveFormat>,
    pub started_at: SystemTime,
    pub elapsed: Duration,
    pub status: JobStatus,
}

impl ExtractionJob {
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, JobStatus::Failed { .. })
    }
}

/// Outcome of a whole batch; jobs are in submission order
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub destination: PathBuf,
    pub jobs: Vec<ExtractionJob>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.jobs.iter().filter(|job| job.is_failure()).count()
    }

    pub fn skipped(&self) -> usize {
        self.jobs
            .iter()
            .filter(|job| matches!(job.status, JobStatus::Skipped { .. }))
            .count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExtractionJob> {
        self.jobs.iter().filter(|job| job.is_failure())
    }
}

/// Extract every source into `destination` with at most `concurrency` in flight
pub fn extract_all(
    sources: &[PathBuf],
    destination: &Path,
    concurrency: usize,
    sink: &dyn ProgressSink,
) -> Result<BatchReport> {
    let options = BatchOptions {
        concurrency,
        ..BatchOptions::default()
    };
    extract_all_with_options(sources, destination, &options, sink)
}

/// [`extract_all`] with full options
pub fn extract_all_with_options(
    sources: &[PathBuf],
    destination: &Path,
    options: &BatchOptions,
    sink: &dyn ProgressSink,
) -> Result<BatchReport> {
    if options.concurrency == 0 {
        return Err(Error::Config("concurrency must be at least 1".to_string()));
    }

    fs::create_dir_all(destination).map_err(|source| Error::DestinationSetup {
        path: destination.to_path_buf(),
        source,
    })?;

    let pool = ThreadPoolBuilder::new()
        .num_threads(options.concurrency)
        .thread_name(|index| format!("xtract-worker-{}", index))
        .build()
        .map_err(|e| Error::Config(format!("cannot start worker pool: {}", e)))?;

    let detector = FormatDetector::new(options.extract.read_limit);
    let clock = Instant::now();

    info!(
        archives = sources.len(),
        concurrency = options.concurrency,
        destination = ?destination,
        "Starting batch"
    );

    let jobs: Vec<ExtractionJob> = pool.install(|| {
        sources
            .par_iter()
            .map(|source| run_job(source, destination, &detector, options, sink))
            .collect()
    });

    let report = BatchReport {
        destination: destination.to_path_buf(),
        jobs,
        elapsed: clock.elapsed(),
    };

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped(),
        elapsed = ?report.elapsed,
        "Batch finished"
    );
    sink.batch_finished(&report);
    Ok(report)
}

fn run_job(
    source: &Path,
    destination: &Path,
    detector: &FormatDetector,
    options: &BatchOptions,
    sink: &dyn ProgressSink,
) -> ExtractionJob {
    let started_at = SystemTime::now();
    let clock = Instant::now();
    sink.archive_started(source);

    let mut job = ExtractionJob {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        format: None,
        started_at,
        elapsed: Duration::ZERO,
        status: JobStatus::Skipped {
            reason: String::new(),
        },
    };

    let cancelled = options
        .extract
        .cancel
        .as_ref()
        .is_some_and(|cancel| cancel.is_cancelled());

    job.status = if cancelled {
        JobStatus::Skipped {
            reason: Error::Cancelled.to_string(),
        }
    } else {
        match detector.detect(source) {
            Err(e) if e.is_skip() => {
                debug!(source = ?source, reason = %e, "Skipping file");
                JobStatus::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                warn!(source = ?source, error = %e, "Detection failed");
                JobStatus::Failed {
                    kind: e.kind(),
                    reason: e.to_string(),
                }
            }
            Ok(format) => {
                job.format = Some(format);
                match format
                    .extractor()
                    .extract(source, destination, &options.extract, sink)
                {
                    Ok(stats) => {
                        job.destination = stats.destination.clone();
                        JobStatus::Succeeded(stats)
                    }
                    Err(e) => {
                        warn!(source = ?source, format = %format, error = %e, "Extraction failed");
                        JobStatus::Failed {
                            kind: e.kind(),
                            reason: e.to_string(),
                        }
                    }
                }
            }
        }
    };

    job.elapsed = clock.elapsed();
    sink.archive_finished(&job);
    job
}
