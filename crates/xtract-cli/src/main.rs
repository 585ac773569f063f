//! xtract - Command-line interface for the xtract archive extractor
//!
//! Detects the format of every given file from its content, extracts the
//! archives concurrently into one destination and reports one line per file.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use xtract_core::{
    extract_all_with_options, BatchReport, Config, FormatDetector, JobStatus, LogProgress,
    ProgressReporter, ProgressSink,
};

/// Exit code when every archive was extracted or skipped
const EXIT_OK: i32 = 0;
/// Exit code when at least one archive failed
const EXIT_FAILED: i32 = 1;
/// Exit code when the destination could not be created
const EXIT_DESTINATION: i32 = 2;
/// Exit code for configuration and argument errors
const EXIT_USAGE: i32 = 3;

/// xtract - Concurrent archive extractor
///
/// Formats are recognized by signature, never by extension. Archives are
/// extracted in parallel; a broken archive never stops the others.
#[derive(Parser, Debug)]
#[command(name = "xtract")]
#[command(author, version, about = "Concurrent archive extractor", long_about = None)]
struct Cli {
    /// Files to extract (defaults to every regular file in the current directory)
    files: Vec<PathBuf>,

    /// Destination directory
    #[arg(short, long, default_value = ".")]
    dest: PathBuf,

    /// Number of archives extracted at the same time
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// Configuration file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// List entry names instead of extracting
    #[arg(long)]
    list: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Show progress spinners during extraction
    #[arg(long, conflicts_with = "json")]
    progress: bool,

    /// Enable verbose output for debugging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn setup_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_USAGE } else { EXIT_OK };
            let _ = e.print();
            process::exit(code);
        }
    };

    setup_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("Error: {:#}", e);
            process::exit(map_error_to_exit_code(&e));
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path).map_err(|e| {
            xtract_core::Error::Config(format!("{}: {}", path.display(), e))
        })?,
        None => Config::load_or_default(),
    };

    let mut options = config.batch_options();
    if let Some(concurrency) = cli.concurrency {
        options.concurrency = concurrency;
    }

    let files = if cli.files.is_empty() {
        current_dir_files()?
    } else {
        cli.files.clone()
    };

    if cli.list {
        return list_archives(&files, FormatDetector::new(options.extract.read_limit), cli.json);
    }

    let clock = Instant::now();
    let sink: Box<dyn ProgressSink> = if cli.progress {
        Box::new(ProgressReporter::new(files.len() as u64))
    } else {
        Box::new(LogProgress)
    };

    let report = extract_all_with_options(&files, &cli.dest, &options, sink.as_ref())?;
    drop(sink);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        print_summary(&report, clock);
    }

    Ok(if report.failed() > 0 { EXIT_FAILED } else { EXIT_OK })
}

// Regular files directly inside the working directory, sorted by name
fn current_dir_files() -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(".").context("reading current directory")? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(PathBuf::from(entry.file_name()));
        }
    }
    files.sort();
    info!(files = files.len(), "No files given, using the current directory");
    Ok(files)
}

fn list_archives(files: &[PathBuf], detector: FormatDetector, json: bool) -> Result<i32> {
    let mut listing = serde_json::Map::new();
    let mut code = EXIT_OK;

    for file in files {
        let format = match detector.detect(file) {
            Ok(format) => format,
            Err(e) => {
                info!(source = ?file, reason = %e, "skipped");
                continue;
            }
        };

        match format.extractor().list_entries(file) {
            Ok(names) if json => {
                listing.insert(file.display().to_string(), serde_json::json!(names));
            }
            Ok(names) => {
                println!("{} ({}):", file.display(), format);
                for name in names {
                    println!("  {}", name);
                }
            }
            Err(e) => {
                warn!(source = ?file, error = %e, "Listing failed");
                code = EXIT_FAILED;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    }
    Ok(code)
}

fn print_summary(report: &BatchReport, clock: Instant) {
    println!(
        "{} extracted, {} failed, {} skipped",
        report.succeeded(),
        report.failed(),
        report.skipped()
    );
    for job in report.failures() {
        if let JobStatus::Failed { reason, .. } = &job.status {
            println!("  failed: {}: {}", job.source.display(), reason);
        }
    }
    println!(
        "Total time: {:.2?}, destination: {}",
        clock.elapsed(),
        display_destination(&report.destination)
    );
}

fn display_destination(path: &Path) -> String {
    fs::canonicalize(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Map errors to exit codes:
/// - 2: Destination could not be created
/// - 3: Invalid configuration or arguments
/// - 1: Anything else
fn map_error_to_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(core_err) = err.downcast_ref::<xtract_core::Error>() {
        match core_err {
            xtract_core::Error::DestinationSetup { .. } => EXIT_DESTINATION,
            xtract_core::Error::Config(_) => EXIT_USAGE,
            _ => EXIT_FAILED,
        }
    } else {
        EXIT_FAILED
    }
}
