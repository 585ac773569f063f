//! Xtract - signature-based archive detection and safe concurrent extraction
//!
//! Formats are identified from their leading bytes, never from file names.
//! Every entry path is checked against the destination root before anything
//! is written, and a batch of archives is extracted on a bounded worker pool
//! where one broken archive cannot take down the rest.

pub mod archive;
pub mod batch;
pub mod config;
pub mod error;
pub mod progress;
pub mod security;
pub mod utils;

pub use error::{Error, ErrorKind, Result};

// Re-export commonly used types
pub use archive::{
    extract, extract_with_options, extract_with_progress, list, list_with_options, ArchiveFormat,
    CancelFlag, Entry, EntryKind, ExtractOptions, ExtractStats, Extractor, FormatDetector,
};
pub use batch::{
    extract_all, extract_all_with_options, BatchOptions, BatchReport, ExtractionJob, JobStatus,
};
pub use config::Config;
pub use progress::{LogProgress, NoProgress, ProgressReporter, ProgressSink};
pub use security::{validate_path, PathGuard, SecurityOptions};
