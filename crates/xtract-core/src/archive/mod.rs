//! Archive operations module

pub mod bzip2_extractor;
pub mod detect;
pub mod entry;
pub mod extractor;
pub mod gzip_extractor;
pub mod rar_extractor;
pub mod signature;
pub mod tar_extractor;
pub mod toplevel;
pub mod writer;
pub mod zip_extractor;

pub use detect::FormatDetector;
pub use entry::{Entry, EntryKind};
pub use extractor::Extractor;
pub use writer::{DeferredTimestamps, EntryWriter, ExtractStats};

use crate::config::DEFAULT_READ_LIMIT;
use crate::progress::{NoProgress, ProgressSink};
use crate::security::SecurityOptions;
use crate::Result;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bzip2_extractor::Bzip2Extractor;
use gzip_extractor::GzipExtractor;
use rar_extractor::RarExtractor;
use tar_extractor::{TarExtractor, TarGzExtractor};
use zip_extractor::ZipExtractor;

/// Formats with an extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Tar,
    TarGz,
    Gzip,
    Rar,
    Zip,
    Bzip2,
}

static TAR: TarExtractor = TarExtractor::new();
static TAR_GZ: TarGzExtractor = TarGzExtractor::new();
static GZIP: GzipExtractor = GzipExtractor;
static RAR: RarExtractor = RarExtractor;
static ZIP: ZipExtractor = ZipExtractor;
static BZIP2: Bzip2Extractor = Bzip2Extractor;

impl ArchiveFormat {
    /// Detection priority; a file belongs to the first format that matches
    pub const DETECTION_ORDER: [ArchiveFormat; 6] = [
        ArchiveFormat::Tar,
        ArchiveFormat::TarGz,
        ArchiveFormat::Gzip,
        ArchiveFormat::Rar,
        ArchiveFormat::Zip,
        ArchiveFormat::Bzip2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ArchiveFormat::Tar => "tar",
            ArchiveFormat::TarGz => "tar.gz",
            ArchiveFormat::Gzip => "gzip",
            ArchiveFormat::Rar => "rar",
            ArchiveFormat::Zip => "zip",
            ArchiveFormat::Bzip2 => "bzip2",
        }
    }

    /// Stateless extractor shared by every worker
    pub fn extractor(self) -> &'static dyn Extractor {
        match self {
            ArchiveFormat::Tar => &TAR,
            ArchiveFormat::TarGz => &TAR_GZ,
            ArchiveFormat::Gzip => &GZIP,
            ArchiveFormat::Rar => &RAR,
            ArchiveFormat::Zip => &ZIP,
            ArchiveFormat::Bzip2 => &BZIP2,
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared flag checked between entries and before each archive
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Options for extracting an archive
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Apply recorded permission bits
    pub preserve_permissions: bool,
    /// Apply recorded access/modification times
    pub preserve_timestamps: bool,
    /// Put archives without a single top-level directory into `<dest>/<archive name>`
    pub nest_loose_archives: bool,
    /// Path guard settings
    pub security: SecurityOptions,
    /// Header bytes read when the format is detected
    pub read_limit: usize,
    /// Stop between entries when set
    pub cancel: Option<CancelFlag>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            preserve_permissions: true,
            preserve_timestamps: true,
            nest_loose_archives: true,
            security: SecurityOptions::default(),
            read_limit: DEFAULT_READ_LIMIT,
            cancel: None,
        }
    }
}

/// Detect the format of `archive` and extract it into `output_dir`
pub fn extract<P: AsRef<Path>, Q: AsRef<Path>>(archive: P, output_dir: Q) -> Result<ExtractStats> {
    extract_with_options(archive, output_dir, &ExtractOptions::default())
}

/// Extract with explicit options
pub fn extract_with_options<P: AsRef<Path>, Q: AsRef<Path>>(
    archive: P,
    output_dir: Q,
    options: &ExtractOptions,
) -> Result<ExtractStats> {
    extract_with_progress(archive.as_ref(), output_dir.as_ref(), options, &NoProgress)
}

/// Extract, reporting entries to `progress`
pub fn extract_with_progress(
    archive: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
    progress: &dyn ProgressSink,
) -> Result<ExtractStats> {
    let format = FormatDetector::new(options.read_limit).detect(archive)?;
    format
        .extractor()
        .extract(archive, output_dir, options, progress)
}

/// Entry names of `archive`, in archive order
pub fn list<P: AsRef<Path>>(archive: P) -> Result<Vec<String>> {
    list_with_options(archive, &ExtractOptions::default())
}

/// [`list`], detecting with `options.read_limit`
pub fn list_with_options<P: AsRef<Path>>(archive: P, options: &ExtractOptions) -> Result<Vec<String>> {
    let archive = archive.as_ref();
    let format = FormatDetector::new(options.read_limit).detect(archive)?;
    format.extractor().list_entries(archive)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_registry_matches_format() {
        for format in ArchiveFormat::DETECTION_ORDER {
            assert_eq!(format.extractor().format(), format);
        }
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_cancelled());
        flag.cancel();
        assert!(clone.is_cancelled());
    }
}
