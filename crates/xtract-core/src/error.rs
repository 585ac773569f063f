//! Error types for xtract-core

use serde::Serialize;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Core error types for the xtract library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A filesystem step of materializing an entry failed
    #[error("{}: error {action}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: io::Error,
    },

    /// No signature rule matched the file
    #[error("Unrecognized format: {}", .0.display())]
    UnrecognizedFormat(PathBuf),

    /// The file was recognized but no extractor exists for it
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Archive could not be opened or is corrupt
    #[error("Archive error: {0}")]
    Archive(String),

    /// ZIP-specific error
    #[error("Zip error: {0}")]
    Zip(String),

    /// RAR-specific error
    #[error("Rar error: {0}")]
    Rar(String),

    /// Entry name resolves outside the destination root
    #[error("illegal path: {entry} resolves to {}", resolved.display())]
    PathTraversal { resolved: PathBuf, entry: String },

    /// Tar entry with a type code that cannot be materialized
    #[error("{entry}: unknown entry type {type_code:#04x}")]
    UnknownEntryType { entry: String, type_code: u8 },

    /// Security violation detected
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Operation not supported
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Destination root could not be created
    #[error("cannot create destination {}: {source}", path.display())]
    DestinationSetup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Extraction was cancelled between entries
    #[error("extraction cancelled")]
    Cancelled,

    /// Configuration-related error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification of [`Error`], used in batch reports and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FormatUnrecognized,
    ArchiveOpen,
    PathTraversal,
    UnknownEntryType,
    Io,
    DestinationSetup,
    Unsupported,
    Cancelled,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Filesystem { .. } => ErrorKind::Io,
            Error::UnrecognizedFormat(_) => ErrorKind::FormatUnrecognized,
            Error::UnsupportedFormat(_) | Error::Unsupported(_) => ErrorKind::Unsupported,
            Error::Archive(_) | Error::Zip(_) | Error::Rar(_) => ErrorKind::ArchiveOpen,
            Error::PathTraversal { .. } | Error::SecurityError(_) => ErrorKind::PathTraversal,
            Error::UnknownEntryType { .. } => ErrorKind::UnknownEntryType,
            Error::DestinationSetup { .. } => ErrorKind::DestinationSetup,
            Error::Cancelled => ErrorKind::Cancelled,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    /// Errors that stop a whole batch instead of a single archive
    pub fn is_fatal_to_batch(&self) -> bool {
        matches!(self.kind(), ErrorKind::DestinationSetup | ErrorKind::Config)
    }

    /// Whether a batch treats this as "not an archive" rather than a failure
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Error::UnrecognizedFormat(_) | Error::UnsupportedFormat(_)
        )
    }

    pub(crate) fn filesystem(path: impl Into<PathBuf>, action: &'static str, source: io::Error) -> Self {
        Error::Filesystem {
            path: path.into(),
            action,
            source,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Zip(err.to_string())
    }
}

impl From<unrar::error::UnrarError> for Error {
    fn from(err: unrar::error::UnrarError) -> Self {
        Error::Rar(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
