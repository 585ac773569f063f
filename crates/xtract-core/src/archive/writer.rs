//! Filesystem writer
//!
//! Turns [`Entry`] values into files, directories and links under a guarded
//! destination root. Directory metadata is deferred until every entry has been
//! written, because creating children bumps a directory's modification time.

use super::entry::{Entry, EntryKind, Unpacker};
use super::ExtractOptions;
use crate::security::PathGuard;
use crate::{Error, Result};
use filetime::FileTime;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

/// Buffer size for streaming entry content to disk
pub const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Counters for one extracted archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractStats {
    /// Directory the entries were written under
    pub destination: PathBuf,
    pub entries: u64,
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub hardlinks: u64,
    pub bytes_written: u64,
}

#[derive(Debug, Clone, Copy)]
struct DirectoryMetadata {
    atime: Option<FileTime>,
    mtime: Option<FileTime>,
    mode: Option<u32>,
}

/// Directory times and modes applied once, after the entry loop
#[derive(Debug, Default)]
pub struct DeferredTimestamps {
    entries: BTreeMap<PathBuf, DirectoryMetadata>,
}

impl DeferredTimestamps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember metadata for `path`; a later record for the same path wins
    pub fn record(
        &mut self,
        path: PathBuf,
        atime: Option<FileTime>,
        mtime: Option<FileTime>,
        mode: Option<u32>,
    ) {
        if atime.is_none() && mtime.is_none() && mode.is_none() {
            return;
        }
        self.entries
            .insert(path, DirectoryMetadata { atime, mtime, mode });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply everything, deepest paths first
    ///
    /// Keeps going past failures and returns the first one.
    pub fn apply(self) -> Result<usize> {
        let mut applied = 0;
        let mut first_error = None;

        for (path, metadata) in self.entries.into_iter().rev() {
            match apply_directory_metadata(&path, &metadata) {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to restore directory metadata");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(applied),
        }
    }
}

fn apply_directory_metadata(path: &Path, metadata: &DirectoryMetadata) -> Result<()> {
    if let Some(mode) = metadata.mode {
        set_mode(path, mode)?;
    }
    if let Some(mtime) = metadata.mtime {
        let atime = metadata.atime.unwrap_or(mtime);
        filetime::set_file_times(path, atime, mtime)
            .map_err(|e| Error::filesystem(path, "setting times", e))?;
    }
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| Error::filesystem(path, "setting mode", e))
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    let mut permissions = fs::metadata(path)
        .map_err(|e| Error::filesystem(path, "setting mode", e))?
        .permissions();
    permissions.set_readonly(mode & 0o222 == 0);
    fs::set_permissions(path, permissions).map_err(|e| Error::filesystem(path, "setting mode", e))
}

// Anything but a real directory is unlinked before a new entry takes its place
fn remove_existing(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if !metadata.is_dir() => {
            fs::remove_file(path).map_err(|e| Error::filesystem(path, "removing existing entry", e))
        }
        _ => Ok(()),
    }
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .map_err(|e| Error::filesystem(parent, "creating directory", e)),
        _ => Ok(()),
    }
}

/// Create `path` and any missing ancestors
///
/// The directory stays owner-writable so children can be created; the final
/// mode belongs in [`DeferredTimestamps`].
pub fn make_directories(path: &Path, mode: Option<u32>) -> Result<()> {
    if let Ok(metadata) = fs::symlink_metadata(path) {
        if metadata.file_type().is_symlink() {
            fs::remove_file(path)
                .map_err(|e| Error::filesystem(path, "removing existing entry", e))?;
        }
    }

    fs::create_dir_all(path).map_err(|e| Error::filesystem(path, "creating directory", e))?;

    if let Some(mode) = mode {
        set_mode(path, mode | 0o700)?;
    }
    Ok(())
}

/// Stream `content` into a fresh file at `path` and return the bytes written
pub fn write_file(path: &Path, content: &mut dyn Read, mode: Option<u32>) -> Result<u64> {
    create_parent(path)?;
    remove_existing(path)?;

    let file = File::create(path).map_err(|e| Error::filesystem(path, "creating file", e))?;
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let written =
        io::copy(content, &mut writer).map_err(|e| Error::filesystem(path, "writing file", e))?;
    writer
        .flush()
        .map_err(|e| Error::filesystem(path, "writing file", e))?;
    drop(writer);

    if let Some(mode) = mode {
        set_mode(path, mode)?;
    }
    Ok(written)
}

/// Let `unpack` write the file at `path`, then apply `mode`
pub fn write_unpacked(path: &Path, unpack: &mut Unpacker<'_>, mode: Option<u32>) -> Result<u64> {
    create_parent(path)?;
    remove_existing(path)?;
    let written = unpack(path)?;

    if let Some(mode) = mode {
        set_mode(path, mode)?;
    }
    Ok(written)
}

/// Create a symbolic link at `path` pointing to `target`, replacing what was there
#[cfg(unix)]
pub fn write_symlink(path: &Path, target: &Path) -> Result<()> {
    create_parent(path)?;
    remove_existing(path)?;
    std::os::unix::fs::symlink(target, path)
        .map_err(|e| Error::filesystem(path, "creating symlink", e))
}

#[cfg(not(unix))]
pub fn write_symlink(path: &Path, _target: &Path) -> Result<()> {
    Err(Error::Unsupported(format!(
        "symlinks are not supported on this platform: {}",
        path.display()
    )))
}

/// Create a hard link at `path` to the existing file `target`
pub fn write_hardlink(path: &Path, target: &Path) -> Result<()> {
    create_parent(path)?;
    remove_existing(path)?;
    fs::hard_link(target, path).map_err(|e| Error::filesystem(path, "creating hard link", e))
}

/// Materializes the entries of one archive under a destination root
pub struct EntryWriter<'o> {
    guard: PathGuard,
    options: &'o ExtractOptions,
    deferred: DeferredTimestamps,
    stats: ExtractStats,
}

impl<'o> EntryWriter<'o> {
    pub fn new(destination: &Path, options: &'o ExtractOptions) -> Result<Self> {
        Ok(Self {
            guard: PathGuard::new(destination)?,
            options,
            deferred: DeferredTimestamps::new(),
            stats: ExtractStats::default(),
        })
    }

    pub fn stats(&self) -> &ExtractStats {
        &self.stats
    }

    /// Write one entry and return the number of content bytes written
    pub fn materialize(&mut self, entry: Entry<'_>) -> Result<u64> {
        if let Some(cancel) = &self.options.cancel {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }

        if entry.kind == EntryKind::GlobalHeader {
            trace!(entry = %entry.name, "Skipping global extended header");
            return Ok(0);
        }

        let target = self.guard.validate(&entry.name)?;
        let mode = if self.options.preserve_permissions {
            entry.mode.map(|mode| mode & 0o7777)
        } else {
            None
        };
        let (atime, mtime) = if self.options.preserve_timestamps {
            (entry.access_time(), entry.mtime)
        } else {
            (None, None)
        };

        trace!(entry = %entry.name, kind = ?entry.kind, "Materializing entry");

        let written = match entry.kind {
            EntryKind::Directory => {
                // The root keeps its own metadata
                if target != self.guard.root() {
                    make_directories(&target, mode)?;
                    self.deferred.record(target, atime, mtime, mode);
                }
                self.stats.directories += 1;
                0
            }
            EntryKind::File => {
                let written = match (entry.content, entry.unpack) {
                    (Some(content), _) => write_file(&target, content, mode)?,
                    (None, Some(unpack)) => write_unpacked(&target, unpack, mode)?,
                    (None, None) => write_file(&target, &mut io::empty(), mode)?,
                };
                if let Some(mtime) = mtime {
                    filetime::set_file_times(&target, atime.unwrap_or(mtime), mtime)
                        .map_err(|e| Error::filesystem(&target, "setting times", e))?;
                }
                self.stats.files += 1;
                self.stats.bytes_written += written;
                written
            }
            EntryKind::Symlink => {
                let link_target = entry.link_target.ok_or_else(|| {
                    Error::Archive(format!("{}: symlink without target", entry.name))
                })?;
                self.guard.validate_symlink(
                    &target,
                    &link_target,
                    self.options.security.allow_external_symlinks,
                )?;
                write_symlink(&target, &link_target)?;
                if let Some(mtime) = mtime {
                    filetime::set_symlink_file_times(&target, atime.unwrap_or(mtime), mtime)
                        .map_err(|e| Error::filesystem(&target, "setting times", e))?;
                }
                self.stats.symlinks += 1;
                0
            }
            EntryKind::Hardlink => {
                let link_target = entry.link_target.ok_or_else(|| {
                    Error::Archive(format!("{}: hard link without target", entry.name))
                })?;
                let source = self.guard.validate(&link_target.to_string_lossy())?;
                write_hardlink(&target, &source)?;
                self.stats.hardlinks += 1;
                0
            }
            EntryKind::Unknown(type_code) => {
                return Err(Error::UnknownEntryType {
                    entry: entry.name,
                    type_code,
                });
            }
            EntryKind::GlobalHeader => 0,
        };

        self.stats.entries += 1;
        Ok(written)
    }

    /// Apply deferred directory metadata and return the counters
    pub fn finish(mut self) -> Result<ExtractStats> {
        let deferred = std::mem::take(&mut self.deferred);
        let applied = deferred.apply()?;
        debug!(root = ?self.guard.root(), directories = applied, "Restored directory metadata");
        self.stats.destination = self.guard.root().to_path_buf();
        Ok(self.stats)
    }
}
