//! Rar extractor backed by the unrar library

use super::entry::{Entry, EntryKind};
use super::extractor::{EntryVisitor, Extractor};
use super::ArchiveFormat;
use crate::utils::dos_to_filetime;
use crate::{Error, Result};
use std::path::Path;
use tracing::debug;
use unrar::{Archive, FileHeader};

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Rar extractor
///
/// The library writes file content itself, so file entries carry an
/// [`Entry::unpack`] callback that hands the validated target path to
/// `extract_to`. When `source` is a volume of a multi-part set, reading starts
/// from the first volume. An archive without a single readable header is
/// reported as corrupt.
pub struct RarExtractor;

fn open(source: &Path) -> Archive<'_> {
    let archive = Archive::new(source);
    if archive.is_multipart() {
        archive.as_first_part()
    } else {
        archive
    }
}

fn open_error(source: &Path, err: unrar::error::UnrarError) -> Error {
    Error::Rar(format!("problem opening {}: {}", source.display(), err))
}

fn no_entries(source: &Path) -> Error {
    Error::Rar(format!("{}: no entries, archive is corrupt", source.display()))
}

fn is_symlink(info: &FileHeader) -> bool {
    info.file_attr & S_IFMT == S_IFLNK
}

fn mode_of(info: &FileHeader) -> Option<u32> {
    (info.file_attr & S_IFMT != 0).then_some(info.file_attr & 0o7777)
}

impl Extractor for RarExtractor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Rar
    }

    fn read_entries(&self, source: &Path, visit: &mut EntryVisitor<'_>) -> Result<()> {
        let mut cursor = open(source)
            .open_for_processing()
            .map_err(|e| open_error(source, e))?;
        let mut headers = 0usize;

        while let Some(header) = cursor.read_header()? {
            headers += 1;
            let info = header.entry();
            let name = info.filename.to_string_lossy().into_owned();

            if info.is_encrypted() {
                return Err(Error::Unsupported(format!(
                    "{}: password-protected entries are not supported",
                    name
                )));
            }

            let size = info.unpacked_size;
            let mtime = dos_to_filetime(info.file_time);
            let mode = mode_of(info);

            if info.is_directory() {
                let mut entry = Entry::new(name, EntryKind::Directory);
                entry.mode = mode;
                entry.mtime = mtime;
                cursor = header.skip()?;
                visit(entry)?;
                continue;
            }
            if is_symlink(info) {
                debug!(entry = %name, "Skipping rar symlink");
                cursor = header.skip()?;
                continue;
            }

            let mut pending = Some(header);
            let mut next = None;
            let visited = {
                let mut unpack = |target: &Path| -> Result<u64> {
                    let header = pending.take().ok_or_else(|| {
                        Error::Rar(format!("{}: entry unpacked twice", target.display()))
                    })?;
                    next = Some(header.extract_to(target)?);
                    Ok(size)
                };
                let mut entry = Entry::new(name, EntryKind::File);
                entry.size = size;
                entry.mode = mode;
                entry.mtime = mtime;
                entry.unpack = Some(&mut unpack);
                visit(entry)
            };
            visited?;

            // Entries the visitor did not unpack still have to be stepped over
            cursor = match (next, pending) {
                (Some(next), _) => next,
                (None, Some(header)) => header.skip()?,
                (None, None) => {
                    return Err(Error::Rar(format!("{}: entry was not unpacked", source.display())))
                }
            };
        }

        if headers == 0 {
            return Err(no_entries(source));
        }
        Ok(())
    }

    fn list_entries(&self, source: &Path) -> Result<Vec<String>> {
        let listing = open(source)
            .open_for_listing()
            .map_err(|e| open_error(source, e))?;

        let mut headers = 0usize;
        let mut names = Vec::new();
        for header in listing {
            let header = header?;
            headers += 1;
            if !header.is_directory() && is_symlink(&header) {
                continue;
            }
            names.push(header.filename.to_string_lossy().into_owned());
        }

        if headers == 0 {
            return Err(no_entries(source));
        }
        Ok(names)
    }
}
