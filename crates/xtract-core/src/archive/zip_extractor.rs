//! Zip extractor implementation

use super::entry::{Entry, EntryKind};
use super::extractor::{EntryVisitor, Extractor};
use super::ArchiveFormat;
use crate::utils::civil_to_filetime;
use crate::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Zip extractor
pub struct ZipExtractor;

impl Extractor for ZipExtractor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Zip
    }

    fn read_entries(&self, source: &Path, visit: &mut EntryVisitor<'_>) -> Result<()> {
        let file = File::open(source)
            .map_err(|e| Error::Archive(format!("problem opening {}: {}", source.display(), e)))?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        for index in 0..archive.len() {
            let (name, encrypted) = {
                let raw = archive.by_index_raw(index)?;
                (raw.name().to_string(), raw.encrypted())
            };
            if encrypted {
                return Err(Error::Unsupported(format!(
                    "{}: password-protected entries are not supported",
                    name
                )));
            }

            let mut file = archive.by_index(index)?;
            let mode = file.unix_mode();
            let is_symlink = mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK);
            let kind = if file.is_dir() {
                EntryKind::Directory
            } else if is_symlink {
                EntryKind::Symlink
            } else {
                EntryKind::File
            };
            let mtime = file.last_modified().and_then(|dt| {
                civil_to_filetime(
                    i32::from(dt.year()),
                    u32::from(dt.month()),
                    u32::from(dt.day()),
                    u32::from(dt.hour()),
                    u32::from(dt.minute()),
                    u32::from(dt.second()),
                )
            });
            let size = file.size();

            // Symlink targets are stored as the entry's content
            let link_target = if is_symlink {
                let mut target = String::new();
                file.read_to_string(&mut target)
                    .map_err(|e| Error::Zip(format!("{}: {}", name, e)))?;
                Some(PathBuf::from(target.trim()))
            } else {
                None
            };

            let content: Option<&mut dyn Read> = if kind == EntryKind::File {
                Some(&mut file)
            } else {
                None
            };

            visit(Entry {
                name,
                kind,
                size,
                mode,
                mtime,
                atime: None,
                link_target,
                content,
                unpack: None,
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::unstable::write::FileOptionsExt;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, encrypt: bool) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        let stamp = zip::DateTime::from_date_and_time(2020, 1, 2, 3, 4, 6).unwrap();
        let options = SimpleFileOptions::default()
            .unix_permissions(0o640)
            .last_modified_time(stamp);

        zip.add_directory("pkg/", options).unwrap();
        let file_options = if encrypt {
            options.with_deprecated_encryption(b"secret")
        } else {
            options
        };
        zip.start_file("pkg/a.txt", file_options).unwrap();
        zip.write_all(b"zipped").unwrap();
        zip.add_symlink("pkg/link", "a.txt", options).unwrap();
        zip.finish().unwrap();
    }

    #[test]
    fn test_entries() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sample.zip");
        write_zip(&path, false);

        let mut seen = Vec::new();
        ZipExtractor
            .read_entries(&path, &mut |mut entry| {
                let mut body = String::new();
                if let Some(content) = entry.content.as_mut() {
                    content.read_to_string(&mut body).unwrap();
                }
                seen.push((entry.name.clone(), entry.kind, body, entry.link_target.clone()));
                if entry.kind == EntryKind::File {
                    assert_eq!(entry.mode.map(|m| m & 0o777), Some(0o640));
                    assert_eq!(entry.mtime, civil_to_filetime(2020, 1, 2, 3, 4, 6));
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].1, EntryKind::Directory);
        assert_eq!(seen[1].2, "zipped");
        assert_eq!(seen[2].1, EntryKind::Symlink);
        assert_eq!(seen[2].3, Some(PathBuf::from("a.txt")));
    }

    #[test]
    fn test_encrypted_entry_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("locked.zip");
        write_zip(&path, true);

        match ZipExtractor.list_entries(&path) {
            Err(Error::Unsupported(message)) => assert!(message.contains("pkg/a.txt")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_corrupt_zip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.zip");
        fs::write(&path, b"PK\x03\x04 truncated").unwrap();
        let err = ZipExtractor.list_entries(&path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ArchiveOpen);
    }
}
