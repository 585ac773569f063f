//! Tar and tar.gz extractors

use super::entry::{Entry, EntryKind};
use super::extractor::{EntryVisitor, Extractor};
use super::ArchiveFormat;
use crate::{Error, Result};
use filetime::FileTime;
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tar::{Archive, EntryType};

/// Wraps the raw archive file in a decoding stream
pub type StreamAdapter = fn(File) -> Box<dyn Read>;

fn plain(file: File) -> Box<dyn Read> {
    Box::new(BufReader::new(file))
}

fn gunzip(file: File) -> Box<dyn Read> {
    Box::new(MultiGzDecoder::new(BufReader::new(file)))
}

/// Tar extractor
pub struct TarExtractor {
    format: ArchiveFormat,
    adapter: StreamAdapter,
}

impl Default for TarExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TarExtractor {
    /// Create a new tar extractor reading the file as is
    pub const fn new() -> Self {
        Self {
            format: ArchiveFormat::Tar,
            adapter: plain,
        }
    }

    /// Create a tar extractor that reads through `adapter`
    pub const fn with_adapter(format: ArchiveFormat, adapter: StreamAdapter) -> Self {
        Self { format, adapter }
    }

    fn open(&self, source: &Path) -> Result<Archive<Box<dyn Read>>> {
        let file = File::open(source)
            .map_err(|e| Error::Archive(format!("problem opening {}: {}", source.display(), e)))?;
        Ok(Archive::new((self.adapter)(file)))
    }
}

fn entry_kind(entry_type: EntryType) -> EntryKind {
    match entry_type {
        EntryType::Directory => EntryKind::Directory,
        EntryType::Symlink => EntryKind::Symlink,
        EntryType::Link => EntryKind::Hardlink,
        EntryType::XGlobalHeader => EntryKind::GlobalHeader,
        EntryType::Regular
        | EntryType::Continuous
        | EntryType::GNUSparse
        | EntryType::Block
        | EntryType::Fifo => EntryKind::File,
        other => EntryKind::Unknown(other.as_byte()),
    }
}

fn unix_time(seconds: u64) -> FileTime {
    FileTime::from_unix_time(seconds as i64, 0)
}

impl Extractor for TarExtractor {
    fn format(&self) -> ArchiveFormat {
        self.format
    }

    fn read_entries(&self, source: &Path, visit: &mut EntryVisitor<'_>) -> Result<()> {
        let corrupt =
            |e: std::io::Error| Error::Archive(format!("{}: {}", source.display(), e));

        let mut archive = self.open(source)?;

        for entry in archive.entries().map_err(corrupt)? {
            let mut entry = entry.map_err(corrupt)?;

            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let link_target = entry
                .link_name_bytes()
                .map(|bytes| PathBuf::from(String::from_utf8_lossy(&bytes).into_owned()));
            let size = entry.size();
            let header = entry.header();
            let kind = entry_kind(header.entry_type());
            let mode = header.mode().ok();
            let mtime = header.mtime().ok().map(unix_time);
            let atime = header
                .as_gnu()
                .and_then(|gnu| gnu.atime().ok())
                .filter(|seconds| *seconds > 0)
                .map(unix_time);

            let content: Option<&mut dyn Read> = if kind == EntryKind::File {
                Some(&mut entry)
            } else {
                None
            };

            visit(Entry {
                name,
                kind,
                size,
                mode,
                mtime,
                atime,
                link_target,
                content,
                unpack: None,
            })?;
        }

        Ok(())
    }
}

/// Tar extractor reading through a gzip decoder
pub struct TarGzExtractor {
    tar: TarExtractor,
}

impl Default for TarGzExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl TarGzExtractor {
    pub const fn new() -> Self {
        Self {
            tar: TarExtractor::with_adapter(ArchiveFormat::TarGz, gunzip),
        }
    }
}

impl Extractor for TarGzExtractor {
    fn format(&self) -> ArchiveFormat {
        self.tar.format()
    }

    fn read_entries(&self, source: &Path, visit: &mut EntryVisitor<'_>) -> Result<()> {
        self.tar.read_entries(source, visit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn header(entry_type: EntryType, size: u64) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_size(size);
        header.set_mode(0o644);
        header.set_mtime(1_234_567_890);
        header
    }

    fn sample_tar() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = header(EntryType::Directory, 0);
        builder.append_data(&mut dir, "pkg/", std::io::empty()).unwrap();

        let mut file = header(EntryType::Regular, 5);
        builder.append_data(&mut file, "pkg/a.txt", &b"hello"[..]).unwrap();

        let mut link = header(EntryType::Symlink, 0);
        builder.append_link(&mut link, "pkg/link", "a.txt").unwrap();

        let mut global = header(EntryType::XGlobalHeader, 0);
        builder
            .append_data(&mut global, "pax_global_header", std::io::empty())
            .unwrap();

        let mut device = header(EntryType::Char, 0);
        builder.append_data(&mut device, "pkg/tty", std::io::empty()).unwrap();

        builder.into_inner().unwrap()
    }

    #[test]
    fn test_entry_kinds_and_metadata() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sample.tar");
        fs::write(&path, sample_tar()).unwrap();

        let mut seen = Vec::new();
        TarExtractor::new()
            .read_entries(&path, &mut |mut entry| {
                let mut body = String::new();
                if let Some(content) = entry.content.as_mut() {
                    content.read_to_string(&mut body).unwrap();
                }
                seen.push((entry.name.clone(), entry.kind, body, entry.link_target.clone()));
                assert_eq!(entry.mtime, Some(FileTime::from_unix_time(1_234_567_890, 0)));
                assert_eq!(entry.access_time(), entry.mtime);
                Ok(())
            })
            .unwrap();

        assert_eq!(seen.len(), 5);
        assert_eq!(seen[0].1, EntryKind::Directory);
        assert_eq!(seen[1], ("pkg/a.txt".into(), EntryKind::File, "hello".into(), None));
        assert_eq!(seen[2].1, EntryKind::Symlink);
        assert_eq!(seen[2].3, Some(PathBuf::from("a.txt")));
        assert_eq!(seen[3].1, EntryKind::GlobalHeader);
        assert_eq!(seen[4].1, EntryKind::Unknown(b'3'));
    }

    #[test]
    fn test_tar_gz_reads_through_gzip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sample.tgz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&sample_tar()).unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let extractor = TarGzExtractor::new();
        assert_eq!(extractor.format(), ArchiveFormat::TarGz);
        let names = extractor.list_entries(&path).unwrap();
        assert_eq!(names[1], "pkg/a.txt");

        // The plain reader cannot make sense of it
        assert!(TarExtractor::new().list_entries(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_archive_error() {
        let temp = TempDir::new().unwrap();
        let result = TarExtractor::new().list_entries(&temp.path().join("missing.tar"));
        assert!(matches!(result, Err(Error::Archive(_))));
    }
}
