//! Single-file gzip extractor

use super::entry::{Entry, EntryKind};
use super::extractor::{EntryVisitor, Extractor};
use super::ArchiveFormat;
use crate::utils::strip_last_extension;
use crate::{Error, Result};
use filetime::FileTime;
use flate2::bufread::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Gzip extractor
///
/// The single entry is named after the original file name stored in the gzip
/// header, or the archive name without its last extension.
pub struct GzipExtractor;

impl Extractor for GzipExtractor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Gzip
    }

    fn read_entries(&self, source: &Path, visit: &mut EntryVisitor<'_>) -> Result<()> {
        let file = File::open(source)
            .map_err(|e| Error::Archive(format!("problem opening {}: {}", source.display(), e)))?;
        let mut reader = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));

        // Decoding the first block parses the member header
        reader
            .fill_buf()
            .map_err(|e| Error::Archive(format!("{}: {}", source.display(), e)))?;

        let header = reader.get_ref().header();
        let name = header
            .and_then(|header| header.filename())
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| strip_last_extension(source));
        let mtime = header
            .map(|header| header.mtime())
            .filter(|seconds| *seconds > 0)
            .map(|seconds| FileTime::from_unix_time(seconds as i64, 0));

        let mut entry = Entry::new(name, EntryKind::File);
        entry.mtime = mtime;
        entry.content = Some(&mut reader);
        visit(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::{Compression, GzBuilder};
    use std::fs;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    #[test]
    fn test_name_from_archive() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("notes.txt.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"line one\n").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let mut seen = Vec::new();
        GzipExtractor
            .read_entries(&path, &mut |mut entry| {
                let mut body = String::new();
                entry.content.as_mut().unwrap().read_to_string(&mut body).unwrap();
                seen.push((entry.name.clone(), body));
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec![("notes.txt".to_string(), "line one\n".to_string())]);
    }

    #[test]
    fn test_name_and_mtime_from_header() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("renamed.gz");
        let mut encoder = GzBuilder::new()
            .filename("original.log")
            .mtime(1_500_000_000)
            .write(Vec::new(), Compression::default());
        encoder.write_all(b"payload").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let mut seen = None;
        GzipExtractor
            .read_entries(&path, &mut |entry| {
                seen = Some((entry.name.clone(), entry.mtime));
                Ok(())
            })
            .unwrap();

        let (name, mtime) = seen.unwrap();
        assert_eq!(name, "original.log");
        assert_eq!(mtime, Some(FileTime::from_unix_time(1_500_000_000, 0)));
    }

    #[test]
    fn test_concatenated_members() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("joined.gz");
        let mut data = Vec::new();
        for part in [&b"first "[..], &b"second"[..]] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(part).unwrap();
            data.extend(encoder.finish().unwrap());
        }
        fs::write(&path, data).unwrap();

        let mut body = String::new();
        GzipExtractor
            .read_entries(&path, &mut |mut entry| {
                entry.content.as_mut().unwrap().read_to_string(&mut body).unwrap();
                Ok(())
            })
            .unwrap();
        assert_eq!(body, "first second");
    }
}
