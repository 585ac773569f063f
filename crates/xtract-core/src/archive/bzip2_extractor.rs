//! Single-file bzip2 extractor

use super::entry::{Entry, EntryKind};
use super::extractor::{EntryVisitor, Extractor};
use super::ArchiveFormat;
use crate::utils::strip_last_extension;
use crate::{Error, Result};
use bzip2::read::MultiBzDecoder;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Bzip2 extractor; the entry is the archive name without its last extension
pub struct Bzip2Extractor;

impl Extractor for Bzip2Extractor {
    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Bzip2
    }

    fn read_entries(&self, source: &Path, visit: &mut EntryVisitor<'_>) -> Result<()> {
        let file = File::open(source)
            .map_err(|e| Error::Archive(format!("problem opening {}: {}", source.display(), e)))?;
        let mut decoder = MultiBzDecoder::new(BufReader::new(file));

        let mut entry = Entry::new(strip_last_extension(source), EntryKind::File);
        entry.content = Some(&mut decoder);
        visit(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bzip2::write::BzEncoder;
    use bzip2::Compression;
    use std::fs;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    #[test]
    fn test_single_entry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dump.sql.bz2");
        let mut encoder = BzEncoder::new(Vec::new(), Compression::best());
        encoder.write_all(b"select 1;").unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let mut seen = Vec::new();
        Bzip2Extractor
            .read_entries(&path, &mut |mut entry| {
                let mut body = String::new();
                entry.content.as_mut().unwrap().read_to_string(&mut body).unwrap();
                seen.push((entry.name.clone(), body));
                Ok(())
            })
            .unwrap();

        assert_eq!(seen, vec![("dump.sql".to_string(), "select 1;".to_string())]);
    }

    #[test]
    fn test_corrupt_stream_fails_on_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.bz2");
        fs::write(&path, b"BZh9 this is not bzip2 data").unwrap();

        let dest = TempDir::new().unwrap();
        let result = Bzip2Extractor.extract(
            &path,
            dest.path(),
            &crate::archive::ExtractOptions::default(),
            &crate::progress::NoProgress,
        );
        assert!(result.is_err());
    }
}
