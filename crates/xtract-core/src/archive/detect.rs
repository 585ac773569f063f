//! Signature-based format detection
//!
//! Only the leading bytes of a file are read; extensions are never consulted.

use super::signature::{self, FormatRule};
use super::ArchiveFormat;
use crate::config::DEFAULT_READ_LIMIT;
use crate::{Error, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Detects archive formats from a bounded header read
#[derive(Debug, Clone, Copy)]
pub struct FormatDetector {
    read_limit: usize,
}

impl Default for FormatDetector {
    fn default() -> Self {
        Self::new(DEFAULT_READ_LIMIT)
    }
}

impl FormatDetector {
    pub const fn new(read_limit: usize) -> Self {
        Self { read_limit }
    }

    /// Read at most `read_limit` bytes; a short stream yields fewer
    pub fn read_header<R: Read>(&self, reader: R) -> io::Result<Vec<u8>> {
        let mut header = Vec::with_capacity(self.read_limit);
        reader.take(self.read_limit as u64).read_to_end(&mut header)?;
        Ok(header)
    }

    pub fn read_file_header(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.read_header(File::open(path)?)
    }

    /// Rule-by-rule check for a single format
    pub fn is_format(&self, path: &Path, format: ArchiveFormat) -> bool {
        let header = match self.read_file_header(path) {
            Ok(header) => header,
            Err(_) => return false,
        };
        signature::RULES
            .iter()
            .filter(|rule| rule.format == format)
            .any(|rule| self.rule_matches(rule, &header, path))
    }

    /// First matching format in priority order
    ///
    /// Unreadable files and files no rule matches are
    /// [`Error::UnrecognizedFormat`]; 7z files are [`Error::UnsupportedFormat`].
    pub fn detect(&self, path: &Path) -> Result<ArchiveFormat> {
        let header = match self.read_file_header(path) {
            Ok(header) => header,
            Err(e) => {
                debug!(path = ?path, error = %e, "Cannot read header");
                return Err(Error::UnrecognizedFormat(path.to_path_buf()));
            }
        };

        for rule in signature::RULES {
            if self.rule_matches(rule, &header, path) {
                debug!(path = ?path, format = %rule.format, "Detected format");
                return Ok(rule.format);
            }
        }

        if signature::any_match(signature::SEVEN_ZIP, &header) {
            debug!(path = ?path, "Detected 7z archive");
            return Err(Error::UnsupportedFormat("7z".to_string()));
        }

        debug!(path = ?path, header_len = header.len(), "No signature matched");
        Err(Error::UnrecognizedFormat(path.to_path_buf()))
    }

    fn rule_matches(&self, rule: &FormatRule, header: &[u8], path: &Path) -> bool {
        if !signature::any_match(rule.outer, header) {
            return false;
        }
        if rule.inner.is_none() && rule.exclude_inner.is_none() {
            return true;
        }

        // A stream that cannot be decompressed has no inner header to match or exclude
        let inner_header = self.decompressed_header(path).ok();
        let inner_matches = |signatures: &[signature::Signature]| {
            inner_header
                .as_deref()
                .is_some_and(|inner_header| signature::any_match(signatures, inner_header))
        };

        rule.inner.map_or(true, inner_matches)
            && !rule.exclude_inner.is_some_and(inner_matches)
    }

    // Second bounded read through the gzip decoder
    fn decompressed_header(&self, path: &Path) -> io::Result<Vec<u8>> {
        let file = File::open(path)?;
        self.read_header(MultiGzDecoder::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::{Cursor, Write};
    use tempfile::TempDir;

    fn tar_bytes() -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        let data = b"hello";
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "hello.txt", &data[..]).unwrap();
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn write(dir: &TempDir, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn test_read_header_is_bounded() {
        let detector = FormatDetector::new(300);
        let data = vec![7u8; 5000];
        assert_eq!(detector.read_header(Cursor::new(&data)).unwrap().len(), 300);
        assert_eq!(detector.read_header(Cursor::new(&data[..10])).unwrap().len(), 10);
    }

    #[test]
    fn test_detect_formats() {
        let dir = TempDir::new().unwrap();
        let detector = FormatDetector::default();

        let tar = write(&dir, "a", &tar_bytes());
        let tgz = write(&dir, "b", &gzip(&tar_bytes()));
        let gz = write(&dir, "c", &gzip(b"just some text"));
        let rar = write(&dir, "d", b"Rar!\x1a\x07\x01\x00rest");

        assert_eq!(detector.detect(&tar).unwrap(), ArchiveFormat::Tar);
        assert_eq!(detector.detect(&tgz).unwrap(), ArchiveFormat::TarGz);
        assert_eq!(detector.detect(&gz).unwrap(), ArchiveFormat::Gzip);
        assert_eq!(detector.detect(&rar).unwrap(), ArchiveFormat::Rar);

        assert!(!detector.is_format(&tgz, ArchiveFormat::Gzip));
        assert!(detector.is_format(&tgz, ArchiveFormat::TarGz));
        assert!(!detector.is_format(&gz, ArchiveFormat::TarGz));
        assert!(detector.is_format(&gz, ArchiveFormat::Gzip));
    }

    #[test]
    fn test_each_sample_matches_exactly_one_format() {
        let dir = TempDir::new().unwrap();
        let detector = FormatDetector::default();

        let mut bzip2 = Vec::new();
        {
            let mut encoder =
                bzip2::write::BzEncoder::new(&mut bzip2, bzip2::Compression::default());
            encoder.write_all(b"bz").unwrap();
            encoder.finish().unwrap();
        }
        let samples = [
            (write(&dir, "tar", &tar_bytes()), ArchiveFormat::Tar),
            (write(&dir, "tgz", &gzip(&tar_bytes())), ArchiveFormat::TarGz),
            (write(&dir, "gz", &gzip(b"plain text")), ArchiveFormat::Gzip),
            (write(&dir, "broken-gz", &[0x1f, 0x8b, 0x08]), ArchiveFormat::Gzip),
            (write(&dir, "rar4", b"Rar!\x1a\x07\x00rest"), ArchiveFormat::Rar),
            (write(&dir, "rar5", b"Rar!\x1a\x07\x01\x00rest"), ArchiveFormat::Rar),
            (write(&dir, "zip", b"PK\x05\x06\0\0\0\0"), ArchiveFormat::Zip),
            (write(&dir, "bz2", &bzip2), ArchiveFormat::Bzip2),
        ];

        for (path, expected) in &samples {
            let matching: Vec<_> = ArchiveFormat::DETECTION_ORDER
                .iter()
                .copied()
                .filter(|format| detector.is_format(path, *format))
                .collect();
            assert_eq!(matching, vec![*expected], "{}", path.display());
            assert_eq!(detector.detect(path).unwrap(), *expected);
        }
    }

    #[test]
    fn test_unrecognized_and_unsupported() {
        let dir = TempDir::new().unwrap();
        let detector = FormatDetector::default();

        let text = write(&dir, "notes.zip", b"definitely not a zip");
        assert!(matches!(
            detector.detect(&text),
            Err(Error::UnrecognizedFormat(_))
        ));

        let empty = write(&dir, "empty", b"");
        assert!(matches!(
            detector.detect(&empty),
            Err(Error::UnrecognizedFormat(_))
        ));

        let missing = dir.path().join("missing");
        assert!(matches!(
            detector.detect(&missing),
            Err(Error::UnrecognizedFormat(_))
        ));

        let seven = write(&dir, "x.7z", &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0, 4]);
        assert!(matches!(
            detector.detect(&seven),
            Err(Error::UnsupportedFormat(name)) if name == "7z"
        ));
    }

    #[test]
    fn test_truncated_gzip_is_plain_gzip() {
        let dir = TempDir::new().unwrap();
        let detector = FormatDetector::default();
        let path = write(&dir, "broken", &[0x1f, 0x8b, 0x08, 0x00]);
        assert_eq!(detector.detect(&path).unwrap(), ArchiveFormat::Gzip);
    }
}
