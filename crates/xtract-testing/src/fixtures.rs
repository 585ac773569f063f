//! Archive fixtures for xtract testing
//!
//! Tar headers are written byte by byte, so names the `tar` crate refuses to
//! produce (absolute paths, `..` segments, backslashes) end up in the archive
//! exactly as given.

use anyhow::{bail, Context, Result};
use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Modification time given to fixture entries unless overridden (even, for zip)
pub const DEFAULT_MTIME: u64 = 1_600_000_000;

/// Magic bytes of a rar v5 archive
pub const RAR5_MAGIC: &[u8] = b"Rar!\x1a\x07\x01\x00";

/// Magic bytes of a rar 1.5-4.x archive
pub const RAR4_MAGIC: &[u8] = b"Rar!\x1a\x07\x00";

const RAR4_MAIN_HEAD: u8 = 0x73;
const RAR4_FILE_HEAD: u8 = 0x74;
const RAR4_END_HEAD: u8 = 0x7b;
const RAR4_SKIP_IF_UNKNOWN: u16 = 0x4000;
// Set on every file header: an ADD_SIZE (the packed size) follows
const RAR4_LONG_BLOCK: u16 = 0x8000;
const RAR4_PASSWORD: u16 = 0x0004;
const RAR4_DIRECTORY: u16 = 0x00e0;
const RAR4_HOST_UNIX: u8 = 3;
const RAR4_UNPACK_VERSION: u8 = 29;
const RAR4_METHOD_STORE: u8 = 0x30;

/// Magic bytes of a 7z archive
pub const SEVEN_ZIP_MAGIC: &[u8] = &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c, 0x00, 0x04];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureKind {
    Dir,
    File(Vec<u8>),
    Symlink(String),
    Hardlink(String),
    CharDevice,
}

/// One entry of a fixture archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureEntry {
    pub name: String,
    pub kind: FixtureKind,
    pub mode: u32,
    pub mtime: u64,
}

impl FixtureEntry {
    fn new(name: &str, kind: FixtureKind, mode: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            mode,
            mtime: DEFAULT_MTIME,
        }
    }

    pub fn dir(name: &str) -> Self {
        Self::new(name, FixtureKind::Dir, 0o755)
    }

    pub fn file(name: &str, data: impl Into<Vec<u8>>) -> Self {
        Self::new(name, FixtureKind::File(data.into()), 0o644)
    }

    pub fn symlink(name: &str, target: &str) -> Self {
        Self::new(name, FixtureKind::Symlink(target.to_string()), 0o777)
    }

    pub fn hardlink(name: &str, target: &str) -> Self {
        Self::new(name, FixtureKind::Hardlink(target.to_string()), 0o644)
    }

    pub fn char_device(name: &str) -> Self {
        Self::new(name, FixtureKind::CharDevice, 0o600)
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    pub fn mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }
}

fn copy_field(field: &mut [u8], value: &str, what: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > field.len() {
        bail!("{} too long for a tar header: {}", what, value);
    }
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Raw tar bytes for `entries`
pub fn tar_bytes(entries: &[FixtureEntry]) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());

    for entry in entries {
        let mut header = tar::Header::new_gnu();
        copy_field(&mut header.as_old_mut().name, &entry.name, "name")?;
        header.set_mode(entry.mode);
        header.set_mtime(entry.mtime);
        header.set_uid(0);
        header.set_gid(0);

        let data: &[u8] = match &entry.kind {
            FixtureKind::Dir => {
                header.set_entry_type(tar::EntryType::Directory);
                &[]
            }
            FixtureKind::File(data) => {
                header.set_entry_type(tar::EntryType::Regular);
                data
            }
            FixtureKind::Symlink(target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                copy_field(&mut header.as_old_mut().linkname, target, "link target")?;
                &[]
            }
            FixtureKind::Hardlink(target) => {
                header.set_entry_type(tar::EntryType::Link);
                copy_field(&mut header.as_old_mut().linkname, target, "link target")?;
                &[]
            }
            FixtureKind::CharDevice => {
                header.set_entry_type(tar::EntryType::Char);
                &[]
            }
        };

        header.set_size(data.len() as u64);
        header.set_cksum();
        builder.append(&header, data)?;
    }

    Ok(builder.into_inner()?)
}

fn gzip_bytes(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn write_bytes(path: &Path, data: &[u8]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data).with_context(|| format!("writing fixture {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Write a tar archive
pub fn write_tar(path: &Path, entries: &[FixtureEntry]) -> Result<PathBuf> {
    write_bytes(path, &tar_bytes(entries)?)
}

/// Write a gzip-compressed tar archive
pub fn write_tar_gz(path: &Path, entries: &[FixtureEntry]) -> Result<PathBuf> {
    write_bytes(path, &gzip_bytes(&tar_bytes(entries)?)?)
}

/// Write a single gzip member with no original name in its header
pub fn write_gzip(path: &Path, data: &[u8]) -> Result<PathBuf> {
    write_bytes(path, &gzip_bytes(data)?)
}

/// Write a single gzip member recording `original_name` and `mtime`
pub fn write_gzip_named(path: &Path, original_name: &str, mtime: u32, data: &[u8]) -> Result<PathBuf> {
    let mut encoder = GzBuilder::new()
        .filename(original_name)
        .mtime(mtime)
        .write(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    write_bytes(path, &encoder.finish()?)
}

/// Write a bzip2 stream
pub fn write_bzip2(path: &Path, data: &[u8]) -> Result<PathBuf> {
    let mut encoder = BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data)?;
    write_bytes(path, &encoder.finish()?)
}

fn zip_time(mtime: u64) -> Result<zip::DateTime> {
    use chrono::{Datelike, Timelike};

    let stamp = chrono::DateTime::from_timestamp(mtime as i64, 0)
        .with_context(|| format!("timestamp out of range: {}", mtime))?;
    zip::DateTime::from_date_and_time(
        stamp.year() as u16,
        stamp.month() as u8,
        stamp.day() as u8,
        stamp.hour() as u8,
        stamp.minute() as u8,
        stamp.second() as u8,
    )
    .map_err(|_| anyhow::anyhow!("timestamp not representable in zip: {}", mtime))
}

/// Write a zip archive; hard links and devices are not representable
pub fn write_zip(path: &Path, entries: &[FixtureEntry]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut zip = ZipWriter::new(File::create(path)?);

    for entry in entries {
        let options = SimpleFileOptions::default()
            .unix_permissions(entry.mode)
            .last_modified_time(zip_time(entry.mtime)?);

        match &entry.kind {
            FixtureKind::Dir => zip.add_directory(entry.name.as_str(), options)?,
            FixtureKind::File(data) => {
                zip.start_file(entry.name.as_str(), options)?;
                zip.write_all(data)?;
            }
            FixtureKind::Symlink(target) => {
                zip.add_symlink(entry.name.as_str(), target.as_str(), options)?
            }
            FixtureKind::Hardlink(_) | FixtureKind::CharDevice => {
                bail!("zip cannot hold {:?} entries", entry.kind)
            }
        }
    }

    zip.finish()?;
    Ok(path.to_path_buf())
}

fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

// HEAD_CRC is the low half of the CRC32 over the rest of the header
fn rar4_block(out: &mut Vec<u8>, head_type: u8, flags: u16, body: &[u8]) -> Result<()> {
    let size = u16::try_from(7 + body.len()).context("rar header too large")?;
    let mut header = vec![head_type];
    header.extend_from_slice(&flags.to_le_bytes());
    header.extend_from_slice(&size.to_le_bytes());
    header.extend_from_slice(body);

    out.extend_from_slice(&((crc32(&header) & 0xffff) as u16).to_le_bytes());
    out.extend_from_slice(&header);
    Ok(())
}

/// Raw bytes of a rar 4 archive holding `entries` uncompressed
///
/// Entries are stamped as created on Unix, so modes carry file type bits.
/// With `locked`, file entries are flagged as password protected; their data
/// is left as plain text since nothing is ever decrypted.
pub fn rar4_bytes(entries: &[FixtureEntry], locked: bool) -> Result<Vec<u8>> {
    let mut out = RAR4_MAGIC.to_vec();
    rar4_block(&mut out, RAR4_MAIN_HEAD, 0, &[0u8; 6])?;

    for entry in entries {
        let (mut flags, attr, data): (u16, u32, &[u8]) = match &entry.kind {
            FixtureKind::Dir => (RAR4_DIRECTORY, 0o040000 | entry.mode, &[][..]),
            FixtureKind::File(data) => (0, 0o100000 | entry.mode, data.as_slice()),
            FixtureKind::Symlink(target) => (0, 0o120000 | entry.mode, target.as_bytes()),
            FixtureKind::Hardlink(_) | FixtureKind::CharDevice => {
                bail!("rar fixtures cannot hold {:?} entries", entry.kind)
            }
        };
        flags |= RAR4_LONG_BLOCK;
        if locked && matches!(entry.kind, FixtureKind::File(_)) {
            flags |= RAR4_PASSWORD;
        }

        let name = entry.name.trim_end_matches('/');
        let name_size = u16::try_from(name.len()).context("rar entry name too long")?;
        let packed = u32::try_from(data.len()).context("rar entry too large")?;
        let stamp = zip_time(entry.mtime)?;
        let dos_time = (u32::from(stamp.datepart()) << 16) | u32::from(stamp.timepart());

        let mut body = Vec::with_capacity(25 + name.len());
        body.extend_from_slice(&packed.to_le_bytes());
        body.extend_from_slice(&packed.to_le_bytes());
        body.push(RAR4_HOST_UNIX);
        body.extend_from_slice(&crc32(data).to_le_bytes());
        body.extend_from_slice(&dos_time.to_le_bytes());
        body.push(RAR4_UNPACK_VERSION);
        body.push(RAR4_METHOD_STORE);
        body.extend_from_slice(&name_size.to_le_bytes());
        body.extend_from_slice(&attr.to_le_bytes());
        body.extend_from_slice(name.as_bytes());

        rar4_block(&mut out, RAR4_FILE_HEAD, flags, &body)?;
        out.extend_from_slice(data);
    }

    rar4_block(&mut out, RAR4_END_HEAD, RAR4_SKIP_IF_UNKNOWN, &[])?;
    Ok(out)
}

/// Write a rar 4 archive with stored (uncompressed) entries
pub fn write_rar(path: &Path, entries: &[FixtureEntry]) -> Result<PathBuf> {
    write_bytes(path, &rar4_bytes(entries, false)?)
}

/// Write a rar 4 archive whose file entries are marked password protected
pub fn write_locked_rar(path: &Path, entries: &[FixtureEntry]) -> Result<PathBuf> {
    write_bytes(path, &rar4_bytes(entries, true)?)
}

/// A file that starts like a rar archive and contains nothing valid after that
pub fn write_fake_rar(path: &Path) -> Result<PathBuf> {
    let mut data = RAR5_MAGIC.to_vec();
    data.extend_from_slice(b"\x00 fake body");
    write_bytes(path, &data)
}

/// A file carrying only the 7z signature
pub fn write_seven_zip(path: &Path) -> Result<PathBuf> {
    let mut data = SEVEN_ZIP_MAGIC.to_vec();
    data.extend_from_slice(&[0u8; 24]);
    write_bytes(path, &data)
}

/// A small project-like tree shared by round-trip tests
pub fn sample_project() -> Vec<FixtureEntry> {
    vec![
        FixtureEntry::dir("project/").mtime(1_500_000_000),
        FixtureEntry::file("project/README.md", "# Sample\n"),
        FixtureEntry::dir("project/src/").mtime(1_500_000_100).mode(0o750),
        FixtureEntry::file("project/src/main.rs", "fn main() {}\n").mode(0o600),
        FixtureEntry::file("project/run.sh", "#!/bin/sh\necho hi\n").mode(0o755),
        FixtureEntry::file("project/empty.txt", Vec::new()),
    ]
}
