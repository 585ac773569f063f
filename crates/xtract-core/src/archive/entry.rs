//! Archive entries as yielded by extractors

use crate::Result;
use filetime::FileTime;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Writes an entry's content straight to the given validated path
///
/// For libraries that decode to a file instead of exposing a stream. Returns
/// the bytes written.
pub type Unpacker<'u> = dyn FnMut(&Path) -> Result<u64> + 'u;

/// What an entry materializes as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    /// Byte content, written as a regular file
    File,
    Symlink,
    Hardlink,
    /// Tar global extended header; carries no file
    GlobalHeader,
    /// Raw tar type code with no materialization
    Unknown(u8),
}

/// One member of an archive
///
/// `content` borrows the extractor's open stream and is only usable until the
/// visitor that received the entry returns. A file entry carries either
/// `content` or `unpack`; with neither it is written empty.
pub struct Entry<'a> {
    /// Name exactly as recorded in the archive
    pub name: String,
    pub kind: EntryKind,
    /// Uncompressed size, 0 when the format does not record it
    pub size: u64,
    pub mode: Option<u32>,
    pub mtime: Option<FileTime>,
    pub atime: Option<FileTime>,
    pub link_target: Option<PathBuf>,
    pub content: Option<&'a mut dyn Read>,
    pub unpack: Option<&'a mut Unpacker<'a>>,
}

impl<'a> Entry<'a> {
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            size: 0,
            mode: None,
            mtime: None,
            atime: None,
            link_target: None,
            content: None,
            unpack: None,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Access time, falling back to the modification time
    pub fn access_time(&self) -> Option<FileTime> {
        self.atime.or(self.mtime)
    }
}

impl fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("size", &self.size)
            .field("mode", &self.mode)
            .field("mtime", &self.mtime)
            .field("link_target", &self.link_target)
            .field("has_content", &(self.content.is_some() || self.unpack.is_some()))
            .finish()
    }
}
