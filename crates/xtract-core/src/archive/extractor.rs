//! Extractor trait for archive operations

use super::entry::Entry;
use super::writer::{EntryWriter, ExtractStats};
use super::{toplevel, ArchiveFormat, ExtractOptions};
use crate::progress::ProgressSink;
use crate::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Callback receiving each entry of an archive in order
pub type EntryVisitor<'v> = dyn FnMut(Entry<'_>) -> Result<()> + 'v;

/// Trait for archive extractors
///
/// Implementations are stateless. All per-archive state (file handles,
/// decoders) lives inside a single [`Extractor::read_entries`] call and is
/// released when it returns, on success or failure.
pub trait Extractor: Send + Sync {
    /// Format handled by this extractor
    fn format(&self) -> ArchiveFormat;

    /// Open `source` and hand every entry to `visit`, in archive order
    ///
    /// An entry's content stream is only readable inside the visitor call
    /// that received it. An error from `visit` stops iteration and is returned.
    fn read_entries(&self, source: &Path, visit: &mut EntryVisitor<'_>) -> Result<()>;

    /// Entry names without reading any content
    fn list_entries(&self, source: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.read_entries(source, &mut |entry| {
            names.push(entry.name);
            Ok(())
        })?;
        Ok(names)
    }

    /// Extract `source` under `destination`
    ///
    /// Resolves the effective destination (see [`toplevel::resolve_destination`]),
    /// materializes every entry, then restores directory metadata. Metadata is
    /// restored even when an entry fails; the entry error wins.
    fn extract(
        &self,
        source: &Path,
        destination: &Path,
        options: &ExtractOptions,
        progress: &dyn ProgressSink,
    ) -> Result<ExtractStats> {
        let destination = if options.nest_loose_archives {
            toplevel::resolve_destination(self, source, destination)?
        } else {
            destination.to_path_buf()
        };

        fs::create_dir_all(&destination)
            .map_err(|e| Error::filesystem(&destination, "creating directory", e))?;

        debug!(source = ?source, destination = ?destination, format = %self.format(), "Extracting archive");

        let mut writer = EntryWriter::new(&destination, options)?;
        let result = self.read_entries(source, &mut |entry| {
            let name = entry.name.clone();
            let written = writer.materialize(entry)?;
            progress.entry_written(source, &name, written);
            Ok(())
        });
        let finished = writer.finish();

        result?;
        let stats = finished?;

        debug!(
            source = ?source,
            destination = ?destination,
            entries = stats.entries,
            bytes = stats.bytes_written,
            "Extracted archive"
        );
        Ok(stats)
    }
}
