//! Top-level directory resolution
//!
//! An archive whose entries all live under one top-level directory is
//! extracted straight into the destination. Anything else would scatter files
//! across the destination, so it gets a directory named after the archive.

use super::extractor::Extractor;
use crate::utils::archive_stem;
use crate::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// First path segment of an entry name
///
/// Backslashes count as separators and leading `/` or `./` are ignored.
/// Returns `None` for names that refer to the archive root itself.
pub fn top_level_component(name: &str) -> Option<String> {
    let normalized = name.replace('\\', "/");
    normalized
        .split('/')
        .find(|segment| !segment.is_empty() && *segment != ".")
        .map(str::to_string)
}

/// True when at least two entries disagree on their top-level segment
pub fn has_multiple_top_levels<I, S>(names: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut first: Option<String> = None;
    for name in names {
        let Some(top) = top_level_component(name.as_ref()) else {
            continue;
        };
        match &first {
            None => first = Some(top),
            Some(existing) if *existing != top => return true,
            Some(_) => {}
        }
    }
    false
}

/// Effective destination for `source`
///
/// Runs a listing pass over the archive. Loose archives resolve to
/// `destination/<archive name up to the first dot>`.
pub fn resolve_destination<E: Extractor + ?Sized>(
    extractor: &E,
    source: &Path,
    destination: &Path,
) -> Result<PathBuf> {
    let names = extractor.list_entries(source)?;

    if !has_multiple_top_levels(&names) {
        return Ok(destination.to_path_buf());
    }

    let nested = destination.join(archive_stem(source));
    debug!(source = ?source, destination = ?nested, entries = names.len(), "Archive has several top-level entries");
    Ok(nested)
}
