//! Utility functions for xtract-core

use chrono::NaiveDate;
use filetime::FileTime;
use std::path::Path;

/// Archive base name up to its first dot (`bundle.tar.gz` -> `bundle`)
///
/// Dot-files keep their full name so the result is never empty.
pub fn archive_stem<P: AsRef<Path>>(path: P) -> String {
    let base = base_name(path.as_ref());
    match base.find('.') {
        Some(0) | None => base,
        Some(index) => base[..index].to_string(),
    }
}

/// Base name with its last extension removed (`notes.txt.gz` -> `notes.txt`)
pub fn strip_last_extension<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();
    match path.file_stem() {
        Some(stem) => stem.to_string_lossy().into_owned(),
        None => base_name(path),
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Calendar fields interpreted as UTC
pub fn civil_to_filetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
) -> Option<FileTime> {
    let timestamp = NaiveDate::from_ymd_opt(year, month, day)?
        .and_hms_opt(hour, minute, second)?
        .and_utc()
        .timestamp();
    Some(FileTime::from_unix_time(timestamp, 0))
}

/// MS-DOS packed date/time (date in the high 16 bits)
pub fn dos_to_filetime(dos: u32) -> Option<FileTime> {
    let date = dos >> 16;
    let time = dos & 0xffff;
    civil_to_filetime(
        1980 + (date >> 9) as i32,
        (date >> 5) & 0x0f,
        date & 0x1f,
        time >> 11,
        (time >> 5) & 0x3f,
        (time & 0x1f) * 2,
    )
}
