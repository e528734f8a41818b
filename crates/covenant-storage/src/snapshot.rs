//! Full-cache disk snapshot
//!
//! One row per entry:
//!
//! ```text
//! <timestamp><col><height><col><section>;<key><col><value><row>
//! ```
//!
//! Rows are separated by a newline after the row marker. Loading splits on the
//! same markers and skips any row that does not have all four columns, so a
//! truncated file loses only its damaged tail.

use crate::cache::{KeyCase, KeyedCache};
use crate::error::{Result, StorageError};
use covenant_core::Height;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

const COL: &str = "<colcache>";
const ROW: &str = "<rowcache>";

/// Outcome of loading a snapshot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Rows restored into the cache
    pub rows: usize,
    /// Rows skipped as malformed
    pub skipped: usize,
    /// Highest height recorded in the file
    pub height: Height,
}

/// Write every non-empty entry to `path`, tagged with `height`.
///
/// The file is written next to its destination and renamed into place.
pub fn save_snapshot(cache: &dyn KeyedCache, path: &Path, height: Height) -> Result<usize> {
    let file_name = path
        .file_name()
        .ok_or_else(|| StorageError::InvalidPath(path.display().to_string()))?;
    let staging = path.with_file_name(format!("{}.tmp", file_name.to_string_lossy()));

    let mut rows = 0usize;
    {
        let mut out = std::io::BufWriter::new(fs::File::create(&staging)?);
        for (section, key, entry) in cache.entries() {
            if entry.value.is_empty() {
                continue;
            }
            writeln!(
                out,
                "{}{COL}{}{COL}{};{}{COL}{}{ROW}",
                entry.timestamp, height, section, key, entry.value
            )?;
            rows += 1;
        }
        out.flush()?;
    }
    fs::rename(&staging, path)?;

    info!(rows, height, path = %path.display(), "Cache snapshot written");
    Ok(rows)
}

/// Restore rows from `path` into `cache`. `Ok(None)` when no snapshot exists.
pub fn load_snapshot(cache: &dyn KeyedCache, path: &Path) -> Result<Option<SnapshotSummary>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No cache snapshot");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let mut summary = SnapshotSummary {
        rows: 0,
        skipped: 0,
        height: 0,
    };

    for raw in text.split(ROW) {
        let row = raw.trim_start_matches(['\r', '\n']);
        if row.trim().is_empty() {
            continue;
        }
        match parse_row(row) {
            Some((timestamp, height, section, key, value)) => {
                summary.height = summary.height.max(height);
                cache.write(section, key, value, timestamp, KeyCase::Sensitive);
                summary.rows += 1;
            }
            None => summary.skipped += 1,
        }
    }

    if summary.skipped > 0 {
        warn!(skipped = summary.skipped, path = %path.display(), "Skipped malformed snapshot rows");
    }
    info!(rows = summary.rows, height = summary.height, "Cache snapshot loaded");
    Ok(Some(summary))
}

fn parse_row(row: &str) -> Option<(i64, Height, &str, &str, &str)> {
    let mut cols = row.splitn(4, COL);
    let timestamp = cols.next()?.trim().parse::<i64>().ok()?;
    let height = cols.next()?.trim().parse::<Height>().ok()?;
    let (section, key) = cols.next()?.split_once(';')?;
    let value = cols.next()?;
    if section.is_empty() || key.is_empty() || value.is_empty() || value.contains(COL) {
        return None;
    }
    Some((timestamp, height, section, key, value))
}
