//! Cross-file maintenance operations: merge and diff.
//!
//! Both walk the archives finest to coarsest and slice time so that each
//! tier only covers the span not already handled by a finer tier. For
//! merge this guarantees fine-grained data is never overwritten by a
//! coarser, lossy aggregate.

use crate::error::{Result, WhisperError};
use crate::file::{unix_now, WhisperFile};
use crate::format::Timestamp;
use tracing::debug;

/// One archive's differing points between two databases.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveDiff {
    /// Position of the archive in the descriptor table, finest first.
    pub archive: usize,
    /// Points whose values differ: `(timestamp, value in a, value in b)`.
    pub diffs: Vec<(Timestamp, Option<f64>, Option<f64>)>,
    /// Number of points compared in this archive's time slice.
    pub points: usize,
}

/// Copies every known point from `source` into `destination`.
///
/// Writes go through the batch write path, so propagation re-runs inside
/// the destination.
///
/// # Errors
///
/// Returns `WhisperError::InvalidConfiguration` when the two files do not
/// have identical archive layouts.
pub fn merge(source: &mut WhisperFile, destination: &mut WhisperFile) -> Result<()> {
    merge_at(source, destination, unix_now())
}

/// [`merge`] with an explicit current time.
pub fn merge_at(
    source: &mut WhisperFile,
    destination: &mut WhisperFile,
    now: Timestamp,
) -> Result<()> {
    check_layouts(source, destination, "merged")?;

    let archives = source.header().archives.clone();
    let mut until_time = now;
    for (index, archive) in archives.iter().enumerate() {
        // each tier only contributes the slice not covered by a finer one
        let from_time = now.saturating_sub(archive.retention());
        let data = source.archive_fetch(index, from_time, until_time)?;

        let mut to_write = Vec::new();
        let mut timestamp = data.from_interval;
        for value in &data.values {
            if let Some(value) = value {
                to_write.push((timestamp, *value));
            }
            timestamp += data.step;
        }

        debug!(archive = index, points = to_write.len(), "merging archive slice");
        if !to_write.is_empty() {
            destination.archive_update_many(index, &to_write)?;
        }
        until_time = from_time;
    }

    Ok(())
}

/// Compares two databases and reports differing points per archive.
///
/// With `ignore_empty`, only points known in both files are compared;
/// otherwise any point known in either file is compared and an unknown
/// side counts as a difference.
///
/// # Errors
///
/// Returns `WhisperError::InvalidConfiguration` when the two files do not
/// have identical archive layouts.
pub fn diff(
    a: &mut WhisperFile,
    b: &mut WhisperFile,
    ignore_empty: bool,
) -> Result<Vec<ArchiveDiff>> {
    diff_at(a, b, ignore_empty, unix_now())
}

/// [`diff`] with an explicit current time.
pub fn diff_at(
    a: &mut WhisperFile,
    b: &mut WhisperFile,
    ignore_empty: bool,
    now: Timestamp,
) -> Result<Vec<ArchiveDiff>> {
    check_layouts(a, b, "compared")?;

    let archives = a.header().archives.clone();
    let mut result = Vec::with_capacity(archives.len());
    let mut until_time = now;

    for (index, archive) in archives.iter().enumerate() {
        let from_time = now.saturating_sub(archive.retention());
        let data_a = a.archive_fetch(index, from_time, until_time)?;
        let data_b = b.archive_fetch(index, from_time, until_time)?;

        let mut diffs = Vec::new();
        let mut points = 0;
        let mut timestamp = data_a.from_interval;
        for (value_a, value_b) in data_a.values.iter().zip(&data_b.values) {
            let comparable = if ignore_empty {
                value_a.is_some() && value_b.is_some()
            } else {
                value_a.is_some() || value_b.is_some()
            };
            if comparable {
                points += 1;
                if value_a != value_b {
                    diffs.push((timestamp, *value_a, *value_b));
                }
            }
            timestamp += data_a.step;
        }

        result.push(ArchiveDiff {
            archive: index,
            diffs,
            points,
        });
        until_time = from_time;
    }

    Ok(result)
}

fn check_layouts(a: &WhisperFile, b: &WhisperFile, operation: &str) -> Result<()> {
    if a.header().archives != b.header().archives {
        return Err(WhisperError::InvalidConfiguration(format!(
            "{} and {} have different archive layouts and cannot be {operation}",
            a.path().display(),
            b.path().display()
        )));
    }
    Ok(())
}
