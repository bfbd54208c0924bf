//! Archive retention specifications and the `"precision:points"` mini-language.
//!
//! A retention definition like `"10s:6h"` describes one archive: a sample
//! every 10 seconds, kept for 6 hours. The points side may be given either
//! as an absolute count (`"60:1440"`) or as a duration that is divided by
//! the precision (`"1m:30d"`).

use crate::error::{Result, WhisperError};
use crate::format::{ARCHIVE_INFO_SIZE, METADATA_SIZE, POINT_SIZE};
use std::fmt;
use std::str::FromStr;

/// One archive's retention policy: a sampling precision and a point capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSpec {
    /// Seconds covered by one point (the archive's precision).
    pub seconds_per_point: u32,
    /// Number of points the archive holds.
    pub points: u32,
}

impl ArchiveSpec {
    /// Creates a new archive spec.
    pub fn new(seconds_per_point: u32, points: u32) -> Self {
        Self {
            seconds_per_point,
            points,
        }
    }

    /// Time span the archive covers, in seconds.
    pub fn retention(&self) -> u32 {
        self.seconds_per_point * self.points
    }
}

impl fmt::Display for ArchiveSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.seconds_per_point, self.points)
    }
}

/// Seconds per unit letter. A missing unit means seconds.
fn unit_multiplier(unit: &str) -> Result<u64> {
    match unit {
        "" | "s" => Ok(1),
        "m" => Ok(60),
        "h" => Ok(60 * 60),
        "d" => Ok(60 * 60 * 24),
        "w" => Ok(60 * 60 * 24 * 7),
        "y" => Ok(60 * 60 * 24 * 365),
        other => Err(WhisperError::InvalidConfiguration(format!(
            "invalid unit '{other}' in retention definition"
        ))),
    }
}

/// Splits a quantity like `"15m"` into its amount and unit suffix.
fn parse_quantity(text: &str) -> Result<(u64, &str)> {
    let split = text
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(text.len());
    let (digits, unit) = text.split_at(split);
    let amount = digits.parse::<u64>().map_err(|_| {
        WhisperError::InvalidConfiguration(format!("invalid quantity '{text}' in retention definition"))
    })?;
    Ok((amount, unit))
}

fn fits_u32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        WhisperError::InvalidConfiguration(format!("{what} {value} is out of range"))
    })
}

impl FromStr for ArchiveSpec {
    type Err = WhisperError;

    fn from_str(s: &str) -> Result<Self> {
        let (precision_text, points_text) = s.trim().split_once(':').ok_or_else(|| {
            WhisperError::InvalidConfiguration(format!(
                "invalid retention definition '{s}', expected '<precision>:<points>'"
            ))
        })?;

        let (amount, unit) = parse_quantity(precision_text)?;
        let seconds_per_point = amount * unit_multiplier(unit)?;
        if seconds_per_point == 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "invalid precision '{precision_text}', must be positive"
            )));
        }

        let (amount, unit) = parse_quantity(points_text)?;
        let points = if unit.is_empty() {
            amount
        } else {
            // a duration on the points side is converted to a point count
            amount * unit_multiplier(unit)? / seconds_per_point
        };
        if points == 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "invalid point count '{points_text}' for precision '{precision_text}'"
            )));
        }

        Ok(Self {
            seconds_per_point: fits_u32(seconds_per_point, "precision")?,
            points: fits_u32(points, "point count")?,
        })
    }
}

/// Validates an archive specification list against the format invariants.
///
/// The list is checked in ascending precision order (the order archives are
/// laid out on disk): no duplicate precisions, each precision must evenly
/// divide the next coarser one, retention must strictly increase, and each
/// archive needs enough points to consolidate one interval of the next tier.
/// Every retention, data region, and byte offset must also fit in the
/// format's 32-bit fields.
///
/// # Errors
///
/// Returns `WhisperError::InvalidConfiguration` describing the first
/// violated invariant.
pub fn validate_archive_specs(specs: &[ArchiveSpec]) -> Result<()> {
    if specs.is_empty() {
        return Err(WhisperError::InvalidConfiguration(
            "you must specify at least one archive configuration".to_string(),
        ));
    }

    let mut total_size = (METADATA_SIZE + ARCHIVE_INFO_SIZE * specs.len()) as u64;
    for spec in specs {
        if spec.seconds_per_point == 0 || spec.points == 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {spec} must have a positive precision and point count"
            )));
        }
        if spec.seconds_per_point.checked_mul(spec.points).is_none() {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {spec} covers more seconds than the format can represent"
            )));
        }
        total_size += u64::from(spec.points) * POINT_SIZE as u64;
    }
    // data-region offsets are stored as u32, so the whole file must fit
    if u32::try_from(total_size).is_err() {
        return Err(WhisperError::InvalidConfiguration(format!(
            "archives total {total_size} bytes, which exceeds the format's file size limit"
        )));
    }

    let mut sorted = specs.to_vec();
    sorted.sort_by_key(|spec| spec.seconds_per_point);

    for pair in sorted.windows(2) {
        let (archive, next) = (pair[0], pair[1]);

        if archive.seconds_per_point == next.seconds_per_point {
            return Err(WhisperError::InvalidConfiguration(format!(
                "two archives may not share the same precision ({archive}, {next})"
            )));
        }

        if next.seconds_per_point % archive.seconds_per_point != 0 {
            return Err(WhisperError::InvalidConfiguration(format!(
                "higher precision archives must evenly divide lower precision archives \
                 ({} does not divide {})",
                archive.seconds_per_point, next.seconds_per_point
            )));
        }

        if next.retention() <= archive.retention() {
            return Err(WhisperError::InvalidConfiguration(format!(
                "lower precision archives must cover larger time intervals \
                 ({} covers {}s, {} covers {}s)",
                next,
                next.retention(),
                archive,
                archive.retention()
            )));
        }

        let points_per_consolidation = next.seconds_per_point / archive.seconds_per_point;
        if archive.points < points_per_consolidation {
            return Err(WhisperError::InvalidConfiguration(format!(
                "archive {archive} has too few points to consolidate one interval of {next} \
                 (needs at least {points_per_consolidation})"
            )));
        }
    }

    Ok(())
}
