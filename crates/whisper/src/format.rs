//! On-disk format for whisper database files.
//!
//! A whisper file is a fixed-size, big-endian binary file that never grows
//! or shrinks after creation:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Metadata (16 bytes)                                        │
//! │  - Aggregation type: u32                                    │
//! │  - Max retention: u32 (seconds)                             │
//! │  - xFilesFactor: f32                                        │
//! │  - Archive count: u32                                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Archive descriptors (12 bytes each, finest first)          │
//! │  - Offset: u32, seconds per point: u32, points: u32         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Archive data regions (in descriptor order)                 │
//! │  - Ring of `points` 12-byte slots: (timestamp u32, f64)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each data region is a circular buffer indexed relative to its "base
//! interval", the timestamp stored in the region's first slot. A base of
//! zero means the archive has never been written, which is why creation
//! must leave every slot reading as zero.

use crate::aggregate::AggregationMethod;
use crate::error::{Result, WhisperError};
use crate::retention::ArchiveSpec;
use std::io::{self, Read, Write};

/// Size of the metadata block at the start of every file.
pub const METADATA_SIZE: usize = 16;

/// Size of one archive descriptor.
pub const ARCHIVE_INFO_SIZE: usize = 12;

/// Size of one stored point.
pub const POINT_SIZE: usize = 12;

/// Seconds-since-epoch timestamp as stored on disk.
pub type Timestamp = u32;

/// One `(timestamp, value)` sample in a fixed-size archive slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    /// Aligned timestamp of the slot; zero when the slot was never written.
    pub interval: Timestamp,
    /// Sample value.
    pub value: f64,
}

impl Point {
    /// Packs the point into its 12-byte big-endian on-disk form.
    pub fn to_bytes(&self) -> [u8; POINT_SIZE] {
        let mut buf = [0u8; POINT_SIZE];
        buf[0..4].copy_from_slice(&self.interval.to_be_bytes());
        buf[4..12].copy_from_slice(&self.value.to_be_bytes());
        buf
    }

    /// Unpacks a point from its big-endian on-disk form.
    ///
    /// Callers must supply at least [`POINT_SIZE`] bytes.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            interval: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            value: f64::from_be_bytes(buf[4..12].try_into().unwrap()),
        }
    }
}

/// Describes one archive: where its ring of slots lives and its resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveInfo {
    /// Byte offset of the archive's data region from the start of the file.
    pub offset: u32,
    /// Seconds covered by one point (the archive's precision).
    pub seconds_per_point: u32,
    /// Number of slots in the ring.
    pub points: u32,
}

impl ArchiveInfo {
    /// Time span the archive covers, in seconds.
    pub fn retention(&self) -> u32 {
        self.seconds_per_point * self.points
    }

    /// Size of the data region in bytes.
    pub fn size(&self) -> u32 {
        self.points * POINT_SIZE as u32
    }

    /// End byte offset (exclusive) of the data region.
    pub fn end(&self) -> u32 {
        self.offset + self.size()
    }

    /// Aligns a timestamp down to this archive's precision.
    pub fn interval(&self, timestamp: Timestamp) -> Timestamp {
        timestamp - timestamp % self.seconds_per_point
    }

    /// Byte offset of the slot holding `interval`, given the archive's
    /// current base interval.
    ///
    /// The distance from the base wraps around the ring, so intervals both
    /// before and after the base resolve to a slot. Callers must handle
    /// `base == 0` (an empty archive) themselves.
    pub fn slot_offset(&self, base: Timestamp, interval: Timestamp) -> u64 {
        let time_distance = i64::from(interval) - i64::from(base);
        let point_distance = time_distance / i64::from(self.seconds_per_point);
        let byte_distance = point_distance * POINT_SIZE as i64;
        u64::from(self.offset) + byte_distance.rem_euclid(i64::from(self.size())) as u64
    }

    /// Writes the descriptor in its big-endian on-disk form.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Offset (4 bytes)
        writer.write_all(&self.offset.to_be_bytes())?;
        // Seconds per point (4 bytes)
        writer.write_all(&self.seconds_per_point.to_be_bytes())?;
        // Points (4 bytes)
        writer.write_all(&self.points.to_be_bytes())?;
        Ok(())
    }

    /// Reads a descriptor from its big-endian on-disk form.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::CorruptWhisperFile` on a truncated descriptor.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; ARCHIVE_INFO_SIZE];
        read_exact_or_corrupt(reader, &mut buf, "archive descriptor")?;

        Ok(Self {
            offset: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            seconds_per_point: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            points: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
        })
    }
}

/// Parsed file header: the metadata block plus every archive descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// How propagated windows are folded into coarser archives.
    pub aggregation_method: AggregationMethod,
    /// Largest retention across all archives, in seconds.
    pub max_retention: u32,
    /// Minimum fraction of known slots required before an interval may be
    /// propagated into a coarser archive.
    pub x_files_factor: f32,
    /// Archive descriptors, finest precision first.
    pub archives: Vec<ArchiveInfo>,
}

impl Header {
    /// Computes the header and data-region layout for an archive spec list.
    ///
    /// `specs` must already be sorted finest precision first and validated.
    pub fn layout(
        specs: &[ArchiveSpec],
        x_files_factor: f32,
        aggregation_method: AggregationMethod,
    ) -> Self {
        let mut offset = (METADATA_SIZE + ARCHIVE_INFO_SIZE * specs.len()) as u32;
        let mut archives = Vec::with_capacity(specs.len());
        let mut max_retention = 0;

        for spec in specs {
            archives.push(ArchiveInfo {
                offset,
                seconds_per_point: spec.seconds_per_point,
                points: spec.points,
            });
            offset += spec.points * POINT_SIZE as u32;
            max_retention = max_retention.max(spec.retention());
        }

        Self {
            aggregation_method,
            max_retention,
            x_files_factor,
            archives,
        }
    }

    /// Size of the metadata block plus the descriptor table, in bytes.
    pub fn header_size(&self) -> usize {
        METADATA_SIZE + ARCHIVE_INFO_SIZE * self.archives.len()
    }

    /// Total file size implied by the descriptors.
    pub fn file_size(&self) -> u64 {
        self.archives
            .last()
            .map(|archive| u64::from(archive.end()))
            .unwrap_or(self.header_size() as u64)
    }

    /// Writes the 16-byte metadata block.
    pub fn write_metadata<W: Write>(&self, writer: &mut W) -> Result<()> {
        // Aggregation type (4 bytes)
        writer.write_all(&self.aggregation_method.as_type().to_be_bytes())?;
        // Max retention (4 bytes)
        writer.write_all(&self.max_retention.to_be_bytes())?;
        // xFilesFactor (4 bytes)
        writer.write_all(&self.x_files_factor.to_be_bytes())?;
        // Archive count (4 bytes)
        writer.write_all(&(self.archives.len() as u32).to_be_bytes())?;
        Ok(())
    }

    /// Writes the metadata block followed by every archive descriptor.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.write_metadata(writer)?;
        for archive in &self.archives {
            archive.write_to(writer)?;
        }
        Ok(())
    }

    /// Reads the metadata block and descriptor table.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::CorruptWhisperFile` if the metadata or any
    /// descriptor is truncated, or if the aggregation type is unknown.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; METADATA_SIZE];
        read_exact_or_corrupt(reader, &mut buf, "metadata")?;

        let aggregation_type = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let aggregation_method = AggregationMethod::from_type(aggregation_type).map_err(|_| {
            WhisperError::CorruptWhisperFile(format!(
                "unknown aggregation type {aggregation_type}"
            ))
        })?;
        let max_retention = u32::from_be_bytes(buf[4..8].try_into().unwrap());
        let x_files_factor = f32::from_be_bytes(buf[8..12].try_into().unwrap());
        let archive_count = u32::from_be_bytes(buf[12..16].try_into().unwrap());

        // The count comes straight from disk, so read descriptors one at a
        // time instead of preallocating from an untrusted length.
        let mut archives = Vec::new();
        for _ in 0..archive_count {
            archives.push(ArchiveInfo::read_from(reader)?);
        }

        Ok(Self {
            aggregation_method,
            max_retention,
            x_files_factor,
            archives,
        })
    }
}

/// Reads exactly `buf.len()` bytes, mapping a short read to
/// `CorruptWhisperFile` so truncated files are distinguishable from I/O
/// failures.
fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    reader.read_exact(buf).map_err(|err| match err.kind() {
        io::ErrorKind::UnexpectedEof => {
            WhisperError::CorruptWhisperFile(format!("truncated {what}"))
        }
        _ => WhisperError::Io(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Header {
        Header::layout(
            &[ArchiveSpec::new(1, 3600), ArchiveSpec::new(60, 10080)],
            0.5,
            AggregationMethod::Average,
        )
    }

    #[test]
    fn test_layout_offsets() {
        let header = sample_header();
        assert_eq!(header.header_size(), 16 + 2 * 12);
        assert_eq!(header.archives[0].offset, 40);
        assert_eq!(header.archives[1].offset, 40 + 3600 * 12);
        assert_eq!(header.max_retention, 60 * 10080);
        assert_eq!(
            header.file_size(),
            40 + 3600 * 12 + 10080 * 12
        );
    }

    #[test]
    fn test_header_round_trip() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len(), header.header_size());

        let decoded = Header::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_is_big_endian() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();

        // aggregation type 1 (average), network byte order
        assert_eq!(&buf[0..4], &[0, 0, 0, 1]);
        // archive count 2
        assert_eq!(&buf[12..16], &[0, 0, 0, 2]);
    }

    #[test]
    fn test_truncated_metadata_is_corrupt() {
        let err = Header::read_from(&mut &[0u8; 10][..]).unwrap_err();
        assert!(matches!(err, WhisperError::CorruptWhisperFile(_)));
    }

    #[test]
    fn test_truncated_descriptor_table_is_corrupt() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        buf.truncate(METADATA_SIZE + ARCHIVE_INFO_SIZE + 3);

        let err = Header::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, WhisperError::CorruptWhisperFile(_)));
    }

    #[test]
    fn test_unknown_aggregation_type_is_corrupt() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        buf[0..4].copy_from_slice(&99u32.to_be_bytes());

        let err = Header::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, WhisperError::CorruptWhisperFile(_)));
    }

    #[test]
    fn test_point_round_trip() {
        let point = Point {
            interval: 1_234_567_890,
            value: 42.5,
        };
        assert_eq!(Point::from_bytes(&point.to_bytes()), point);
    }

    #[test]
    fn test_interval_alignment() {
        let archive = ArchiveInfo {
            offset: 40,
            seconds_per_point: 60,
            points: 100,
        };
        assert_eq!(archive.interval(120), 120);
        assert_eq!(archive.interval(179), 120);
        assert_eq!(archive.interval(180), 180);
    }

    #[test]
    fn test_slot_offset_forward_and_wrapped() {
        let archive = ArchiveInfo {
            offset: 100,
            seconds_per_point: 10,
            points: 6,
        };
        let base = 1000;

        // the base interval occupies the first slot
        assert_eq!(archive.slot_offset(base, 1000), 100);
        assert_eq!(archive.slot_offset(base, 1010), 112);
        assert_eq!(archive.slot_offset(base, 1050), 160);
        // one full ring later the offsets repeat
        assert_eq!(archive.slot_offset(base, 1060), 100);
        // intervals before the base wrap backwards
        assert_eq!(archive.slot_offset(base, 990), 160);
    }
}
