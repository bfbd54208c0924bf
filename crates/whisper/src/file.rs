//! Whisper database file handle: create, open, update, and fetch.
//!
//! A [`WhisperFile`] wraps one open file and performs every operation as a
//! sequence of blocking seek/read/write calls. The handle is strictly
//! single-threaded; concurrent writers to the same file must either enable
//! [`Options::lock`] or coordinate externally.

use crate::aggregate::AggregationMethod;
use crate::error::{Result, WhisperError};
use crate::format::{ArchiveInfo, Header, Point, Timestamp, METADATA_SIZE, POINT_SIZE};
use crate::retention::{validate_archive_specs, ArchiveSpec};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Chunk size for the explicit zero-fill allocation strategy.
const ZERO_CHUNK: usize = 16 * 1024;

/// How `create` reserves the archive data regions on disk.
///
/// Whatever the strategy, every slot must read as zero until first written,
/// since a zero timestamp is the empty-slot sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationStrategy {
    /// Explicitly writes zeroes in large chunks (the default; portable).
    #[default]
    ZeroFill,
    /// Extends the file with `set_len`, leaving a hole that reads as zero.
    Sparse,
    /// Reserves space with `posix_fallocate`. Most filesystems hand back
    /// zeroed extents but POSIX does not guarantee it; treat this as a
    /// filesystem-dependent fast path. Falls back to zero-fill where the
    /// call is unavailable or fails.
    Fallocate,
}

/// Per-handle behavior toggles.
#[derive(Debug, Clone, Copy, Default)]
pub struct Options {
    /// Hold an advisory exclusive lock on the file for the handle's
    /// lifetime (unix only; a no-op elsewhere).
    pub lock: bool,
    /// Flush and fsync after every mutating operation.
    pub flush: bool,
}

/// Settings for [`WhisperFile::create`].
#[derive(Debug, Clone, Copy)]
pub struct CreateOptions {
    /// Minimum fraction of known slots required before an interval is
    /// propagated into a coarser archive.
    pub x_files_factor: f32,
    /// Consolidation function for coarser archives.
    pub aggregation_method: AggregationMethod,
    /// How the data regions are reserved.
    pub strategy: AllocationStrategy,
    /// Handle options carried over to the returned file.
    pub options: Options,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            x_files_factor: 0.5,
            aggregation_method: AggregationMethod::Average,
            strategy: AllocationStrategy::ZeroFill,
            options: Options::default(),
        }
    }
}

/// The result of a fetch: an aligned time window and one optional value per
/// step.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchData {
    /// First interval in the window (inclusive).
    pub from_interval: Timestamp,
    /// End of the window (exclusive).
    pub until_interval: Timestamp,
    /// Seconds between consecutive entries.
    pub step: u32,
    /// One entry per step; `None` where no valid point was stored.
    pub values: Vec<Option<f64>>,
}

/// An open whisper database file.
#[derive(Debug)]
pub struct WhisperFile {
    file: File,
    path: PathBuf,
    header: Header,
    options: Options,
}

impl WhisperFile {
    /// Creates a new database file at `path` from an archive spec list.
    ///
    /// The specs are sorted by precision, validated, and laid out finest
    /// first. The data regions are reserved with the configured
    /// [`AllocationStrategy`].
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidConfiguration` for an invalid spec
    /// list, an out-of-range xFilesFactor, or a path that already exists.
    pub fn create(
        path: impl AsRef<Path>,
        specs: &[ArchiveSpec],
        create_options: CreateOptions,
    ) -> Result<Self> {
        let path = path.as_ref();

        if !(0.0..=1.0).contains(&create_options.x_files_factor) {
            return Err(WhisperError::InvalidConfiguration(format!(
                "xFilesFactor must be between 0 and 1, not {}",
                create_options.x_files_factor
            )));
        }

        let mut specs = specs.to_vec();
        specs.sort_by_key(|spec| spec.seconds_per_point);
        validate_archive_specs(&specs)?;

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(WhisperError::InvalidConfiguration(format!(
                    "file {} already exists",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };
        if create_options.options.lock {
            lock_exclusive(&file)?;
        }

        let header = Header::layout(
            &specs,
            create_options.x_files_factor,
            create_options.aggregation_method,
        );
        let mut this = Self {
            file,
            path: path.to_path_buf(),
            header,
            options: create_options.options,
        };

        let mut buf = Vec::with_capacity(this.header.header_size());
        this.header.write_to(&mut buf)?;
        this.file.write_all(&buf)?;
        this.allocate(create_options.strategy)?;
        this.maybe_flush()?;

        Ok(this)
    }

    /// Opens an existing database file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, Options::default())
    }

    /// Opens an existing database file with explicit handle options.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::CorruptWhisperFile` when the header or
    /// descriptor table cannot be read.
    pub fn open_with(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        if options.lock {
            lock_exclusive(&file)?;
        }
        let header = Header::read_from(&mut file)?;

        Ok(Self {
            file,
            path: path.to_path_buf(),
            header,
            options,
        })
    }

    /// The parsed header: aggregation method, retention, and descriptors.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Path this handle was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a single point, then propagates it into coarser archives.
    ///
    /// The point lands in the finest archive whose retention covers its
    /// age.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::TimestampNotCovered` when the timestamp is in
    /// the future or older than the maximum retention.
    pub fn update(&mut self, value: f64, timestamp: Timestamp) -> Result<()> {
        self.update_at(value, timestamp, unix_now())
    }

    /// [`WhisperFile::update`] with an explicit current time.
    pub fn update_at(&mut self, value: f64, timestamp: Timestamp, now: Timestamp) -> Result<()> {
        let age = i64::from(now) - i64::from(timestamp);
        if age < 0 || age >= i64::from(self.header.max_retention) {
            return Err(WhisperError::TimestampNotCovered(timestamp));
        }

        let index = self
            .header
            .archives
            .iter()
            .position(|archive| i64::from(archive.retention()) >= age)
            .ok_or(WhisperError::TimestampNotCovered(timestamp))?;
        let archive = self.header.archives[index];

        let interval = archive.interval(timestamp);
        let base = self.base_interval(&archive)?;
        let offset = if base == 0 {
            // first write to this archive establishes the base interval
            u64::from(archive.offset)
        } else {
            archive.slot_offset(base, interval)
        };
        self.write_point(offset, Point { interval, value })?;

        // roll the write down the chain of coarser archives until one
        // interval no longer has enough known data
        let mut higher = index;
        for lower in index + 1..self.header.archives.len() {
            if !self.propagate(interval, higher, lower)? {
                break;
            }
            higher = lower;
        }

        self.maybe_flush()
    }

    /// Writes a batch of `(timestamp, value)` points.
    ///
    /// Each point lands in the finest archive whose retention covers its
    /// age; points older than the coarsest archive are silently dropped.
    /// When several points align to the same slot, the one with the latest
    /// timestamp wins.
    pub fn update_many(&mut self, points: &[(Timestamp, f64)]) -> Result<()> {
        self.update_many_at(points, unix_now())
    }

    /// [`WhisperFile::update_many`] with an explicit current time.
    pub fn update_many_at(
        &mut self,
        points: &[(Timestamp, f64)],
        now: Timestamp,
    ) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        // newest first, so archives can be walked finest to coarsest while
        // points age out of each tier
        let mut points = points.to_vec();
        points.sort_by(|a, b| b.0.cmp(&a.0));

        let archives = self.header.archives.clone();
        let mut index = 0;
        let mut bucket: Vec<(Timestamp, f64)> = Vec::new();
        let mut dropped = 0;

        for (position, &(timestamp, value)) in points.iter().enumerate() {
            let age = i64::from(now) - i64::from(timestamp);
            while index < archives.len() && i64::from(archives[index].retention()) < age {
                if !bucket.is_empty() {
                    // flush the finished tier in chronological order
                    bucket.reverse();
                    self.archive_update_many(index, &bucket)?;
                    bucket.clear();
                }
                index += 1;
            }
            if index == archives.len() {
                // everything from here on is older than the coarsest archive
                dropped = points.len() - position;
                break;
            }
            bucket.push((timestamp, value));
        }

        if index < archives.len() && !bucket.is_empty() {
            bucket.reverse();
            self.archive_update_many(index, &bucket)?;
        }
        if dropped > 0 {
            debug!(dropped, "dropped batch points older than the coarsest archive");
        }

        self.maybe_flush()
    }

    /// Reads values over `[from_time, until_time]` (until defaults to now).
    ///
    /// The window is clamped to the retained period; a window entirely in
    /// the future or entirely aged out yields `Ok(None)`. The finest
    /// archive that covers the whole window serves the read.
    ///
    /// # Errors
    ///
    /// Returns `WhisperError::InvalidTimeInterval` when `from_time` is
    /// after `until_time`.
    pub fn fetch(
        &mut self,
        from_time: Timestamp,
        until_time: Option<Timestamp>,
    ) -> Result<Option<FetchData>> {
        self.fetch_at(from_time, until_time, unix_now())
    }

    /// [`WhisperFile::fetch`] with an explicit current time.
    pub fn fetch_at(
        &mut self,
        from_time: Timestamp,
        until_time: Option<Timestamp>,
        now: Timestamp,
    ) -> Result<Option<FetchData>> {
        let until_time = until_time.unwrap_or(now);
        if from_time > until_time {
            return Err(WhisperError::InvalidTimeInterval {
                from: from_time,
                until: until_time,
            });
        }

        let oldest = now.saturating_sub(self.header.max_retention);
        if from_time > now || until_time < oldest {
            return Ok(None);
        }
        let from_time = from_time.max(oldest);
        let until_time = until_time.min(now);

        let age = i64::from(now) - i64::from(from_time);
        let Some(index) = self
            .header
            .archives
            .iter()
            .position(|archive| i64::from(archive.retention()) >= age)
        else {
            return Ok(None);
        };

        self.archive_fetch(index, from_time, until_time).map(Some)
    }

    /// Changes the aggregation method (and optionally the xFilesFactor) in
    /// place.
    ///
    /// Only the metadata block is rewritten; archive data is untouched.
    /// Returns the previous method. Any [`crate::HeaderCache`] entry for
    /// this path must be invalidated by the caller.
    pub fn set_aggregation_method(
        &mut self,
        method: AggregationMethod,
        x_files_factor: Option<f32>,
    ) -> Result<AggregationMethod> {
        if let Some(xff) = x_files_factor {
            if !(0.0..=1.0).contains(&xff) {
                return Err(WhisperError::InvalidConfiguration(format!(
                    "xFilesFactor must be between 0 and 1, not {xff}"
                )));
            }
            self.header.x_files_factor = xff;
        }
        let previous = self.header.aggregation_method;
        self.header.aggregation_method = method;

        let mut buf = Vec::with_capacity(METADATA_SIZE);
        self.header.write_metadata(&mut buf)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        self.maybe_flush()?;

        Ok(previous)
    }

    /// Writes one bucket of chronological points into the archive at
    /// `index`, then propagates every touched coarser interval.
    ///
    /// Points aligning to the same slot collapse to the newest one, and
    /// runs of consecutive slots are written as single contiguous
    /// (wrap-split) sequences.
    pub(crate) fn archive_update_many(
        &mut self,
        index: usize,
        points: &[(Timestamp, f64)],
    ) -> Result<()> {
        let archive = self.header.archives[index];
        let step = archive.seconds_per_point;
        let aligned: Vec<(Timestamp, f64)> = points
            .iter()
            .map(|&(timestamp, value)| (archive.interval(timestamp), value))
            .collect();

        // pack maximal runs of consecutive slots into contiguous buffers
        let mut runs: Vec<(Timestamp, Vec<u8>)> = Vec::new();
        let mut current: Vec<u8> = Vec::new();
        let mut previous: Option<Timestamp> = None;
        for (position, &(interval, value)) in aligned.iter().enumerate() {
            // on a slot collision the newest point wins
            if aligned.get(position + 1).is_some_and(|next| next.0 == interval) {
                continue;
            }
            let packed = Point { interval, value }.to_bytes();
            match previous {
                Some(prev) if interval != prev + step => {
                    let run_points = (current.len() / POINT_SIZE) as u32;
                    let start = prev - step * (run_points - 1);
                    runs.push((start, std::mem::take(&mut current)));
                    current.extend_from_slice(&packed);
                }
                _ => current.extend_from_slice(&packed),
            }
            previous = Some(interval);
        }
        if let Some(prev) = previous {
            if !current.is_empty() {
                let run_points = (current.len() / POINT_SIZE) as u32;
                let start = prev - step * (run_points - 1);
                runs.push((start, current));
            }
        }

        let mut base = self.base_interval(&archive)?;
        if base == 0 {
            if let Some(&(start, _)) = runs.first() {
                base = start;
            }
        }
        for (start, bytes) in &runs {
            let offset = archive.slot_offset(base, *start);
            self.write_circular(&archive, offset, bytes)?;
        }

        // roll every touched coarser interval down the chain, stopping at
        // the first tier where nothing had enough known data
        let mut higher = index;
        for lower in index + 1..self.header.archives.len() {
            let lower_archive = self.header.archives[lower];
            let mut intervals: Vec<Timestamp> = aligned
                .iter()
                .map(|&(timestamp, _)| lower_archive.interval(timestamp))
                .collect();
            intervals.sort_unstable();
            intervals.dedup();

            let mut propagated = false;
            for interval in intervals {
                if self.propagate(interval, higher, lower)? {
                    propagated = true;
                }
            }
            if !propagated {
                break;
            }
            higher = lower;
        }

        Ok(())
    }

    /// Rolls one interval from the archive at `higher_idx` into the next
    /// coarser archive at `lower_idx`.
    ///
    /// Returns `Ok(true)` when an aggregate was written, so the caller can
    /// keep propagating into the next tier, and `Ok(false)` when the
    /// interval's known fraction fell below the xFilesFactor and the chain
    /// stops. Nothing is ever written on the failing side.
    fn propagate(
        &mut self,
        timestamp: Timestamp,
        higher_idx: usize,
        lower_idx: usize,
    ) -> Result<bool> {
        let higher = self.header.archives[higher_idx];
        let lower = self.header.archives[lower_idx];
        let interval_start = lower.interval(timestamp);

        let higher_base = self.base_interval(&higher)?;
        let first_offset = if higher_base == 0 {
            u64::from(higher.offset)
        } else {
            higher.slot_offset(higher_base, interval_start)
        };

        let slots = (lower.seconds_per_point / higher.seconds_per_point) as usize;
        let bytes = self.read_circular(&higher, first_offset, slots * POINT_SIZE)?;

        // a slot only counts when its stored timestamp matches the position
        // it would occupy in this window; anything else is stale
        let mut known = Vec::with_capacity(slots);
        let mut expected = interval_start;
        for chunk in bytes.chunks_exact(POINT_SIZE) {
            let point = Point::from_bytes(chunk);
            if point.interval == expected {
                known.push(point.value);
            }
            expected += higher.seconds_per_point;
        }

        let known_fraction = known.len() as f64 / slots as f64;
        if known_fraction < f64::from(self.header.x_files_factor) {
            return Ok(false);
        }
        let Some(value) = self.header.aggregation_method.apply(&known) else {
            // xFilesFactor of zero with an entirely unknown window
            return Ok(false);
        };

        let lower_base = self.base_interval(&lower)?;
        let offset = if lower_base == 0 {
            u64::from(lower.offset)
        } else {
            lower.slot_offset(lower_base, interval_start)
        };
        self.write_point(
            offset,
            Point {
                interval: interval_start,
                value,
            },
        )?;

        Ok(true)
    }

    /// Reads one archive's values over an unclamped window. Used directly
    /// by fetch and by the cross-file maintenance operations.
    pub(crate) fn archive_fetch(
        &mut self,
        index: usize,
        from_time: Timestamp,
        until_time: Timestamp,
    ) -> Result<FetchData> {
        let archive = self.header.archives[index];
        let step = archive.seconds_per_point;

        let from_interval = archive.interval(from_time) + step;
        let mut until_interval = archive.interval(until_time) + step;
        if from_interval == until_interval {
            // a zero-length window still yields one point
            until_interval += step;
        }
        let count = ((until_interval - from_interval) / step) as usize;

        let base = self.base_interval(&archive)?;
        if base == 0 {
            // never written; the whole window is unknown
            return Ok(FetchData {
                from_interval,
                until_interval,
                step,
                values: vec![None; count],
            });
        }

        let from_offset = archive.slot_offset(base, from_interval);
        let until_offset = archive.slot_offset(base, until_interval);
        let rel_from = from_offset - u64::from(archive.offset);
        let rel_until = until_offset - u64::from(archive.offset);
        // equal offsets mean the window spans the whole ring, not nothing
        let len = if rel_until > rel_from {
            (rel_until - rel_from) as usize
        } else {
            (u64::from(archive.size()) - rel_from + rel_until) as usize
        };
        let bytes = self.read_circular(&archive, from_offset, len)?;

        let mut values = vec![None; count];
        for (slot, chunk) in bytes.chunks_exact(POINT_SIZE).enumerate() {
            let point = Point::from_bytes(chunk);
            if point.interval == from_interval + slot as u32 * step {
                values[slot] = Some(point.value);
            }
        }

        Ok(FetchData {
            from_interval,
            until_interval,
            step,
            values,
        })
    }

    /// Reads the archive's base interval: the timestamp in its first slot.
    fn base_interval(&mut self, archive: &ArchiveInfo) -> Result<Timestamp> {
        Ok(self.read_point(u64::from(archive.offset))?.interval)
    }

    fn read_point(&mut self, offset: u64) -> Result<Point> {
        let mut buf = [0u8; POINT_SIZE];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(Point::from_bytes(&buf))
    }

    fn write_point(&mut self, offset: u64, point: Point) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&point.to_bytes())?;
        Ok(())
    }

    /// Reads `len` bytes starting at `offset` inside `archive`'s ring,
    /// splitting into tail-then-head reads when the range wraps.
    fn read_circular(
        &mut self,
        archive: &ArchiveInfo,
        offset: u64,
        len: usize,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        let until_end = (u64::from(archive.end()) - offset) as usize;

        self.file.seek(SeekFrom::Start(offset))?;
        if len <= until_end {
            self.file.read_exact(&mut buf)?;
        } else {
            self.file.read_exact(&mut buf[..until_end])?;
            self.file.seek(SeekFrom::Start(u64::from(archive.offset)))?;
            self.file.read_exact(&mut buf[until_end..])?;
        }
        Ok(buf)
    }

    /// Writes `bytes` starting at `offset` inside `archive`'s ring,
    /// splitting into tail-then-head writes when the range wraps.
    fn write_circular(
        &mut self,
        archive: &ArchiveInfo,
        offset: u64,
        bytes: &[u8],
    ) -> Result<()> {
        let until_end = (u64::from(archive.end()) - offset) as usize;

        self.file.seek(SeekFrom::Start(offset))?;
        if bytes.len() <= until_end {
            self.file.write_all(bytes)?;
        } else {
            self.file.write_all(&bytes[..until_end])?;
            self.file.seek(SeekFrom::Start(u64::from(archive.offset)))?;
            self.file.write_all(&bytes[until_end..])?;
        }
        Ok(())
    }

    /// Reserves the data regions after the descriptor table was written.
    fn allocate(&mut self, strategy: AllocationStrategy) -> Result<()> {
        let header_size = self.header.header_size() as u64;
        let total = self.header.file_size();
        let remaining = total - header_size;
        if remaining == 0 {
            return Ok(());
        }

        match strategy {
            AllocationStrategy::Sparse => self.file.set_len(total)?,
            AllocationStrategy::Fallocate => {
                if let Err(err) = fallocate(&self.file, header_size, remaining) {
                    debug!(error = %err, "posix_fallocate unavailable, falling back to zero fill");
                    self.zero_fill(remaining)?;
                }
            }
            AllocationStrategy::ZeroFill => self.zero_fill(remaining)?,
        }
        Ok(())
    }

    /// Writes `remaining` zero bytes from the current file position.
    fn zero_fill(&mut self, mut remaining: u64) -> Result<()> {
        let chunk = [0u8; ZERO_CHUNK];
        while remaining > chunk.len() as u64 {
            self.file.write_all(&chunk)?;
            remaining -= chunk.len() as u64;
        }
        self.file.write_all(&chunk[..remaining as usize])?;
        Ok(())
    }

    fn maybe_flush(&mut self) -> Result<()> {
        if self.options.flush {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl Drop for WhisperFile {
    fn drop(&mut self) {
        if self.options.lock {
            unlock(&self.file);
        }
    }
}

/// Reads and returns the header of the database at `path`.
pub fn info(path: impl AsRef<Path>) -> Result<Header> {
    let mut file = File::open(path.as_ref())?;
    Header::read_from(&mut file)
}

pub(crate) fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as Timestamp)
        .unwrap_or(0)
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> Result<()> {
    use std::os::fd::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
    if rc != 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::fd::AsRawFd;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
    if rc != 0 {
        debug!(error = %io::Error::last_os_error(), "failed to release file lock");
    }
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

#[cfg(target_os = "linux")]
fn fallocate(file: &File, offset: u64, len: u64) -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let rc = unsafe {
        libc::posix_fallocate(file.as_raw_fd(), offset as libc::off_t, len as libc::off_t)
    };
    if rc != 0 {
        return Err(io::Error::from_raw_os_error(rc));
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn fallocate(_file: &File, _offset: u64, _len: u64) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "posix_fallocate is only used on linux",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_rejects_existing_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metric.wsp");
        let specs = [ArchiveSpec::new(60, 60)];

        WhisperFile::create(&path, &specs, CreateOptions::default()).unwrap();
        let err = WhisperFile::create(&path, &specs, CreateOptions::default()).unwrap_err();
        assert!(matches!(err, WhisperError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_create_rejects_bad_x_files_factor() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metric.wsp");
        let err = WhisperFile::create(
            &path,
            &[ArchiveSpec::new(60, 60)],
            CreateOptions {
                x_files_factor: 1.5,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, WhisperError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_create_sorts_specs_finest_first() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metric.wsp");
        let specs = [ArchiveSpec::new(60, 1440), ArchiveSpec::new(1, 3600)];

        let db = WhisperFile::create(&path, &specs, CreateOptions::default()).unwrap();
        assert_eq!(db.header().archives[0].seconds_per_point, 1);
        assert_eq!(db.header().archives[1].seconds_per_point, 60);
    }

    #[test]
    fn test_allocation_strategies_leave_slots_zeroed() {
        let temp_dir = TempDir::new().unwrap();
        let specs = [ArchiveSpec::new(1, 100)];
        let now = 1_700_000_000;

        for (name, strategy) in [
            ("zero.wsp", AllocationStrategy::ZeroFill),
            ("sparse.wsp", AllocationStrategy::Sparse),
            ("fallocate.wsp", AllocationStrategy::Fallocate),
        ] {
            let path = temp_dir.path().join(name);
            let mut db = WhisperFile::create(
                &path,
                &specs,
                CreateOptions {
                    strategy,
                    ..Default::default()
                },
            )
            .unwrap();

            let expected = std::fs::metadata(&path).unwrap().len();
            assert_eq!(expected, db.header().file_size(), "{name}");

            let data = db.fetch_at(now - 50, None, now).unwrap().unwrap();
            assert!(data.values.iter().all(Option::is_none), "{name}");
        }
    }

    #[test]
    fn test_open_truncated_file_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metric.wsp");
        std::fs::write(&path, [0u8; 10]).unwrap();

        let err = WhisperFile::open(&path).unwrap_err();
        assert!(matches!(err, WhisperError::CorruptWhisperFile(_)));
    }

    #[test]
    fn test_locked_handle_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("metric.wsp");
        let now = 1_700_000_000;

        let mut db = WhisperFile::create(
            &path,
            &[ArchiveSpec::new(1, 60)],
            CreateOptions {
                options: Options {
                    lock: true,
                    flush: true,
                },
                ..Default::default()
            },
        )
        .unwrap();
        db.update_at(1.5, now - 1, now).unwrap();
        drop(db);

        let mut db = WhisperFile::open(&path).unwrap();
        let data = db.fetch_at(now - 10, None, now).unwrap().unwrap();
        assert!(data.values.contains(&Some(1.5)));
    }
}
