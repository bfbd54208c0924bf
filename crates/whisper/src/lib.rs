//! Whisper - fixed-size round-robin time-series database files.
//!
//! Each database file holds one metric as an ordered set of fixed-capacity
//! archives at different resolutions (say one sample per second for an
//! hour, one per minute for a week). Writes land in the highest-resolution
//! archive and are consolidated into coarser archives whenever enough of a
//! coarse interval's slots are known. Files are created once and then
//! mutated in place for their whole lifetime; they never grow or shrink.
//!
//! # Components
//!
//! - [`WhisperFile`]: create / update / fetch on one database file
//! - [`ArchiveSpec`]: the `"precision:points"` retention mini-language
//! - [`AggregationMethod`]: consolidation functions
//! - [`merge`] / [`diff`]: cross-file maintenance
//! - [`HeaderCache`]: caller-owned read-through header cache
//!
//! # Example
//!
//! ```rust,ignore
//! use whisper::{ArchiveSpec, CreateOptions, WhisperFile};
//!
//! let specs: Vec<ArchiveSpec> = vec!["1s:1h".parse()?, "1m:7d".parse()?];
//! let mut db = WhisperFile::create("cpu.wsp", &specs, CreateOptions::default())?;
//!
//! db.update(0.75, timestamp)?;
//! if let Some(data) = db.fetch(timestamp - 300, None)? {
//!     for value in &data.values {
//!         // `None` marks intervals with no stored sample
//!     }
//! }
//! ```

#![deny(missing_docs)]

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod file;
pub mod format;
pub mod ops;
pub mod retention;

pub use aggregate::{aggregate, AggregationMethod};
pub use cache::HeaderCache;
pub use error::{Result, WhisperError};
pub use file::{info, AllocationStrategy, CreateOptions, FetchData, Options, WhisperFile};
pub use format::{ArchiveInfo, Header, Point, Timestamp};
pub use ops::{diff, diff_at, merge, merge_at, ArchiveDiff};
pub use retention::{validate_archive_specs, ArchiveSpec};
