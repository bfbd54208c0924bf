//! Error and Result types for whisper database operations.

use std::io;
use thiserror::Error;

/// A convenience `Result` type for whisper operations.
pub type Result<T> = std::result::Result<T, WhisperError>;

/// The error type for whisper database operations.
#[derive(Debug, Error)]
pub enum WhisperError {
    /// Bad archive configuration or a target path that already exists,
    /// detected at create time.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Unknown aggregation method name or on-disk type code.
    #[error("Unrecognized aggregation method: {0}")]
    InvalidAggregationMethod(String),

    /// A fetch window whose start is after its end.
    #[error("Invalid time interval: from time {from} is after until time {until}")]
    InvalidTimeInterval {
        /// Requested window start.
        from: u32,
        /// Requested window end.
        until: u32,
    },

    /// A point's timestamp is in the future or older than the maximum
    /// retention, so no archive can hold it.
    #[error("Timestamp not covered by any archives in this database: {0}")]
    TimestampNotCovered(u32),

    /// The header or descriptor table could not be read.
    #[error("Corrupt whisper file: {0}")]
    CorruptWhisperFile(String),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
