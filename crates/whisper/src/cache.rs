//! Caller-owned read-through cache of parsed file headers.
//!
//! Header parsing is cheap but not free, and tooling that walks thousands
//! of database files tends to read the same headers repeatedly. The cache
//! is deliberately explicit state owned by the caller rather than a
//! process-wide global: whoever rewrites a header knows to invalidate it.

use crate::error::Result;
use crate::format::Header;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// A read-through map from file path to parsed [`Header`].
#[derive(Debug, Default)]
pub struct HeaderCache {
    headers: HashMap<PathBuf, Header>,
}

impl HeaderCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the header for `path`, reading and caching it on a miss.
    ///
    /// # Errors
    ///
    /// Propagates open and parse errors; nothing is cached on failure.
    pub fn get_or_read(&mut self, path: &Path) -> Result<&Header> {
        match self.headers.entry(path.to_path_buf()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let mut file = File::open(path)?;
                let header = Header::read_from(&mut file)?;
                Ok(entry.insert(header))
            }
        }
    }

    /// Drops the cached header for `path`.
    ///
    /// Must be called after any operation that rewrites the header, such as
    /// [`crate::WhisperFile::set_aggregation_method`].
    pub fn invalidate(&mut self, path: &Path) {
        self.headers.remove(path);
    }

    /// Drops every cached header.
    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Number of cached headers.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }
}
