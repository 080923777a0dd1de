//! Configuration records for opening a database, reading, and writing.
//!
//! Options are plain values: each call copies what it needs, so mutating an
//! `Options` after handing it to [`crate::DB::open`] never affects the open
//! database. Pluggable objects are shared through `Arc` and live as long as
//! the longest holder.

use std::fmt;
use std::sync::Arc;

use crate::bloom::FilterPolicy;
use crate::cache::Cache;
use crate::comparator::{BytewiseComparator, Comparator};
use crate::db::Snapshot;
use crate::env::{DefaultEnv, Env};
use crate::status::{Result, Status};

/// Per-block compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    None = 0,
    #[default]
    Snappy = 1,
}

impl Compression {
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Snappy),
            _ => Err(Status::corruption(format!("unknown compression type: {byte}"))),
        }
    }
}

/// Options controlling how a database is opened and how it stores data.
#[derive(Clone)]
pub struct Options {
    /// Create the database if it is missing.
    pub create_if_missing: bool,
    /// Fail if the database already exists.
    pub error_if_exists: bool,
    /// Verify every block read and refuse to open over a damaged log.
    pub paranoid_checks: bool,
    /// Bytes buffered in the memtable before it is flushed to a table.
    pub write_buffer_size: usize,
    pub max_open_files: usize,
    /// Approximate uncompressed size of a table data block.
    pub block_size: usize,
    pub compression: Compression,
    pub cache: Option<Arc<Cache>>,
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
    pub env: Arc<dyn Env>,
    pub comparator: Arc<dyn Comparator>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            create_if_missing: false,
            error_if_exists: false,
            paranoid_checks: false,
            write_buffer_size: 4 * 1024 * 1024,
            max_open_files: 1000,
            block_size: 4 * 1024,
            compression: Compression::Snappy,
            cache: None,
            filter_policy: None,
            env: Arc::new(DefaultEnv),
            comparator: Arc::new(BytewiseComparator),
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_create_if_missing(&mut self, yes: bool) -> &mut Self {
        self.create_if_missing = yes;
        self
    }

    pub fn set_error_if_exists(&mut self, yes: bool) -> &mut Self {
        self.error_if_exists = yes;
        self
    }

    pub fn set_paranoid_checks(&mut self, yes: bool) -> &mut Self {
        self.paranoid_checks = yes;
        self
    }

    pub fn set_write_buffer_size(&mut self, bytes: usize) -> &mut Self {
        self.write_buffer_size = bytes;
        self
    }

    pub fn set_max_open_files(&mut self, n: usize) -> &mut Self {
        self.max_open_files = n;
        self
    }

    pub fn set_block_size(&mut self, bytes: usize) -> &mut Self {
        self.block_size = bytes;
        self
    }

    pub fn set_compression(&mut self, compression: Compression) -> &mut Self {
        self.compression = compression;
        self
    }

    /// Share a block cache. `None` disables block caching.
    pub fn set_cache(&mut self, cache: Option<Arc<Cache>>) -> &mut Self {
        self.cache = cache;
        self
    }

    pub fn set_filter_policy(&mut self, policy: Option<Arc<dyn FilterPolicy>>) -> &mut Self {
        self.filter_policy = policy;
        self
    }

    pub fn set_env(&mut self, env: Arc<dyn Env>) -> &mut Self {
        self.env = env;
        self
    }

    /// The comparator must order keys the same way every time a database
    /// is opened; its name is recorded and checked.
    pub fn set_comparator(&mut self, comparator: Arc<dyn Comparator>) -> &mut Self {
        self.comparator = comparator;
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.write_buffer_size == 0 {
            return Err(Status::InvalidArgument("write_buffer_size must be positive".into()));
        }
        if self.block_size == 0 {
            return Err(Status::InvalidArgument("block_size must be positive".into()));
        }
        if self.max_open_files < 10 {
            return Err(Status::InvalidArgument(format!(
                "max_open_files must be at least 10, got {}",
                self.max_open_files
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("create_if_missing", &self.create_if_missing)
            .field("error_if_exists", &self.error_if_exists)
            .field("paranoid_checks", &self.paranoid_checks)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("max_open_files", &self.max_open_files)
            .field("block_size", &self.block_size)
            .field("compression", &self.compression)
            .field("cache", &self.cache)
            .field("filter_policy", &self.filter_policy.as_ref().map(|p| p.name().to_string()))
            .field("comparator", &self.comparator.name())
            .finish()
    }
}

/// Options for a single read or iterator.
///
/// The snapshot is borrowed, so neither these options nor an iterator built
/// from them can outlive it.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions<'a> {
    /// Verify block checksums on every read.
    pub verify_checksums: bool,
    /// Insert blocks read from disk into the cache.
    pub fill_cache: bool,
    /// Read as of this snapshot instead of the latest state.
    pub snapshot: Option<&'a Snapshot>,
}

impl Default for ReadOptions<'_> {
    fn default() -> Self {
        ReadOptions {
            verify_checksums: false,
            fill_cache: true,
            snapshot: None,
        }
    }
}

impl<'a> ReadOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_verify_checksums(&mut self, yes: bool) -> &mut Self {
        self.verify_checksums = yes;
        self
    }

    pub fn set_fill_cache(&mut self, yes: bool) -> &mut Self {
        self.fill_cache = yes;
        self
    }

    pub fn set_snapshot(&mut self, snapshot: Option<&'a Snapshot>) -> &mut Self {
        self.snapshot = snapshot;
        self
    }
}

/// Options for a single write.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Fsync the log before the write returns.
    pub sync: bool,
}

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sync(&mut self, yes: bool) -> &mut Self {
        self.sync = yes;
        self
    }
}
