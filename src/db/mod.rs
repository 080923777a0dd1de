//! Database handle.
//!
//! A [`DB`] owns one open engine. Closing it tombstones the handle: every
//! later call fails with [`Error::ClosedHandle`] instead of touching freed
//! state. Snapshots and iterators count as dependents and must be released
//! before the handle can close.

pub mod iterator;
pub mod snapshot;

pub use iterator::{DbIterator, IterState};
pub use snapshot::Snapshot;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::batch::WriteBatch;
use crate::engine::{self, Engine, repair};
use crate::error::{Error, Result};
use crate::options::{Options, ReadOptions, WriteOptions};
use crate::types::SequenceNumber;

static NEXT_DB_ID: AtomicU64 = AtomicU64::new(1);

/// Half-open key range `[start, limit)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start: Vec<u8>,
    pub limit: Vec<u8>,
}

impl Range {
    pub fn new(start: impl AsRef<[u8]>, limit: impl AsRef<[u8]>) -> Self {
        Range {
            start: start.as_ref().to_vec(),
            limit: limit.as_ref().to_vec(),
        }
    }
}

/// State shared by a handle and its snapshots and iterators.
pub(crate) struct DbShared {
    id: u64,
    path: PathBuf,
    engine: RwLock<Option<Engine>>,
    live_iterators: AtomicUsize,
}

impl DbShared {
    /// Run `f` against the open engine; the handle cannot close meanwhile.
    fn with_engine<T>(&self, f: impl FnOnce(&Engine) -> Result<T>) -> Result<T> {
        match self.engine.read().as_ref() {
            Some(engine) => f(engine),
            None => Err(Error::ClosedHandle("database")),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn release_snapshot(&self, sequence: SequenceNumber) {
        if let Some(engine) = self.engine.read().as_ref() {
            engine.release_snapshot(sequence);
        }
    }

    pub(crate) fn iterator_dropped(&self) {
        self.live_iterators.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle to an open database.
///
/// `DB` is `Send + Sync`: share it between threads by reference or `Arc`.
/// Concurrent reads and writes are serialized inside the engine.
pub struct DB {
    shared: Arc<DbShared>,
}

impl DB {
    /// Open the database at `path`.
    ///
    /// Fails with [`Error::Open`] if the database is missing (and
    /// `create_if_missing` is off), exists (and `error_if_exists` is on),
    /// is already open, is damaged, or the options are rejected.
    pub fn open(path: impl AsRef<Path>, options: &Options) -> Result<DB> {
        let path = path.as_ref();
        let engine = Engine::open(path, options).map_err(|status| Error::open(path, status))?;
        Ok(DB {
            shared: Arc::new(DbShared {
                id: NEXT_DB_ID.fetch_add(1, Ordering::Relaxed),
                path: path.to_path_buf(),
                engine: RwLock::new(Some(engine)),
                live_iterators: AtomicUsize::new(0),
            }),
        })
    }

    /// Close the handle. Closing twice is fine.
    ///
    /// Fails with [`Error::Lifecycle`] while snapshots or iterators created
    /// from this handle are alive; the handle then stays open.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.shared.engine.write();
        let Some(engine) = guard.as_ref() else {
            return Ok(());
        };
        let snapshots = engine.live_snapshots();
        let iterators = self.shared.live_iterators.load(Ordering::Acquire);
        if snapshots > 0 || iterators > 0 {
            tracing::debug!(snapshots, iterators, "close refused while dependents are live");
            return Err(Error::Lifecycle(format!(
                "cannot close database with {snapshots} live snapshot(s) and {iterators} live iterator(s)"
            )));
        }
        match guard.take() {
            Some(engine) => engine.close().map_err(Error::from),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.engine.read().is_none()
    }

    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Set `key` to `value`. Both are copied before the call returns.
    pub fn put(&self, options: &WriteOptions, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.put(key, value);
        self.write(options, &batch)
    }

    /// Remove `key`. Removing an absent key is not an error.
    pub fn delete(&self, options: &WriteOptions, key: impl AsRef<[u8]>) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(key);
        self.write(options, &batch)
    }

    /// Apply every entry of `batch`, in order, as one atomic update.
    pub fn write(&self, options: &WriteOptions, batch: &WriteBatch) -> Result<()> {
        self.shared
            .with_engine(|engine| engine.write(batch, options.sync).map_err(Error::from))
    }

    /// Look up `key`. `Ok(None)` means not found; an empty value is
    /// `Ok(Some(vec![]))`.
    pub fn get(&self, options: &ReadOptions<'_>, key: impl AsRef<[u8]>) -> Result<Option<Vec<u8>>> {
        self.shared.with_engine(|engine| {
            let sequence = self.resolve_snapshot(options)?;
            let block_opts = engine.block_read_options(options.verify_checksums, options.fill_cache);
            engine
                .get(key.as_ref(), sequence, block_opts)
                .map_err(Error::from)
        })
    }

    /// Create an unpositioned iterator. It sees the state as of this call,
    /// or as of `options.snapshot`.
    pub fn new_iterator<'a>(&self, options: &ReadOptions<'a>) -> Result<DbIterator<'a>> {
        self.shared.with_engine(|engine| {
            let sequence = self.resolve_snapshot(options)?;
            let block_opts = engine.block_read_options(options.verify_checksums, options.fill_cache);
            let inner = engine.new_iterator(sequence, block_opts);
            self.shared.live_iterators.fetch_add(1, Ordering::AcqRel);
            Ok(DbIterator::new(inner, Arc::clone(&self.shared)))
        })
    }

    /// Pin the current state. Released by [`DB::release_snapshot`] or drop.
    pub fn new_snapshot(&self) -> Result<Snapshot> {
        self.shared.with_engine(|engine| {
            let sequence = engine.new_snapshot();
            Ok(Snapshot::new(Arc::clone(&self.shared), sequence))
        })
    }

    /// Release a snapshot. Fails with [`Error::Lifecycle`] if it was created
    /// by another database (it is still released from that one).
    pub fn release_snapshot(&self, snapshot: Snapshot) -> Result<()> {
        if snapshot.db_id() != self.shared.id {
            return Err(Error::Lifecycle(
                "snapshot was created by a different database".to_string(),
            ));
        }
        if self.is_closed() {
            return Err(Error::ClosedHandle("database"));
        }
        drop(snapshot);
        Ok(())
    }

    /// Estimated on-disk bytes for each range. Data still in the memtable
    /// is not counted.
    pub fn approximate_sizes(&self, ranges: &[Range]) -> Result<Vec<u64>> {
        self.shared
            .with_engine(|engine| Ok(engine.approximate_sizes(ranges)))
    }

    /// Flush buffered writes and merge the stored tables, discarding
    /// overwritten and deleted entries no snapshot still needs. `None`
    /// bounds are open-ended.
    pub fn compact_range(&self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()> {
        self.shared
            .with_engine(|engine| engine.compact_range(start, limit).map_err(Error::from))
    }

    /// Engine statistics by name: `lsmkv.num-files`,
    /// `lsmkv.approximate-memory-usage`, `lsmkv.last-sequence`, `lsmkv.stats`.
    pub fn property_value(&self, name: &str) -> Result<Option<String>> {
        self.shared.with_engine(|engine| Ok(engine.property(name)))
    }

    fn resolve_snapshot(&self, options: &ReadOptions<'_>) -> Result<Option<SequenceNumber>> {
        match options.snapshot {
            None => Ok(None),
            Some(snapshot) if snapshot.db_id() == self.shared.id => Ok(Some(snapshot.sequence())),
            Some(_) => Err(Error::Lifecycle(
                "snapshot was created by a different database".to_string(),
            )),
        }
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.shared.path.display(), error = %e, "database dropped without a clean close");
        }
    }
}

impl fmt::Debug for DB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DB")
            .field("path", &self.shared.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Delete the database at `path`. A path that does not exist is fine; a
/// database open in this process is not.
pub fn destroy_database(path: impl AsRef<Path>, options: &Options) -> Result<()> {
    engine::destroy(path.as_ref(), options).map_err(Error::from)
}

/// Rebuild the manifest of a damaged database from the files that survive.
/// Must not run while the database is open.
pub fn repair_database(path: impl AsRef<Path>, options: &Options) -> Result<()> {
    repair::repair(path.as_ref(), options).map_err(Error::from)
}
