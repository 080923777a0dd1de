//! # lsmkv
//!
//! An embeddable, persistent, ordered key-value store built on a
//! log-structured merge tree.
//!
//! ## Core idea
//! Instead of updating data in place (B-Tree), buffer writes in memory,
//! flush them as sorted files, and merge those files as they pile up.
//! This turns random writes into sequential writes.
//!
//! ## Handles
//! A [`DB`] is opened on a directory and closed explicitly (or on drop).
//! [`Snapshot`]s and [`DbIterator`]s borrow state from it and must be
//! released before it closes; any call on a closed handle fails with
//! [`Error::ClosedHandle`]. A missing key is `Ok(None)`, never an error.
//!
//! ```no_run
//! use lsmkv::{DB, Options, ReadOptions, WriteBatch, WriteOptions};
//!
//! let mut options = Options::default();
//! options.set_create_if_missing(true);
//! let db = DB::open("/tmp/lsmkv-demo", &options)?;
//!
//! let mut batch = WriteBatch::new();
//! batch.put(b"a", b"1");
//! batch.delete(b"b");
//! db.write(&WriteOptions::default(), &batch)?;
//! assert_eq!(db.get(&ReadOptions::default(), b"a")?, Some(b"1".to_vec()));
//! db.close()?;
//! # Ok::<(), lsmkv::Error>(())
//! ```

pub mod batch;
pub mod bloom;
pub mod cache;
pub mod comparator;
pub mod compaction;
pub mod db;
pub mod engine;
pub mod env;
pub mod error;
pub mod iterator;
pub mod manifest;
pub mod memtable;
pub mod options;
pub mod sstable;
pub mod status;
pub mod types;
pub mod wal;

// Public re-exports for the top-level API
pub use batch::{BatchOp, WriteBatch};
pub use bloom::{BloomFilterPolicy, FilterPolicy};
pub use cache::Cache;
pub use comparator::{BytewiseComparator, Comparator};
pub use db::{DB, DbIterator, IterState, Range, Snapshot, destroy_database, repair_database};
pub use env::{DefaultEnv, Env};
pub use error::{Error, Result};
pub use options::{Compression, Options, ReadOptions, WriteOptions};

/// Major version of the library.
pub fn major_version() -> u32 {
    env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0)
}

/// Minor version of the library.
pub fn minor_version() -> u32 {
    env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0)
}
