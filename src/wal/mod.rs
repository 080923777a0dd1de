//! Write-ahead log.
//!
//! Every write batch is appended to the active log before it is applied to
//! the memtable. One log file backs one memtable: when the memtable is
//! flushed to a table the manifest records the next log number and older
//! logs are deleted.

pub mod reader;
pub mod record;
pub mod writer;

pub use reader::{WALIterator, WALReader};
pub use record::WALRecord;
pub use writer::WALWriter;

use std::path::{Path, PathBuf};

/// `<dir>/<number>.log`
pub fn log_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{number:06}.log"))
}
