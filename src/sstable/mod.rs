pub mod block;
pub mod builder;
pub mod footer;
pub mod iterator;
pub mod reader;

pub use builder::{SSTableBuilder, TableOptions};
pub use footer::SSTableMeta;
pub use iterator::SSTableIterator;
pub use reader::SSTable;

use std::path::{Path, PathBuf};

/// [compression(1B)][crc32(4B)] after every stored block.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Per-read knobs passed down from [`crate::ReadOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockReadOptions {
    pub verify_checksums: bool,
    pub fill_cache: bool,
}

impl BlockReadOptions {
    /// Checked reads that leave the cache untouched (compaction, open).
    pub fn verified() -> Self {
        BlockReadOptions {
            verify_checksums: true,
            fill_cache: false,
        }
    }
}

impl Default for BlockReadOptions {
    fn default() -> Self {
        BlockReadOptions {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}

/// `<dir>/<id>.sst`
pub fn table_file_name(dir: &Path, id: u64) -> PathBuf {
    dir.join(format!("{id:06}.sst"))
}
