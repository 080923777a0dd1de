pub mod merge;

pub use merge::MergeIterator;

use crate::status::Result;

/// The central iteration abstraction for the storage engine.
///
/// Every sorted data source (memtable, block, table, merged view) implements
/// this trait over encoded internal keys. This enables composability:
/// [`MergeIterator`] takes `Vec<Box<dyn StorageIterator>>` and merges them.
///
/// Positioning methods return an error on IO failure or corruption; after an
/// error the iterator is invalid.
pub trait StorageIterator: Send {
    /// Returns the current key. Only valid when is_valid() is true.
    fn key(&self) -> &[u8];

    /// Returns the current value. Only valid when is_valid() is true.
    fn value(&self) -> &[u8];

    /// Returns true if the iterator is positioned at a valid entry.
    fn is_valid(&self) -> bool;

    /// Positions the iterator at the first entry.
    fn seek_to_first(&mut self) -> Result<()>;

    /// Positions the iterator at the last entry.
    fn seek_to_last(&mut self) -> Result<()>;

    /// Positions the iterator at the first entry with key >= target.
    fn seek(&mut self, key: &[u8]) -> Result<()>;

    /// Advances to the next entry. Only valid when is_valid() is true.
    fn next(&mut self) -> Result<()>;

    /// Moves to the previous entry. Only valid when is_valid() is true.
    fn prev(&mut self) -> Result<()>;
}
