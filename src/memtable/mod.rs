pub mod skiplist;

use std::cmp::Ordering;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::comparator::InternalKeyComparator;
use crate::iterator::StorageIterator;
use crate::status::Result;
use crate::types::{ParsedInternalKey, SequenceNumber, ValueType, encode_internal_key, lookup_key};
use skiplist::SkipList;

/// Outcome of a memtable point lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    /// The newest visible entry is a put.
    Found(Vec<u8>),
    /// The newest visible entry is a tombstone.
    Deleted,
    /// No visible entry: older data may still live in a table.
    Missing,
}

/// In-memory sorted buffer for writes. Wraps a SkipList.
///
/// Every write goes here first, tagged with its sequence number. When size
/// exceeds the write buffer size the memtable is flushed to a table.
///
/// Deletes are tombstones: a `ValueType::Delete` entry. You can't just
/// remove the key because older versions may exist in tables on disk.
///
/// Shared behind an `Arc`: writers insert under the write lock while
/// iterators hold node indices and re-take the read lock per step.
pub struct MemTable {
    data: RwLock<SkipList>,
    cmp: InternalKeyComparator,
}

impl MemTable {
    /// Create a new empty memtable.
    pub fn new(cmp: InternalKeyComparator) -> Self {
        MemTable {
            data: RwLock::new(SkipList::new(cmp.clone())),
            cmp,
        }
    }

    /// Insert a put or a tombstone at `sequence`.
    pub fn add(&self, sequence: SequenceNumber, value_type: ValueType, key: &[u8], value: &[u8]) {
        let ikey = encode_internal_key(key, sequence, value_type);
        self.data.write().insert(ikey, value.to_vec());
    }

    /// Look up the newest entry for `key` with sequence <= `sequence`.
    pub fn get(&self, key: &[u8], sequence: SequenceNumber) -> LookupResult {
        let target = lookup_key(key, sequence);
        let data = self.data.read();
        let Some(idx) = data.find_greater_or_equal(&target) else {
            return LookupResult::Missing;
        };
        match ParsedInternalKey::parse(data.key_at(idx)) {
            Ok(parsed) if self.cmp.compare_user(parsed.user_key, key) == Ordering::Equal => {
                match parsed.value_type {
                    ValueType::Put => LookupResult::Found(data.value_at(idx).to_vec()),
                    ValueType::Delete => LookupResult::Deleted,
                }
            }
            _ => LookupResult::Missing,
        }
    }

    /// Return a sorted iterator over all entries (including tombstones and
    /// shadowed versions).
    pub fn iter(self: &Arc<Self>) -> MemTableIterator {
        MemTableIterator {
            mem: Arc::clone(self),
            node: None,
            key: Vec::new(),
            value: Vec::new(),
        }
    }

    /// Number of entries, counting every version.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Current memory usage in bytes.
    pub fn approximate_memory_usage(&self) -> usize {
        self.data.read().size_bytes()
    }
}

/// Cursor over a shared memtable.
///
/// The current entry is copied out so `key()`/`value()` never hold the lock.
/// Entries inserted after the cursor was created may become visible to it;
/// the engine iterator filters them by sequence number.
pub struct MemTableIterator {
    mem: Arc<MemTable>,
    node: Option<usize>,
    key: Vec<u8>,
    value: Vec<u8>,
}

impl MemTableIterator {
    fn load(&mut self, data: &SkipList, node: Option<usize>) {
        self.node = node;
        self.key.clear();
        self.value.clear();
        if let Some(idx) = node {
            self.key.extend_from_slice(data.key_at(idx));
            self.value.extend_from_slice(data.value_at(idx));
        }
    }
}

impl StorageIterator for MemTableIterator {
    fn key(&self) -> &[u8] {
        &self.key
    }

    fn value(&self) -> &[u8] {
        &self.value
    }

    fn is_valid(&self) -> bool {
        self.node.is_some()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        let mem = Arc::clone(&self.mem);
        let data = mem.data.read();
        self.load(&data, data.first());
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        let mem = Arc::clone(&self.mem);
        let data = mem.data.read();
        self.load(&data, data.last());
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        let mem = Arc::clone(&self.mem);
        let data = mem.data.read();
        self.load(&data, data.find_greater_or_equal(key));
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        let Some(idx) = self.node else {
            return Ok(());
        };
        let mem = Arc::clone(&self.mem);
        let data = mem.data.read();
        self.load(&data, data.next_of(idx));
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        if self.node.is_none() {
            return Ok(());
        }
        let mem = Arc::clone(&self.mem);
        let data = mem.data.read();
        let current = std::mem::take(&mut self.key);
        self.load(&data, data.find_less_than(&current));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::user_key_of;

    #[test]
    fn lookup_respects_sequence() {
        let mem = MemTable::new(InternalKeyComparator::default());
        mem.add(1, ValueType::Put, b"k", b"v1");
        mem.add(5, ValueType::Put, b"k", b"v5");
        assert_eq!(mem.get(b"k", 3), LookupResult::Found(b"v1".to_vec()));
        assert_eq!(mem.get(b"k", 9), LookupResult::Found(b"v5".to_vec()));
        assert_eq!(mem.get(b"k", 0), LookupResult::Missing);
    }

    #[test]
    fn iterator_walks_both_directions() {
        let mem = Arc::new(MemTable::new(InternalKeyComparator::default()));
        mem.add(1, ValueType::Put, b"a", b"1");
        mem.add(2, ValueType::Put, b"b", b"2");
        mem.add(3, ValueType::Put, b"c", b"3");

        let mut it = mem.iter();
        it.seek_to_last().unwrap();
        assert_eq!(user_key_of(it.key()), b"c");
        it.prev().unwrap();
        assert_eq!(user_key_of(it.key()), b"b");
        it.next().unwrap();
        assert_eq!(user_key_of(it.key()), b"c");
        it.next().unwrap();
        assert!(!it.is_valid());
    }
}
