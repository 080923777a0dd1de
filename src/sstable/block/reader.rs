use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::InternalKeyComparator;
use crate::iterator::StorageIterator;
use crate::sstable::block::builder::ENTRY_HEADER_SIZE;
use crate::status::{Result, Status};

/// A decoded data block. Every entry bound is validated on decode, so
/// accessors never index out of range.
#[derive(Debug)]
pub struct Block {
    data: Vec<u8>,
    /// (key_start, key_end, value_end) per entry.
    entries: Vec<(usize, usize, usize)>,
}

impl Block {
    /// Parse raw block contents (without the table trailer).
    pub fn decode(data: Vec<u8>) -> Result<Self> {
        if data.len() < 4 {
            return Err(Status::corruption("block too short"));
        }
        let count = read_u32(&data, data.len() - 4) as usize;
        let offsets_start = data
            .len()
            .checked_sub(4 + count * 4)
            .ok_or_else(|| Status::corruption("block offset array exceeds block"))?;

        let mut entries = Vec::with_capacity(count);
        for i in 0..count {
            let offset = read_u32(&data, offsets_start + i * 4) as usize;
            if offset + ENTRY_HEADER_SIZE > offsets_start {
                return Err(Status::corruption("block entry offset out of range"));
            }
            let key_len = read_u32(&data, offset) as usize;
            let val_len = read_u32(&data, offset + 4) as usize;
            let key_start = offset + ENTRY_HEADER_SIZE;
            let value_end = key_start + key_len + val_len;
            if value_end > offsets_start {
                return Err(Status::corruption("block entry exceeds block"));
            }
            entries.push((key_start, key_start + key_len, value_end));
        }
        Ok(Block { data, entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes charged against the block cache.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn key(&self, i: usize) -> &[u8] {
        let (start, end, _) = self.entries[i];
        &self.data[start..end]
    }

    pub fn value(&self, i: usize) -> &[u8] {
        let (_, start, end) = self.entries[i];
        &self.data[start..end]
    }

    /// Index of the first entry with key >= target (binary search).
    pub fn lower_bound(&self, target: &[u8], cmp: &InternalKeyComparator) -> usize {
        let (mut lo, mut hi) = (0, self.entries.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(self.key(mid), target) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn iter(self: &Arc<Self>, cmp: InternalKeyComparator) -> BlockIterator {
        BlockIterator {
            block: Arc::clone(self),
            cmp,
            pos: 0,
        }
    }
}

/// Bidirectional cursor over one block. Starts at the first entry.
pub struct BlockIterator {
    block: Arc<Block>,
    cmp: InternalKeyComparator,
    pos: usize,
}

impl StorageIterator for BlockIterator {
    fn key(&self) -> &[u8] {
        self.block.key(self.pos)
    }

    fn value(&self) -> &[u8] {
        self.block.value(self.pos)
    }

    fn is_valid(&self) -> bool {
        self.pos < self.block.len()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.pos = self.block.len().checked_sub(1).unwrap_or(self.block.len());
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.pos = self.block.lower_bound(key, &self.cmp);
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        if self.is_valid() {
            self.pos += 1;
        }
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        if !self.is_valid() {
            return Ok(());
        }
        self.pos = self.pos.checked_sub(1).unwrap_or(self.block.len());
        Ok(())
    }
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(raw)
}
