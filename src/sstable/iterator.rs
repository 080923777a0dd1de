use std::sync::Arc;

use crate::comparator::InternalKeyComparator;
use crate::iterator::StorageIterator;
use crate::sstable::BlockReadOptions;
use crate::sstable::block::reader::BlockIterator;
use crate::sstable::reader::SSTable;
use crate::status::Result;

/// Two-level iterator: a position in the table index plus a cursor inside
/// the data block it names. Blocks are loaded lazily through the table
/// (and its cache).
pub struct SSTableIterator {
    table: Arc<SSTable>,
    cmp: InternalKeyComparator,
    opts: BlockReadOptions,
    block_idx: usize,
    block_iter: Option<BlockIterator>,
}

impl SSTableIterator {
    pub(crate) fn new(table: Arc<SSTable>, cmp: InternalKeyComparator, opts: BlockReadOptions) -> Self {
        SSTableIterator {
            table,
            cmp,
            opts,
            block_idx: 0,
            block_iter: None,
        }
    }

    fn load_block(&mut self, idx: usize) -> Result<()> {
        self.block_iter = None;
        self.block_idx = idx;
        if idx < self.table.block_count() {
            let block = self.table.read_block_at(idx, self.opts)?;
            self.block_iter = Some(block.iter(self.cmp.clone()));
        }
        Ok(())
    }

    /// Move forward over blocks until positioned or out of blocks.
    fn skip_empty_blocks_forward(&mut self) -> Result<()> {
        while self.block_iter.as_ref().is_some_and(|it| !it.is_valid()) {
            self.load_block(self.block_idx + 1)?;
            if let Some(it) = self.block_iter.as_mut() {
                it.seek_to_first()?;
            }
        }
        Ok(())
    }

    /// Move backward over blocks until positioned or out of blocks.
    fn skip_empty_blocks_backward(&mut self) -> Result<()> {
        while self.block_iter.as_ref().is_some_and(|it| !it.is_valid()) {
            if self.block_idx == 0 {
                self.block_iter = None;
                return Ok(());
            }
            self.load_block(self.block_idx - 1)?;
            if let Some(it) = self.block_iter.as_mut() {
                it.seek_to_last()?;
            }
        }
        Ok(())
    }
}

impl StorageIterator for SSTableIterator {
    fn key(&self) -> &[u8] {
        self.block_iter.as_ref().map_or(&[], |it| it.key())
    }

    fn value(&self) -> &[u8] {
        self.block_iter.as_ref().map_or(&[], |it| it.value())
    }

    fn is_valid(&self) -> bool {
        self.block_iter.as_ref().is_some_and(|it| it.is_valid())
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.load_block(0)?;
        if let Some(it) = self.block_iter.as_mut() {
            it.seek_to_first()?;
        }
        self.skip_empty_blocks_forward()
    }

    fn seek_to_last(&mut self) -> Result<()> {
        match self.table.block_count().checked_sub(1) {
            Some(last) => {
                self.load_block(last)?;
                if let Some(it) = self.block_iter.as_mut() {
                    it.seek_to_last()?;
                }
                self.skip_empty_blocks_backward()
            }
            None => {
                self.block_iter = None;
                Ok(())
            }
        }
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        match self.table.find_block(key) {
            Some(idx) => {
                self.load_block(idx)?;
                if let Some(it) = self.block_iter.as_mut() {
                    it.seek(key)?;
                }
                self.skip_empty_blocks_forward()
            }
            None => {
                self.block_iter = None;
                Ok(())
            }
        }
    }

    fn next(&mut self) -> Result<()> {
        if let Some(it) = self.block_iter.as_mut() {
            it.next()?;
        }
        self.skip_empty_blocks_forward()
    }

    fn prev(&mut self) -> Result<()> {
        if let Some(it) = self.block_iter.as_mut() {
            it.prev()?;
        }
        self.skip_empty_blocks_backward()
    }
}
