use std::path::Path;
use std::sync::Arc;

use crate::bloom::FilterPolicy;
use crate::env::{Env, WritableFile};
use crate::options::Compression;
use crate::sstable::BLOCK_TRAILER_SIZE;
use crate::sstable::block::builder::BlockBuilder;
use crate::sstable::footer::{Footer, IndexEntry, SSTABLE_MAGIC, SSTableMeta};
use crate::status::Result;
use crate::types::ParsedInternalKey;

/// Settings shared by table builders and readers of one database.
#[derive(Clone)]
pub struct TableOptions {
    pub block_size: usize,
    pub compression: Compression,
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
}

/// Builds a table file from a sorted stream of internal-key entries.
///
/// Used during:
/// - Memtable flush (sorted memtable → table)
/// - Compaction (merged iterators → new table)
///
/// Build process:
/// 1. Add entries one by one (must be in sorted order)
/// 2. Entries fill up blocks; when a block is full it's written to disk
/// 3. finish() flushes the last block, writes filter, index, footer, fsync
///
/// Layout: [data blocks][filter block][index block][footer]
///
/// Every block is followed by a trailer: [compression(1B)][crc32(4B)] where
/// the CRC covers the stored block bytes and the compression byte.
pub struct SSTableBuilder {
    block_builder: BlockBuilder,
    index_entries: Vec<IndexEntry>,
    data_offset: u64,
    file: Box<dyn WritableFile>,
    sst_id: u64,
    options: TableOptions,
    smallest: Option<Vec<u8>>,
    largest: Vec<u8>,
    entry_count: u64,
    max_sequence: u64,
    filter_keys: Vec<Vec<u8>>,
}

impl SSTableBuilder {
    /// Create a new table builder that writes to the given path.
    pub fn new(env: &dyn Env, path: &Path, sst_id: u64, options: TableOptions) -> Result<Self> {
        let file = env.new_writable_file(path)?;
        Ok(SSTableBuilder {
            block_builder: BlockBuilder::new(options.block_size),
            index_entries: Vec::new(),
            data_offset: 0,
            file,
            sst_id,
            options,
            smallest: None,
            largest: Vec::new(),
            entry_count: 0,
            max_sequence: 0,
            filter_keys: Vec::new(),
        })
    }

    /// Add an entry. `key` is an encoded internal key; keys MUST arrive in
    /// internal key order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let parsed = ParsedInternalKey::parse(key)?;
        self.max_sequence = self.max_sequence.max(parsed.sequence);
        if self.options.filter_policy.is_some()
            && self.filter_keys.last().map(Vec::as_slice) != Some(parsed.user_key)
        {
            self.filter_keys.push(parsed.user_key.to_vec());
        }

        if self.smallest.is_none() {
            self.smallest = Some(key.to_vec());
        }
        self.largest.clear();
        self.largest.extend_from_slice(key);
        self.entry_count += 1;

        if self.block_builder.add(key, value) {
            return Ok(());
        }

        // Block is full: flush it, then add to a fresh block.
        self.flush_block()?;
        self.block_builder.add(key, value);
        Ok(())
    }

    /// Number of entries added so far.
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_builder.is_empty() {
            return Ok(());
        }
        let old_builder = std::mem::replace(
            &mut self.block_builder,
            BlockBuilder::new(self.options.block_size),
        );
        let last_key = old_builder.last_key().to_vec();
        let (offset, size) = self.write_block(&old_builder.build(), self.options.compression)?;
        self.index_entries.push(IndexEntry {
            last_key,
            offset,
            size,
        });
        Ok(())
    }

    /// Write one block plus trailer; returns (offset, stored size).
    fn write_block(&mut self, contents: &[u8], compression: Compression) -> Result<(u64, u64)> {
        let compressed;
        let (stored, kind): (&[u8], Compression) = match compression {
            Compression::None => (contents, Compression::None),
            Compression::Snappy => {
                compressed = snap::raw::Encoder::new().compress_vec(contents).ok();
                match &compressed {
                    // Keep the raw block unless snappy saves at least 12.5%.
                    Some(c) if c.len() < contents.len() - contents.len() / 8 => {
                        (c.as_slice(), Compression::Snappy)
                    }
                    _ => (contents, Compression::None),
                }
            }
        };

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(stored);
        hasher.update(&[kind as u8]);
        let crc = hasher.finalize();

        let offset = self.data_offset;
        self.file.append(stored)?;
        self.file.append(&[kind as u8])?;
        self.file.append(&crc.to_le_bytes())?;
        self.data_offset += (stored.len() + BLOCK_TRAILER_SIZE) as u64;
        Ok((offset, stored.len() as u64))
    }

    /// Finalize the table: flush last block, write filter block, index
    /// block, footer, fsync.
    pub fn finish(mut self) -> Result<SSTableMeta> {
        self.flush_block()?;

        // Filter block: [name_len(4B)][policy name][filter bytes]
        let (filter_block_offset, filter_block_size) = match self.options.filter_policy.clone() {
            Some(policy) => {
                let keys: Vec<&[u8]> = self.filter_keys.iter().map(Vec::as_slice).collect();
                let filter = policy.create_filter(&keys);
                let name = policy.name().as_bytes();
                let mut block = Vec::with_capacity(4 + name.len() + filter.len());
                block.extend_from_slice(&(name.len() as u32).to_le_bytes());
                block.extend_from_slice(name);
                block.extend_from_slice(&filter);
                self.write_block(&block, Compression::None)?
            }
            None => (self.data_offset, 0),
        };

        let mut index_data = Vec::new();
        for entry in &self.index_entries {
            index_data.extend_from_slice(&entry.encode());
        }
        let (index_block_offset, index_block_size) =
            self.write_block(&index_data, Compression::None)?;

        let footer = Footer {
            index_block_offset,
            index_block_size,
            filter_block_offset,
            filter_block_size,
            entry_count: self.entry_count,
            max_sequence: self.max_sequence,
            magic: SSTABLE_MAGIC,
        };
        self.file.append(&footer.encode())?;
        self.file.sync()?;

        Ok(SSTableMeta {
            id: self.sst_id,
            smallest: self.smallest.unwrap_or_default(),
            largest: self.largest,
            file_size: self.data_offset + Footer::SIZE as u64,
            entry_count: self.entry_count,
            max_sequence: self.max_sequence,
        })
    }
}
