use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use crate::cache::{BlockCacheKey, Cache};
use crate::comparator::InternalKeyComparator;
use crate::env::{Env, RandomAccessFile};
use crate::options::Compression;
use crate::sstable::block::reader::Block;
use crate::sstable::builder::TableOptions;
use crate::sstable::footer::{Footer, IndexEntry, SSTableMeta, fixed};
use crate::sstable::iterator::SSTableIterator;
use crate::sstable::{BLOCK_TRAILER_SIZE, BlockReadOptions};
use crate::status::{Result, Status};
use crate::types::{ParsedInternalKey, user_key_of};

/// An opened table file. Supports point lookups and range scans.
///
/// On open:
/// 1. Read footer (last 56 bytes) → find index and filter block positions
/// 2. Read and parse index block → Vec<IndexEntry>
/// 3. Read the filter block if it was written by the configured policy
/// 4. Ready for queries (data blocks read on demand, through the cache)
///
/// A table replaced by compaction is marked obsolete; its file is removed
/// when the last reader drops it.
pub struct SSTable {
    path: PathBuf,
    file: Box<dyn RandomAccessFile>,
    env: Arc<dyn Env>,
    index: Vec<IndexEntry>,
    filter: Option<Vec<u8>>,
    footer: Footer,
    meta: SSTableMeta,
    options: TableOptions,
    cmp: InternalKeyComparator,
    cache: Option<Arc<Cache>>,
    cache_id: u64,
    obsolete: AtomicBool,
}

impl SSTable {
    /// Open a table file. The index and filter blocks are always checksum
    /// verified.
    pub fn open(
        env: Arc<dyn Env>,
        path: &Path,
        id: u64,
        options: TableOptions,
        cmp: InternalKeyComparator,
        cache: Option<Arc<Cache>>,
    ) -> Result<Self> {
        let file = env.new_random_access_file(path)?;
        let file_size = file.size();
        if file_size < Footer::SIZE as u64 {
            return Err(Status::corruption(format!(
                "{}: file too short to contain footer",
                path.display()
            )));
        }
        let footer = Footer::decode(&file.read_at(file_size - Footer::SIZE as u64, Footer::SIZE)?)?;

        let index_buf = read_checked(
            file.as_ref(),
            footer.index_block_offset,
            footer.index_block_size,
            true,
        )?;
        let mut index = Vec::new();
        let mut offset = 0usize;
        while offset < index_buf.len() {
            let (entry, consumed) = IndexEntry::decode(&index_buf[offset..])?;
            index.push(entry);
            offset += consumed;
        }

        let filter = match (&options.filter_policy, footer.filter_block_size) {
            (Some(policy), size) if size > 0 => {
                let raw = read_checked(file.as_ref(), footer.filter_block_offset, size, true)?;
                split_filter_block(&raw)
                    .filter(|(name, _)| *name == policy.name().as_bytes())
                    .map(|(_, bits)| bits.to_vec())
            }
            _ => None,
        };

        let mut meta = SSTableMeta {
            id,
            smallest: Vec::new(),
            largest: index.last().map(|e| e.last_key.clone()).unwrap_or_default(),
            file_size,
            entry_count: footer.entry_count,
            max_sequence: footer.max_sequence,
        };
        let cache_id = cache.as_ref().map(|c| c.new_id()).unwrap_or(0);
        let mut table = SSTable {
            path: path.to_path_buf(),
            file,
            env,
            index,
            filter,
            footer,
            meta: meta.clone(),
            options,
            cmp,
            cache,
            cache_id,
            obsolete: AtomicBool::new(false),
        };
        if let Some(first) = table.index.first().cloned() {
            let block = table.read_block(&first, BlockReadOptions::verified())?;
            if !block.is_empty() {
                meta.smallest = block.key(0).to_vec();
            }
        }
        table.meta = meta;
        tracing::debug!(path = %table.path.display(), blocks = table.index.len(), "opened table");
        Ok(table)
    }

    /// Point lookup: the first entry whose internal key is >= `lookup`,
    /// provided it belongs to the same user key.
    ///
    /// Algorithm:
    /// 1. Ask the filter whether the user key can be present at all
    /// 2. Binary search index → find the right data block
    /// 3. Read that block (cache first, then disk)
    /// 4. Binary search within the block
    pub fn get(&self, lookup: &[u8], opts: BlockReadOptions) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let user_key = user_key_of(lookup);
        if let (Some(policy), Some(filter)) = (&self.options.filter_policy, &self.filter) {
            if !policy.key_may_match(user_key, filter) {
                return Ok(None);
            }
        }

        let Some(block_idx) = self.find_block(lookup) else {
            return Ok(None);
        };
        let block = self.read_block(&self.index[block_idx], opts)?;
        let pos = block.lower_bound(lookup, &self.cmp);
        if pos >= block.len() {
            return Ok(None);
        }
        let found = ParsedInternalKey::parse(block.key(pos))?;
        if self.cmp.compare_user(found.user_key, user_key) != Ordering::Equal {
            return Ok(None);
        }
        Ok(Some((block.key(pos).to_vec(), block.value(pos).to_vec())))
    }

    /// Index of the first block whose last key is >= `key`.
    pub(crate) fn find_block(&self, key: &[u8]) -> Option<usize> {
        let idx = self
            .index
            .partition_point(|e| self.cmp.compare(&e.last_key, key) == Ordering::Less);
        (idx < self.index.len()).then_some(idx)
    }

    /// Approximate file offset where `key` would live: the start of its
    /// block, or the end of the data section if it sorts after every entry.
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        match self.find_block(key) {
            Some(idx) => self.index[idx].offset,
            None => self.data_end(),
        }
    }

    fn data_end(&self) -> u64 {
        if self.footer.filter_block_size > 0 {
            self.footer.filter_block_offset
        } else {
            self.footer.index_block_offset
        }
    }

    pub(crate) fn block_count(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn read_block_at(&self, idx: usize, opts: BlockReadOptions) -> Result<Arc<Block>> {
        self.read_block(&self.index[idx], opts)
    }

    fn read_block(&self, entry: &IndexEntry, opts: BlockReadOptions) -> Result<Arc<Block>> {
        let key = BlockCacheKey {
            cache_id: self.cache_id,
            offset: entry.offset,
        };
        if let Some(cache) = &self.cache {
            if let Some(block) = cache.get(&key) {
                return Ok(block);
            }
        }

        let contents = read_checked(self.file.as_ref(), entry.offset, entry.size, opts.verify_checksums)
            .map_err(|e| annotate(e, &self.path))?;
        let block = Arc::new(Block::decode(contents).map_err(|e| annotate(e, &self.path))?);
        if opts.fill_cache {
            if let Some(cache) = &self.cache {
                cache.insert(key, Arc::clone(&block));
            }
        }
        Ok(block)
    }

    /// Create an iterator over all entries in the table. The iterator is
    /// unpositioned until seeked.
    pub fn iter(self: &Arc<Self>, opts: BlockReadOptions) -> SSTableIterator {
        SSTableIterator::new(Arc::clone(self), self.cmp.clone(), opts)
    }

    /// Get metadata about this table.
    pub fn meta(&self) -> &SSTableMeta {
        &self.meta
    }

    pub fn id(&self) -> u64 {
        self.meta.id
    }

    /// Delete the file once the last reader lets go.
    pub(crate) fn mark_obsolete(&self) {
        self.obsolete.store(true, AtomicOrdering::Release);
    }
}

impl Drop for SSTable {
    fn drop(&mut self) {
        if let Some(cache) = &self.cache {
            cache.evict_id(self.cache_id);
        }
        if self.obsolete.load(AtomicOrdering::Acquire) {
            if let Err(e) = self.env.remove_file(&self.path) {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove obsolete table");
            }
        }
    }
}

/// Read a stored block and its trailer, optionally verify the CRC, and
/// return the uncompressed contents.
fn read_checked(
    file: &dyn RandomAccessFile,
    offset: u64,
    size: u64,
    verify: bool,
) -> Result<Vec<u8>> {
    // Offsets come from an unchecksummed footer or index: bound them first.
    let end = size
        .checked_add(BLOCK_TRAILER_SIZE as u64)
        .and_then(|stored| offset.checked_add(stored));
    match end {
        Some(end) if end <= file.size() => {}
        _ => return Err(Status::corruption("block extends past end of file")),
    }
    let size = size as usize;
    let mut raw = file.read_at(offset, size + BLOCK_TRAILER_SIZE)?;
    let kind = raw[size];
    if verify {
        let stored_crc = u32::from_le_bytes(fixed(&raw[size + 1..size + 5]));
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&raw[..size + 1]);
        if hasher.finalize() != stored_crc {
            return Err(Status::corruption("block checksum mismatch"));
        }
    }
    raw.truncate(size);
    match Compression::from_u8(kind)? {
        Compression::None => Ok(raw),
        Compression::Snappy => snap::raw::Decoder::new()
            .decompress_vec(&raw)
            .map_err(|e| Status::corruption(format!("snappy: {e}"))),
    }
}

fn split_filter_block(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    if raw.len() < 4 {
        return None;
    }
    let name_len = u32::from_le_bytes(fixed(&raw[0..4])) as usize;
    let rest = &raw[4..];
    (rest.len() >= name_len).then(|| rest.split_at(name_len))
}

fn annotate(status: Status, path: &Path) -> Status {
    match status {
        Status::Corruption(msg) => Status::Corruption(format!("{}: {msg}", path.display())),
        other => other,
    }
}
