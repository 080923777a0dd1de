//! Block cache shared between tables and databases.
//!
//! A byte-bounded LRU over decoded data blocks. Each open table takes a
//! distinct cache id so one cache can serve several tables and databases.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::sstable::block::Block;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockCacheKey {
    pub cache_id: u64,
    pub offset: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub usage: usize,
}

/// LRU cache of decoded table blocks, bounded by total block size.
pub struct Cache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    next_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

struct CacheInner {
    map: LruCache<BlockCacheKey, Arc<Block>>,
    usage: usize,
}

impl Cache {
    /// Create a cache holding at most `capacity` bytes of block data.
    pub fn new_lru(capacity: usize) -> Self {
        Cache {
            inner: Mutex::new(CacheInner {
                map: LruCache::unbounded(),
                usage: 0,
            }),
            capacity,
            next_id: AtomicU64::new(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
        }
    }

    /// A fresh id namespacing one table's blocks.
    pub fn new_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &BlockCacheKey) -> Option<Arc<Block>> {
        let found = self.inner.lock().map.get(key).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: BlockCacheKey, block: Arc<Block>) {
        let charge = block.size();
        if charge > self.capacity {
            return;
        }
        let mut inner = self.inner.lock();
        if let Some(old) = inner.map.put(key, block) {
            inner.usage -= old.size();
        }
        inner.usage += charge;
        while inner.usage > self.capacity {
            match inner.map.pop_lru() {
                Some((_, evicted)) => inner.usage -= evicted.size(),
                None => break,
            }
        }
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop every block cached under `cache_id`.
    pub fn evict_id(&self, cache_id: u64) {
        let mut inner = self.inner.lock();
        let doomed: Vec<BlockCacheKey> = inner
            .map
            .iter()
            .filter(|(k, _)| k.cache_id == cache_id)
            .map(|(k, _)| *k)
            .collect();
        for key in doomed {
            if let Some(block) = inner.map.pop(&key) {
                inner.usage -= block.size();
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            usage: self.inner.lock().usage,
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.capacity)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::block::builder::BlockBuilder;

    fn block_of(n: usize) -> Arc<Block> {
        let mut builder = BlockBuilder::new(1 << 20);
        for i in 0..n {
            builder.add(format!("key{i:04}").as_bytes(), b"value");
        }
        Arc::new(Block::decode(builder.build()).unwrap())
    }

    #[test]
    fn evicts_least_recently_used_over_capacity() {
        let one = block_of(10);
        let cache = Cache::new_lru(one.size() * 2);
        let key = |offset| BlockCacheKey { cache_id: 1, offset };

        cache.insert(key(0), Arc::clone(&one));
        cache.insert(key(1), block_of(10));
        assert!(cache.get(&key(0)).is_some());
        cache.insert(key(2), block_of(10));

        assert!(cache.get(&key(1)).is_none());
        assert!(cache.get(&key(0)).is_some());
        assert!(cache.stats().usage <= cache.capacity());
    }

    #[test]
    fn evict_id_only_touches_that_table() {
        let cache = Cache::new_lru(1 << 20);
        cache.insert(BlockCacheKey { cache_id: 1, offset: 0 }, block_of(3));
        cache.insert(BlockCacheKey { cache_id: 2, offset: 0 }, block_of(3));
        cache.evict_id(1);
        assert!(cache.get(&BlockCacheKey { cache_id: 1, offset: 0 }).is_none());
        assert!(cache.get(&BlockCacheKey { cache_id: 2, offset: 0 }).is_some());
    }
}
