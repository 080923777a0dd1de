use crate::bloom::BloomFilter;

/// Builds and probes the per-table key filter.
///
/// The name is stored next to the filter; a table whose filter was written
/// under another name is read without it.
pub trait FilterPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Build a filter over every user key of a table.
    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8>;

    /// false → `key` was definitely not among the filtered keys.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Bloom filter policy spending a fixed number of bits on each key.
#[derive(Debug, Clone, Copy)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
}

impl BloomFilterPolicy {
    /// 10 bits per key gives roughly a 1% false positive rate.
    pub fn new(bits_per_key: usize) -> Self {
        BloomFilterPolicy {
            bits_per_key: bits_per_key.max(1),
        }
    }

    pub fn bits_per_key(&self) -> usize {
        self.bits_per_key
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &str {
        "lsmkv.BuiltinBloomFilter"
    }

    fn create_filter(&self, keys: &[&[u8]]) -> Vec<u8> {
        let mut filter = BloomFilter::with_bits_per_key(keys.len(), self.bits_per_key);
        for key in keys {
            filter.insert(key);
        }
        filter.serialize()
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        // An unreadable filter must not hide keys.
        match BloomFilter::deserialize(filter) {
            Ok(bf) => bf.may_contain(key),
            Err(_) => true,
        }
    }
}
