pub mod policy;

pub use policy::{BloomFilterPolicy, FilterPolicy};

use xxhash_rust::xxh3::xxh3_128;

use crate::status::{Result, Status};

/// Probabilistic data structure: "is this key in the set?"
///
/// - If any bit is 0 → key is DEFINITELY NOT in the set
/// - If all bits are 1 → key is PROBABLY in the set (false positive possible)
///
/// Used in table reads to skip tables that definitely don't contain the
/// target key.
///
/// Sizing:
///   num_hashes = bits_per_key * ln(2)
///
///   10 bits/key → ~1% FPR, 7 hashes
///
/// Hash trick: don't need k independent hash functions.
/// Use double hashing: h_i(key) = h1(key) + i * h2(key) (mod m)
/// where h1, h2 come from splitting a 128-bit hash into two 64-bit halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_hashes: u32,
    num_bits: u32,
}

const SERIALIZED_HEADER: usize = 8;

impl BloomFilter {
    /// Create a new bloom filter sized for expected_items at the given FPR.
    ///
    /// # Panics
    /// Panics if FPR is not in (0, 1).
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "FPR must be in (0, 1)"
        );
        // bits per key: -1.44 * log2(FPR)
        let bits_per_key = -1.44 * false_positive_rate.log2();
        Self::sized(expected_items, bits_per_key)
    }

    /// Create a filter spending `bits_per_key` bits on each expected key.
    pub fn with_bits_per_key(expected_items: usize, bits_per_key: usize) -> Self {
        Self::sized(expected_items, bits_per_key as f64)
    }

    fn sized(expected_items: usize, bits_per_key: f64) -> Self {
        let num_bits = ((expected_items.max(1) as f64) * bits_per_key).ceil() as u32;
        let num_bits = num_bits.max(64);

        let num_hashes = (bits_per_key * 2.0f64.ln()).ceil() as u32;
        let num_hashes = num_hashes.clamp(1, 30);

        let num_u64s = (num_bits as usize).div_ceil(64);
        Self {
            bits: vec![0u64; num_u64s],
            num_hashes,
            num_bits,
        }
    }

    /// Add a key to the bloom filter.
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_key(key);
        for i in 0..self.num_hashes {
            let pos = self.get_position(h1, h2, i);
            self.set_bit(pos);
        }
    }

    /// Check if a key MIGHT be in the set.
    /// false → definitely not here. true → probably here.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_key(key);
        (0..self.num_hashes).all(|i| self.check_bit(self.get_position(h1, h2, i)))
    }

    /// Serialize the bloom filter to bytes (for writing into a table).
    ///
    /// Format: [num_hashes(4B)][num_bits(4B)][bit words(8B each)]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SERIALIZED_HEADER + self.bits.len() * 8);
        buf.extend_from_slice(&self.num_hashes.to_le_bytes());
        buf.extend_from_slice(&self.num_bits.to_le_bytes());
        for word in &self.bits {
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf
    }

    /// Deserialize a bloom filter from bytes (when opening a table).
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < SERIALIZED_HEADER {
            return Err(Status::corruption("bloom filter too short"));
        }
        let num_hashes = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let num_bits = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let words = &data[SERIALIZED_HEADER..];
        let num_u64s = (num_bits as usize).div_ceil(64);
        if num_bits == 0 || num_hashes == 0 || words.len() != num_u64s * 8 {
            return Err(Status::corruption("bloom filter size mismatch"));
        }
        let bits = words
            .chunks_exact(8)
            .map(|chunk| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(chunk);
                u64::from_le_bytes(raw)
            })
            .collect();
        Ok(Self {
            bits,
            num_hashes,
            num_bits,
        })
    }

    /// Get the number of hash functions used.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Get the total number of bits in the filter.
    pub fn num_bits(&self) -> u32 {
        self.num_bits
    }

    /// Calculate bit position using double hashing.
    fn get_position(&self, h1: u64, h2: u64, i: u32) -> u32 {
        // h_i = (h1 + i * h2) mod num_bits
        let i = i as u64;
        (h1.wrapping_add(i.wrapping_mul(h2)) % (self.num_bits as u64)) as u32
    }

    fn set_bit(&mut self, pos: u32) {
        self.bits[(pos / 64) as usize] |= 1 << (pos % 64);
    }

    fn check_bit(&self, pos: u32) -> bool {
        (self.bits[(pos / 64) as usize] >> (pos % 64)) & 1 == 1
    }
}

/// Hash a key and return two 64-bit hashes (h1, h2) for double hashing.
fn hash_key(key: &[u8]) -> (u64, u64) {
    let hash128 = xxh3_128(key);
    (hash128 as u64, (hash128 >> 64) as u64)
}
