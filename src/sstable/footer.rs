use crate::status::{Result, Status};

/// Magic number to identify table files.
pub const SSTABLE_MAGIC: u64 = 0x4C534D4B_56535354; // "LSMKVSST"

/// Metadata about a table file, stored in the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSTableMeta {
    /// File number; the file is `<id>.sst`.
    pub id: u64,
    /// Smallest internal key in the table.
    pub smallest: Vec<u8>,
    /// Largest internal key in the table.
    pub largest: Vec<u8>,
    /// File size in bytes.
    pub file_size: u64,
    /// Number of entries (including tombstones).
    pub entry_count: u64,
    /// Largest sequence number of any entry.
    pub max_sequence: u64,
}

/// An entry in the table's index block.
/// Maps a block's last key to its location in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Last (largest) internal key in the block.
    pub last_key: Vec<u8>,
    /// Byte offset of the block in the file.
    pub offset: u64,
    /// Size of the block contents in bytes, excluding its trailer.
    pub size: u64,
}

impl IndexEntry {
    /// Encode this index entry to bytes.
    /// Format: [key_len(4B)][key][offset(8B)][size(8B)]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + self.last_key.len() + 16);
        buf.extend_from_slice(&(self.last_key.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.last_key);
        buf.extend_from_slice(&self.offset.to_le_bytes());
        buf.extend_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Decode an index entry from bytes, returning (entry, bytes_consumed).
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.len() < 4 {
            return Err(Status::corruption("index entry too short"));
        }
        let key_len = u32::from_le_bytes(fixed(&data[0..4])) as usize;
        let total = 4 + key_len + 16;
        if data.len() < total {
            return Err(Status::corruption("index entry truncated"));
        }
        let last_key = data[4..4 + key_len].to_vec();
        let offset = u64::from_le_bytes(fixed(&data[4 + key_len..12 + key_len]));
        let size = u64::from_le_bytes(fixed(&data[12 + key_len..20 + key_len]));
        Ok((IndexEntry { last_key, offset, size }, total))
    }
}

/// The footer sits at the end of the table file.
/// It tells the reader where to find the index block and the filter block.
///
/// ```text
/// ┌──────────────────────────────────────┐
/// │ Index block offset (8B)              │
/// │ Index block size (8B)                │
/// │ Filter block offset (8B)             │
/// │ Filter block size (8B)               │
/// │ Entry count (8B)                     │
/// │ Max sequence (8B)                    │
/// │ Magic number (8B)                    │
/// └──────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    pub index_block_offset: u64,
    pub index_block_size: u64,
    pub filter_block_offset: u64,
    pub filter_block_size: u64,
    pub entry_count: u64,
    pub max_sequence: u64,
    pub magic: u64,
}

impl Footer {
    /// Size of the footer in bytes (fixed).
    pub const SIZE: usize = 8 * 7;

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.index_block_offset.to_le_bytes());
        buf.extend_from_slice(&self.index_block_size.to_le_bytes());
        buf.extend_from_slice(&self.filter_block_offset.to_le_bytes());
        buf.extend_from_slice(&self.filter_block_size.to_le_bytes());
        buf.extend_from_slice(&self.entry_count.to_le_bytes());
        buf.extend_from_slice(&self.max_sequence.to_le_bytes());
        buf.extend_from_slice(&self.magic.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Status::corruption("footer too short"));
        }
        let magic = u64::from_le_bytes(fixed(&data[48..56]));
        if magic != SSTABLE_MAGIC {
            return Err(Status::corruption(format!(
                "bad magic: expected {SSTABLE_MAGIC:#x}, got {magic:#x}"
            )));
        }
        Ok(Footer {
            index_block_offset: u64::from_le_bytes(fixed(&data[0..8])),
            index_block_size: u64::from_le_bytes(fixed(&data[8..16])),
            filter_block_offset: u64::from_le_bytes(fixed(&data[16..24])),
            filter_block_size: u64::from_le_bytes(fixed(&data[24..32])),
            entry_count: u64::from_le_bytes(fixed(&data[32..40])),
            max_sequence: u64::from_le_bytes(fixed(&data[40..48])),
            magic,
        })
    }
}

pub(crate) fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
