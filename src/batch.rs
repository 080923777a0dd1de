use crate::sstable::footer::fixed;
use crate::status::{Result, Status};
use crate::types::{SequenceNumber, ValueType};

/// One buffered mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn key(&self) -> &[u8] {
        match self {
            BatchOp::Put { key, .. } | BatchOp::Delete { key } => key,
        }
    }
}

/// An ordered group of puts and deletes applied atomically by
/// [`crate::DB::write`].
///
/// Entries are applied in insertion order, so a later entry for a key
/// overrides an earlier one. The batch never touches storage itself and is
/// independent of any database: it can be built, applied, cleared and reused.
/// Mutation needs `&mut self`; a finished batch can be applied from any
/// thread.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
    approximate_size: usize,
}

// Encoded layout, used as the WAL record payload:
//   [sequence u64][count u32] then per entry
//   [type u8][key_len u32][key] and, for puts, [value_len u32][value]
const HEADER_SIZE: usize = 12;

impl WriteBatch {
    pub fn new() -> Self {
        WriteBatch::default()
    }

    /// Append a put. The key and value are copied.
    pub fn put(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) {
        let (key, value) = (key.as_ref().to_vec(), value.as_ref().to_vec());
        self.approximate_size += 9 + key.len() + value.len();
        self.ops.push(BatchOp::Put { key, value });
    }

    /// Append a delete. Deleting an absent key is not an error when applied.
    pub fn delete(&mut self, key: impl AsRef<[u8]>) {
        let key = key.as_ref().to_vec();
        self.approximate_size += 5 + key.len();
        self.ops.push(BatchOp::Delete { key });
    }

    /// Drop every entry, returning the batch to its empty state.
    pub fn clear(&mut self) {
        self.ops.clear();
        self.approximate_size = 0;
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &BatchOp> {
        self.ops.iter()
    }

    /// Size of the encoded batch, excluding its header.
    pub fn approximate_size(&self) -> usize {
        self.approximate_size
    }

    /// Append every entry of `other`, preserving its order.
    pub fn append(&mut self, other: &WriteBatch) {
        self.ops.extend(other.ops.iter().cloned());
        self.approximate_size += other.approximate_size;
    }

    pub(crate) fn encode(&self, sequence: SequenceNumber) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.approximate_size);
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&(self.ops.len() as u32).to_le_bytes());
        for op in &self.ops {
            match op {
                BatchOp::Put { key, value } => {
                    buf.push(ValueType::Put as u8);
                    put_length_prefixed(&mut buf, key);
                    put_length_prefixed(&mut buf, value);
                }
                BatchOp::Delete { key } => {
                    buf.push(ValueType::Delete as u8);
                    put_length_prefixed(&mut buf, key);
                }
            }
        }
        buf
    }

    pub(crate) fn decode(data: &[u8]) -> Result<(SequenceNumber, WriteBatch)> {
        if data.len() < HEADER_SIZE {
            return Err(Status::corruption("write batch header too short"));
        }
        let sequence = u64::from_le_bytes(fixed(&data[0..8]));
        let count = u32::from_le_bytes(fixed(&data[8..12])) as usize;

        let mut batch = WriteBatch::new();
        let mut rest = &data[HEADER_SIZE..];
        for _ in 0..count {
            let (&tag, tail) = rest
                .split_first()
                .ok_or_else(|| Status::corruption("write batch truncated"))?;
            let (key, tail) = take_length_prefixed(tail)?;
            rest = match ValueType::from_u8(tag)? {
                ValueType::Put => {
                    let (value, tail) = take_length_prefixed(tail)?;
                    batch.put(key, value);
                    tail
                }
                ValueType::Delete => {
                    batch.delete(key);
                    tail
                }
            };
        }
        if !rest.is_empty() {
            return Err(Status::corruption("write batch has trailing bytes"));
        }
        Ok((sequence, batch))
    }
}

fn put_length_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn take_length_prefixed(data: &[u8]) -> Result<(&[u8], &[u8])> {
    if data.len() < 4 {
        return Err(Status::corruption("write batch truncated"));
    }
    let len = u32::from_le_bytes(fixed(&data[0..4])) as usize;
    let body = &data[4..];
    if body.len() < len {
        return Err(Status::corruption("write batch entry exceeds record"));
    }
    Ok(body.split_at(len))
}
