use crate::status::{Result, Status};

/// Monotonically increasing counter assigned to every write. A batch
/// consumes one sequence number per entry.
pub type SequenceNumber = u64;

/// Largest sequence number that fits the 56 bits of an internal key trailer.
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Distinguishes puts from deletes in the storage engine.
/// A Delete writes a tombstone; the key isn't removed, it's marked as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// A normal put operation.
    Put = 0x01,
    /// A delete (tombstone marker).
    Delete = 0x02,
}

/// Entries at one sequence number sort by descending type, so seeking with
/// the highest type lands before every entry at that sequence.
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Delete;

impl ValueType {
    pub fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(ValueType::Put),
            0x02 => Ok(ValueType::Delete),
            _ => Err(Status::corruption(format!("invalid value type: {byte}"))),
        }
    }
}

/// Internal key format: user key + sequence number + value type.
///
/// Encoded as the user key followed by an 8-byte little-endian trailer
/// `(sequence << 8) | type`. Ordering is (user_key ASC, trailer DESC), so the
/// newest version of a key always comes first during merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(Status::corruption("internal key too short"));
        }
        let split = data.len() - 8;
        let trailer = trailer_of(data);
        Ok(ParsedInternalKey {
            user_key: &data[..split],
            sequence: trailer >> 8,
            value_type: ValueType::from_u8((trailer & 0xff) as u8)?,
        })
    }
}

pub fn encode_internal_key(user_key: &[u8], sequence: SequenceNumber, value_type: ValueType) -> Vec<u8> {
    let mut buf = Vec::with_capacity(user_key.len() + 8);
    buf.extend_from_slice(user_key);
    buf.extend_from_slice(&pack_trailer(sequence, value_type).to_le_bytes());
    buf
}

/// The key that positions a seek at the newest entry for `user_key` visible
/// at `sequence`.
pub fn lookup_key(user_key: &[u8], sequence: SequenceNumber) -> Vec<u8> {
    encode_internal_key(user_key, sequence, VALUE_TYPE_FOR_SEEK)
}

/// User-key part of an encoded internal key. Callers only pass keys produced
/// by [`encode_internal_key`].
pub fn user_key_of(internal_key: &[u8]) -> &[u8] {
    &internal_key[..internal_key.len().saturating_sub(8)]
}

pub(crate) fn trailer_of(internal_key: &[u8]) -> u64 {
    let mut raw = [0u8; 8];
    if internal_key.len() >= 8 {
        raw.copy_from_slice(&internal_key[internal_key.len() - 8..]);
    }
    u64::from_le_bytes(raw)
}

fn pack_trailer(sequence: SequenceNumber, value_type: ValueType) -> u64 {
    debug_assert!(sequence <= MAX_SEQUENCE_NUMBER);
    (sequence << 8) | value_type as u64
}
