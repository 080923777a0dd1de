use crate::sstable::footer::fixed;
use crate::status::{Result, Status};

/// A single record in the WAL. The payload is one encoded write batch.
///
/// On-disk format:
/// ```text
/// ┌──────────┬──────────┬─────────────────┐
/// │ CRC (4B) │ Len (4B) │ Payload (var)   │
/// └──────────┴──────────┴─────────────────┘
/// ```
///
/// CRC covers the length field and the payload.
/// If CRC doesn't match on read, the record was a partial write (crash mid-write)
/// or the file was damaged afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WALRecord {
    pub payload: Vec<u8>,
}

const CRC_SIZE: usize = 4;
const LEN_SIZE: usize = 4;
pub const HEADER_SIZE: usize = CRC_SIZE + LEN_SIZE;

impl WALRecord {
    pub fn new(payload: Vec<u8>) -> Self {
        WALRecord { payload }
    }

    /// Serialize this record to bytes (including CRC header).
    pub fn encode(&self) -> Vec<u8> {
        encode_payload(&self.payload)
    }

    /// Deserialize a record from the front of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(Status::corruption("record too short"));
        }
        let stored_crc = u32::from_le_bytes(fixed(&data[0..4]));
        let payload_len = u32::from_le_bytes(fixed(&data[4..8])) as usize;

        let total_len = HEADER_SIZE + payload_len;
        if data.len() < total_len {
            return Err(Status::corruption("record truncated"));
        }

        let computed_crc = crc32fast::hash(&data[CRC_SIZE..total_len]);
        if stored_crc != computed_crc {
            return Err(Status::corruption("CRC mismatch"));
        }

        Ok(WALRecord {
            payload: data[HEADER_SIZE..total_len].to_vec(),
        })
    }

    /// Size of this record when serialized on disk.
    pub fn encoded_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Frame `payload` without copying it into a [`WALRecord`] first.
pub(crate) fn encode_payload(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&[0u8; CRC_SIZE]);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    let crc = crc32fast::hash(&buf[CRC_SIZE..]);
    buf[0..CRC_SIZE].copy_from_slice(&crc.to_le_bytes());
    buf
}
