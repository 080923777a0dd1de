//! The manifest records which table files make up the database, the log
//! that still needs replay, and the counters that must survive a restart.
//!
//! It is rewritten whole on every change: the new contents go to
//! `MANIFEST.tmp`, are fsynced, and replace `MANIFEST` by rename, so a crash
//! leaves either the old or the new manifest in place.

use std::path::{Path, PathBuf};

use crate::env::Env;
use crate::sstable::SSTableMeta;
use crate::sstable::footer::fixed;
use crate::status::{Result, Status};
use crate::types::SequenceNumber;

const MANIFEST_MAGIC: u64 = 0x4C534D4B_564D414E; // "LSMKVMAN"

pub const MANIFEST_FILE: &str = "MANIFEST";
pub(crate) const MANIFEST_TMP_FILE: &str = "MANIFEST.tmp";

/// Persistent database state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Name of the user comparator the database was created with.
    pub comparator: String,
    /// Logs numbered below this are fully reflected in tables.
    pub log_number: u64,
    /// Next unused file number (logs and tables share the space).
    pub next_file_number: u64,
    /// Highest sequence number persisted in a table.
    pub last_sequence: SequenceNumber,
    /// Live tables, oldest first.
    pub tables: Vec<SSTableMeta>,
}

impl Manifest {
    pub fn new(comparator: &str) -> Self {
        Manifest {
            comparator: comparator.to_string(),
            log_number: 0,
            next_file_number: 1,
            last_sequence: 0,
            tables: Vec::new(),
        }
    }

    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    /// Hand out a fresh file number.
    pub fn allocate_file_number(&mut self) -> u64 {
        let number = self.next_file_number;
        self.next_file_number += 1;
        number
    }

    /// Format:
    /// ```text
    /// [magic(8B)][cmp_len(4B)][cmp name][log_number(8B)][next_file(8B)]
    /// [last_seq(8B)][table_count(4B)] table* [crc32(4B)]
    /// table = [id(8B)][file_size(8B)][entries(8B)][max_seq(8B)]
    ///         [smallest_len(4B)][smallest][largest_len(4B)][largest]
    /// ```
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MANIFEST_MAGIC.to_le_bytes());
        put_bytes(&mut buf, self.comparator.as_bytes());
        buf.extend_from_slice(&self.log_number.to_le_bytes());
        buf.extend_from_slice(&self.next_file_number.to_le_bytes());
        buf.extend_from_slice(&self.last_sequence.to_le_bytes());
        buf.extend_from_slice(&(self.tables.len() as u32).to_le_bytes());
        for table in &self.tables {
            buf.extend_from_slice(&table.id.to_le_bytes());
            buf.extend_from_slice(&table.file_size.to_le_bytes());
            buf.extend_from_slice(&table.entry_count.to_le_bytes());
            buf.extend_from_slice(&table.max_sequence.to_le_bytes());
            put_bytes(&mut buf, &table.smallest);
            put_bytes(&mut buf, &table.largest);
        }
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(Status::corruption("manifest too short"));
        }
        let (body, crc) = data.split_at(data.len() - 4);
        if crc32fast::hash(body) != u32::from_le_bytes(fixed(crc)) {
            return Err(Status::corruption("manifest checksum mismatch"));
        }

        let mut cursor = Cursor { data: body };
        if cursor.u64()? != MANIFEST_MAGIC {
            return Err(Status::corruption("bad manifest magic"));
        }
        let comparator = String::from_utf8(cursor.bytes()?.to_vec())
            .map_err(|_| Status::corruption("comparator name is not utf-8"))?;
        let log_number = cursor.u64()?;
        let next_file_number = cursor.u64()?;
        let last_sequence = cursor.u64()?;
        let count = cursor.u32()? as usize;
        let mut tables = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let id = cursor.u64()?;
            let file_size = cursor.u64()?;
            let entry_count = cursor.u64()?;
            let max_sequence = cursor.u64()?;
            let smallest = cursor.bytes()?.to_vec();
            let largest = cursor.bytes()?.to_vec();
            tables.push(SSTableMeta {
                id,
                smallest,
                largest,
                file_size,
                entry_count,
                max_sequence,
            });
        }
        if !cursor.data.is_empty() {
            return Err(Status::corruption("trailing bytes in manifest"));
        }
        Ok(Manifest {
            comparator,
            log_number,
            next_file_number,
            last_sequence,
            tables,
        })
    }

    /// Load `<dir>/MANIFEST`.
    pub fn load(env: &dyn Env, dir: &Path) -> Result<Self> {
        let data = env.read_to_vec(&Self::path(dir))?;
        Self::decode(&data)
    }

    /// Atomically replace `<dir>/MANIFEST` with this state.
    pub fn store(&self, env: &dyn Env, dir: &Path) -> Result<()> {
        let tmp = dir.join(MANIFEST_TMP_FILE);
        let mut file = env.new_writable_file(&tmp)?;
        file.append(&self.encode())?;
        file.sync()?;
        drop(file);
        env.rename(&tmp, &Self::path(dir))?;
        Ok(())
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

struct Cursor<'a> {
    data: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() < n {
            return Err(Status::corruption("manifest truncated"));
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(fixed(self.take(4)?)))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(fixed(self.take(8)?)))
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::DefaultEnv;

    fn sample() -> Manifest {
        let mut manifest = Manifest::new("lsmkv.BytewiseComparator");
        manifest.log_number = 7;
        manifest.last_sequence = 42;
        manifest.next_file_number = 9;
        manifest.tables.push(SSTableMeta {
            id: 5,
            smallest: b"a\x01\x00\x00\x00\x00\x00\x00\x00".to_vec(),
            largest: b"z\x01\x00\x00\x00\x00\x00\x00\x00".to_vec(),
            file_size: 1234,
            entry_count: 10,
            max_sequence: 42,
        });
        manifest
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = sample();
        manifest.store(&DefaultEnv, dir.path()).unwrap();
        assert_eq!(Manifest::load(&DefaultEnv, dir.path()).unwrap(), manifest);
        assert!(!dir.path().join(MANIFEST_TMP_FILE).exists());
    }

    #[test]
    fn flipped_byte_is_corruption() {
        let mut encoded = sample().encode();
        encoded[20] ^= 0xFF;
        assert!(Manifest::decode(&encoded).unwrap_err().is_corruption());
    }

    #[test]
    fn file_numbers_are_unique() {
        let mut manifest = Manifest::new("cmp");
        let a = manifest.allocate_file_number();
        let b = manifest.allocate_file_number();
        assert_ne!(a, b);
        assert_eq!(manifest.next_file_number, b + 1);
    }
}
