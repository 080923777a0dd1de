use std::path::Path;

use crate::env::Env;
use crate::status::Result;
use crate::wal::record::WALRecord;

/// Reads WAL records from a file for crash recovery.
///
/// Loads the entire file into memory, then iterates record by record.
/// On startup every log newer than the manifest's log number is replayed
/// into a fresh memtable.
pub struct WALReader {
    data: Vec<u8>,
}

impl WALReader {
    /// Open a WAL file for reading.
    pub fn new(env: &dyn Env, path: &Path) -> Result<Self> {
        let data = env.read_to_vec(path)?;
        Ok(WALReader { data })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        WALReader { data }
    }

    /// Create an iterator over the records in the WAL.
    pub fn iter(&self) -> WALIterator<'_> {
        WALIterator {
            data: &self.data,
            offset: 0,
            failed: false,
        }
    }
}

/// Iterator over WAL records.
///
/// On a damaged or truncated record it yields the corruption once and then
/// stops: nothing after a bad record can be trusted. The caller decides
/// whether that ends recovery quietly (a torn tail) or fails it.
pub struct WALIterator<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl WALIterator<'_> {
    /// Bytes consumed by the records yielded so far.
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl Iterator for WALIterator<'_> {
    type Item = Result<WALRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        match WALRecord::decode(&self.data[self.offset..]) {
            Ok(record) => {
                self.offset += record.encoded_size();
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
