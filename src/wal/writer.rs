use std::path::Path;

use crate::env::{Env, WritableFile};
use crate::status::Result;
use crate::wal::record::encode_payload;

/// Appends WAL records to one log file.
///
/// Each record is pushed to the OS before `append` returns, so a process
/// crash loses nothing. Surviving a machine crash additionally needs
/// `sync`, which callers request per write.
pub struct WALWriter {
    file: Box<dyn WritableFile>,
    offset: u64,
}

impl WALWriter {
    /// Create (or truncate) the log file at `path`.
    pub fn new(env: &dyn Env, path: &Path) -> Result<Self> {
        let file = env.new_writable_file(path)?;
        Ok(WALWriter { file, offset: 0 })
    }

    /// Append one record holding `payload`, fsyncing when `sync` is set.
    pub fn append(&mut self, payload: &[u8], sync: bool) -> Result<()> {
        let encoded = encode_payload(payload);
        self.file.append(&encoded)?;
        if sync {
            self.file.sync()?;
        } else {
            self.file.flush()?;
        }
        self.offset += encoded.len() as u64;
        Ok(())
    }

    /// Force fsync to disk.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync()?;
        Ok(())
    }

    /// Current file offset (bytes written so far).
    pub fn offset(&self) -> u64 {
        self.offset
    }
}
