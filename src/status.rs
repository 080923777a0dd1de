use std::io;

use thiserror::Error;

/// Failure reported by the storage engine.
///
/// Every storage module (WAL, memtable, tables, manifest) returns this type.
/// Its `Display` text is the engine message that the handle layer carries
/// into [`crate::Error`].
#[derive(Debug, Error)]
pub enum Status {
    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption detected (CRC mismatch, bad format, etc).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// A caller-supplied argument or option was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A required file or database does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A database exists where none was expected.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The database directory is locked by another handle.
    #[error("Busy: {0}")]
    Busy(String),
}

impl Status {
    pub fn corruption(msg: impl Into<String>) -> Self {
        Status::Corruption(msg.into())
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self, Status::Corruption(_))
    }

    /// Copy of this status for reporting it more than once.
    pub(crate) fn duplicate(&self) -> Status {
        match self {
            Status::Io(e) => Status::Io(io::Error::new(e.kind(), e.to_string())),
            Status::Corruption(m) => Status::Corruption(m.clone()),
            Status::InvalidArgument(m) => Status::InvalidArgument(m.clone()),
            Status::NotFound(m) => Status::NotFound(m.clone()),
            Status::AlreadyExists(m) => Status::AlreadyExists(m.clone()),
            Status::Busy(m) => Status::Busy(m.clone()),
        }
    }
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Status>;
