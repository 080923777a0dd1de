use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::status::Status;

/// Errors returned by the public handle API.
///
/// A missing key is not an error: [`crate::DB::get`] returns `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The database could not be opened (missing or existing per the flags,
    /// lock contention, corruption, rejected options).
    #[error("cannot open database at {}: {message}", path.display())]
    Open { path: PathBuf, message: String },

    /// The engine reported a failure while serving an operation.
    #[error("engine error: {0}")]
    Engine(String),

    /// An operation was attempted on a handle after it was closed.
    #[error("{0} handle is closed")]
    ClosedHandle(&'static str),

    /// A resource was used or released out of the required order.
    #[error("lifecycle violation: {0}")]
    Lifecycle(String),

    /// Key, Value, Next or Prev was called on an iterator that is not
    /// positioned at an entry.
    #[error("iterator is not positioned at a valid entry")]
    InvalidIterator,
}

impl Error {
    pub(crate) fn open(path: &Path, status: Status) -> Self {
        Error::Open {
            path: path.to_path_buf(),
            message: status.to_string(),
        }
    }
}

impl From<Status> for Error {
    fn from(status: Status) -> Self {
        Error::Engine(status.to_string())
    }
}

/// Result type alias for the public API.
pub type Result<T> = std::result::Result<T, Error>;
