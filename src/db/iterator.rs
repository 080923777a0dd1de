use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::db::{DbShared, Snapshot};
use crate::engine::db_iter::DBIter;
use crate::error::{Error, Result};

/// Position state of a [`DbIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    /// Created, not yet seeked.
    Unpositioned,
    /// At an entry: `key`, `value`, `next` and `prev` are allowed.
    Valid,
    /// Ran off either end, or hit an engine error. Seeking again is allowed.
    Invalid,
}

/// Cursor over a database's keys in comparator order.
///
/// Sees one consistent state fixed at creation (or by the snapshot it was
/// created with). Not for concurrent use from several threads; separate
/// iterators may run on separate threads. The database cannot close while
/// an iterator is alive, and the lifetime ties it to the snapshot it reads.
///
/// Exhaustion and failure both end in [`IterState::Invalid`]; only a
/// failure sets [`DbIterator::error`]. A successful seek clears it.
pub struct DbIterator<'a> {
    inner: DBIter,
    shared: Arc<DbShared>,
    state: IterState,
    error: Option<Error>,
    _snapshot: PhantomData<&'a Snapshot>,
}

impl<'a> DbIterator<'a> {
    pub(crate) fn new(inner: DBIter, shared: Arc<DbShared>) -> Self {
        DbIterator {
            inner,
            shared,
            state: IterState::Unpositioned,
            error: None,
            _snapshot: PhantomData,
        }
    }

    pub fn state(&self) -> IterState {
        self.state
    }

    pub fn valid(&self) -> bool {
        self.state == IterState::Valid
    }

    pub fn seek_to_first(&mut self) {
        self.inner.seek_to_first();
        self.settle();
    }

    pub fn seek_to_last(&mut self) {
        self.inner.seek_to_last();
        self.settle();
    }

    /// Position at the first key >= `key`.
    pub fn seek(&mut self, key: impl AsRef<[u8]>) {
        self.inner.seek(key.as_ref());
        self.settle();
    }

    pub fn next(&mut self) -> Result<()> {
        self.require_valid()?;
        self.inner.next();
        self.settle();
        Ok(())
    }

    pub fn prev(&mut self) -> Result<()> {
        self.require_valid()?;
        self.inner.prev();
        self.settle();
        Ok(())
    }

    pub fn key(&self) -> Result<&[u8]> {
        self.require_valid()?;
        Ok(self.inner.key())
    }

    pub fn value(&self) -> Result<&[u8]> {
        self.require_valid()?;
        Ok(self.inner.value())
    }

    /// The engine error that stopped this iterator, if any. `None` after
    /// plain exhaustion, and cleared by the next seek.
    pub fn error(&self) -> Option<&Error> {
        self.error.as_ref()
    }

    /// Release the iterator. Same as dropping it.
    pub fn close(self) {}

    fn require_valid(&self) -> Result<()> {
        match self.state {
            IterState::Valid => Ok(()),
            _ => Err(Error::InvalidIterator),
        }
    }

    fn settle(&mut self) {
        self.error = self
            .inner
            .status()
            .map(|status| Error::Engine(status.to_string()));
        self.state = if self.inner.valid() {
            IterState::Valid
        } else {
            IterState::Invalid
        };
    }
}

impl Drop for DbIterator<'_> {
    fn drop(&mut self) {
        self.shared.iterator_dropped();
    }
}

impl fmt::Debug for DbIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbIterator")
            .field("state", &self.state)
            .field("error", &self.error)
            .finish()
    }
}
