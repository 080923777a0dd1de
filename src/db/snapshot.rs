use std::fmt;
use std::sync::Arc;

use crate::db::DbShared;
use crate::types::SequenceNumber;

/// A pinned, read-only view of a database at one point in time.
///
/// Pass it through [`crate::ReadOptions::snapshot`]. Dropping it (or
/// handing it to [`crate::DB::release_snapshot`]) releases the pin; a
/// database cannot close while snapshots are alive.
pub struct Snapshot {
    shared: Arc<DbShared>,
    sequence: SequenceNumber,
}

impl Snapshot {
    pub(crate) fn new(shared: Arc<DbShared>, sequence: SequenceNumber) -> Self {
        Snapshot { shared, sequence }
    }

    /// Sequence number of the last write visible through this snapshot.
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    pub(crate) fn db_id(&self) -> u64 {
        self.shared.id()
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        self.shared.release_snapshot(self.sequence);
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("sequence", &self.sequence)
            .finish()
    }
}
