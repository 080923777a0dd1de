use std::collections::BTreeMap;

use parking_lot::Mutex;

use crate::types::SequenceNumber;

/// Sequence numbers pinned by live snapshots.
///
/// Several snapshots may pin the same sequence, so this is a multiset.
/// The oldest pinned sequence bounds what a merge may garbage collect.
#[derive(Debug, Default)]
pub struct SnapshotList {
    pinned: Mutex<BTreeMap<SequenceNumber, usize>>,
}

impl SnapshotList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, sequence: SequenceNumber) {
        *self.pinned.lock().entry(sequence).or_insert(0) += 1;
    }

    /// Returns false if `sequence` was not pinned.
    pub fn release(&self, sequence: SequenceNumber) -> bool {
        let mut pinned = self.pinned.lock();
        match pinned.get_mut(&sequence) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                pinned.remove(&sequence);
                true
            }
            None => false,
        }
    }

    pub fn oldest(&self) -> Option<SequenceNumber> {
        self.pinned.lock().keys().next().copied()
    }

    /// Number of live snapshots.
    pub fn len(&self) -> usize {
        self.pinned.lock().values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.lock().is_empty()
    }
}
