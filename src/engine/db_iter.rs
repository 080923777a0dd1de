use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparator::Comparator;
use crate::iterator::{MergeIterator, StorageIterator};
use crate::status::{Result, Status};
use crate::types::{ParsedInternalKey, SequenceNumber, ValueType, lookup_key, user_key_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// User-key view over the merged internal-key stream.
///
/// Hides entries newer than `sequence`, collapses each user key to its
/// newest visible version, and skips keys whose newest visible version is
/// a tombstone.
///
/// Moving forward, the merged iterator sits on the entry being exposed.
/// Moving backward, it sits just before every entry of the exposed key,
/// whose user key and value are held in `saved_key`/`saved_value`.
pub struct DBIter {
    iter: MergeIterator,
    ucmp: Arc<dyn Comparator>,
    sequence: SequenceNumber,
    direction: Direction,
    valid: bool,
    saved_key: Vec<u8>,
    saved_value: Vec<u8>,
    status: Option<Status>,
}

impl DBIter {
    pub fn new(iter: MergeIterator, ucmp: Arc<dyn Comparator>, sequence: SequenceNumber) -> Self {
        DBIter {
            iter,
            ucmp,
            sequence,
            direction: Direction::Forward,
            valid: false,
            saved_key: Vec::new(),
            saved_value: Vec::new(),
            status: None,
        }
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Current user key. Empty when not valid.
    pub fn key(&self) -> &[u8] {
        if !self.valid {
            return &[];
        }
        match self.direction {
            Direction::Forward => user_key_of(self.iter.key()),
            Direction::Reverse => &self.saved_key,
        }
    }

    pub fn value(&self) -> &[u8] {
        if !self.valid {
            return &[];
        }
        match self.direction {
            Direction::Forward => self.iter.value(),
            Direction::Reverse => &self.saved_value,
        }
    }

    /// First engine error hit since the last seek, if any.
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    pub fn seek_to_first(&mut self) {
        self.status = None;
        let result = self.seek_to_first_inner();
        self.settle(result);
    }

    pub fn seek_to_last(&mut self) {
        self.status = None;
        let result = self.seek_to_last_inner();
        self.settle(result);
    }

    /// Position at the first user key >= `target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.status = None;
        let result = self.seek_inner(target);
        self.settle(result);
    }

    pub fn next(&mut self) {
        if !self.valid {
            return;
        }
        let result = self.next_inner();
        self.settle(result);
    }

    pub fn prev(&mut self) {
        if !self.valid {
            return;
        }
        let result = self.prev_inner();
        self.settle(result);
    }

    fn settle(&mut self, result: Result<()>) {
        if let Err(e) = result {
            tracing::debug!(error = %e, "iterator stopped on engine error");
            self.valid = false;
            self.saved_key.clear();
            self.saved_value.clear();
            if self.status.is_none() {
                self.status = Some(e);
            }
        }
    }

    fn seek_to_first_inner(&mut self) -> Result<()> {
        self.direction = Direction::Forward;
        self.saved_value.clear();
        self.iter.seek_to_first()?;
        if self.iter.is_valid() {
            self.find_next_user_entry(false)
        } else {
            self.valid = false;
            Ok(())
        }
    }

    fn seek_to_last_inner(&mut self) -> Result<()> {
        self.direction = Direction::Reverse;
        self.saved_value.clear();
        self.iter.seek_to_last()?;
        self.find_prev_user_entry()
    }

    fn seek_inner(&mut self, target: &[u8]) -> Result<()> {
        self.direction = Direction::Forward;
        self.saved_key.clear();
        self.saved_value.clear();
        self.iter.seek(&lookup_key(target, self.sequence))?;
        if self.iter.is_valid() {
            self.find_next_user_entry(false)
        } else {
            self.valid = false;
            Ok(())
        }
    }

    fn next_inner(&mut self) -> Result<()> {
        if self.direction == Direction::Reverse {
            self.direction = Direction::Forward;
            // The merged iterator sits before the entries of key(); step
            // into them. saved_key already holds the key to skip past.
            if self.iter.is_valid() {
                self.iter.next()?;
            } else {
                self.iter.seek_to_first()?;
            }
        } else {
            self.saved_key.clear();
            self.saved_key.extend_from_slice(user_key_of(self.iter.key()));
            self.iter.next()?;
        }
        if !self.iter.is_valid() {
            self.valid = false;
            self.saved_key.clear();
            return Ok(());
        }
        self.find_next_user_entry(true)
    }

    fn prev_inner(&mut self) -> Result<()> {
        if self.direction == Direction::Forward {
            // Back up to the last entry of the previous user key.
            self.saved_key.clear();
            self.saved_key.extend_from_slice(user_key_of(self.iter.key()));
            loop {
                self.iter.prev()?;
                if !self.iter.is_valid() {
                    self.valid = false;
                    self.saved_key.clear();
                    self.saved_value.clear();
                    return Ok(());
                }
                if self.ucmp.compare(user_key_of(self.iter.key()), &self.saved_key) == Ordering::Less {
                    break;
                }
            }
            self.direction = Direction::Reverse;
        }
        self.find_prev_user_entry()
    }

    /// Forward scan to the newest visible put of a user key. With
    /// `skipping`, entries for user keys <= `saved_key` are hidden.
    fn find_next_user_entry(&mut self, mut skipping: bool) -> Result<()> {
        loop {
            let parsed = ParsedInternalKey::parse(self.iter.key())?;
            if parsed.sequence <= self.sequence {
                match parsed.value_type {
                    ValueType::Delete => {
                        self.saved_key.clear();
                        self.saved_key.extend_from_slice(parsed.user_key);
                        skipping = true;
                    }
                    ValueType::Put => {
                        let hidden = skipping
                            && self.ucmp.compare(parsed.user_key, &self.saved_key) != Ordering::Greater;
                        if !hidden {
                            self.valid = true;
                            self.saved_key.clear();
                            return Ok(());
                        }
                    }
                }
            }
            self.iter.next()?;
            if !self.iter.is_valid() {
                break;
            }
        }
        self.saved_key.clear();
        self.valid = false;
        Ok(())
    }

    /// Backward scan collecting the newest visible version of the user key
    /// that precedes the merged iterator's position.
    fn find_prev_user_entry(&mut self) -> Result<()> {
        let mut value_type = ValueType::Delete;
        while self.iter.is_valid() {
            let parsed = ParsedInternalKey::parse(self.iter.key())?;
            if parsed.sequence <= self.sequence {
                if value_type != ValueType::Delete
                    && self.ucmp.compare(parsed.user_key, &self.saved_key) == Ordering::Less
                {
                    // Reached an entry of an earlier user key.
                    break;
                }
                value_type = parsed.value_type;
                self.saved_key.clear();
                self.saved_value.clear();
                if value_type == ValueType::Put {
                    self.saved_key.extend_from_slice(parsed.user_key);
                    self.saved_value.extend_from_slice(self.iter.value());
                }
            }
            self.iter.prev()?;
        }

        if value_type == ValueType::Delete {
            self.valid = false;
            self.saved_key.clear();
            self.saved_value.clear();
            self.direction = Direction::Forward;
        } else {
            self.valid = true;
        }
        Ok(())
    }
}
