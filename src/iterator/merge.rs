use std::cmp::Ordering;

use crate::comparator::InternalKeyComparator;
use crate::iterator::StorageIterator;
use crate::status::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

/// Merges multiple sorted iterators into a single sorted stream.
///
/// Used for:
/// - Range scans across the memtable and every table
/// - Compaction (merging tables)
///
/// Every version of every key is yielded in internal key order (user key
/// ASC, sequence DESC); visibility and tombstone filtering happen above.
/// Children are scanned linearly: there are only ever a handful of them.
pub struct MergeIterator {
    children: Vec<Box<dyn StorageIterator>>,
    current: Option<usize>,
    direction: Direction,
    cmp: InternalKeyComparator,
}

impl MergeIterator {
    /// Create a new MergeIterator from multiple sorted sources. The result
    /// is unpositioned until one of the seek methods is called.
    pub fn new(cmp: InternalKeyComparator, children: Vec<Box<dyn StorageIterator>>) -> Self {
        MergeIterator {
            children,
            current: None,
            direction: Direction::Forward,
            cmp,
        }
    }

    fn find_smallest(&mut self) {
        let mut smallest: Option<usize> = None;
        for (i, child) in self.children.iter().enumerate() {
            if !child.is_valid() {
                continue;
            }
            smallest = match smallest {
                Some(s) if self.cmp.compare(child.key(), self.children[s].key()) != Ordering::Less => {
                    Some(s)
                }
                _ => Some(i),
            };
        }
        self.current = smallest;
    }

    fn find_largest(&mut self) {
        let mut largest: Option<usize> = None;
        for (i, child) in self.children.iter().enumerate().rev() {
            if !child.is_valid() {
                continue;
            }
            largest = match largest {
                Some(l) if self.cmp.compare(child.key(), self.children[l].key()) != Ordering::Greater => {
                    Some(l)
                }
                _ => Some(i),
            };
        }
        self.current = largest;
    }
}

impl StorageIterator for MergeIterator {
    fn key(&self) -> &[u8] {
        match self.current {
            Some(i) => self.children[i].key(),
            None => &[],
        }
    }

    fn value(&self) -> &[u8] {
        match self.current {
            Some(i) => self.children[i].value(),
            None => &[],
        }
    }

    fn is_valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.seek_to_first()?;
        }
        self.find_smallest();
        self.direction = Direction::Forward;
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.seek_to_last()?;
        }
        self.find_largest();
        self.direction = Direction::Reverse;
        Ok(())
    }

    fn seek(&mut self, key: &[u8]) -> Result<()> {
        for child in &mut self.children {
            child.seek(key)?;
        }
        self.find_smallest();
        self.direction = Direction::Forward;
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        let Some(cur) = self.current else {
            return Ok(());
        };

        // Every non-current child must sit after key() before moving forward.
        if self.direction != Direction::Forward {
            let key = self.children[cur].key().to_vec();
            for (i, child) in self.children.iter_mut().enumerate() {
                if i == cur {
                    continue;
                }
                child.seek(&key)?;
                if child.is_valid() && self.cmp.compare(&key, child.key()) == Ordering::Equal {
                    child.next()?;
                }
            }
            self.direction = Direction::Forward;
        }

        self.children[cur].next()?;
        self.find_smallest();
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        let Some(cur) = self.current else {
            return Ok(());
        };

        // Every non-current child must sit before key() before moving back.
        if self.direction != Direction::Reverse {
            let key = self.children[cur].key().to_vec();
            for (i, child) in self.children.iter_mut().enumerate() {
                if i == cur {
                    continue;
                }
                child.seek(&key)?;
                if child.is_valid() {
                    child.prev()?;
                } else {
                    child.seek_to_last()?;
                }
            }
            self.direction = Direction::Reverse;
        }

        self.children[cur].prev()?;
        self.find_largest();
        Ok(())
    }
}
