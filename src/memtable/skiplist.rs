use std::cmp::Ordering;

use rand::Rng;

use crate::comparator::InternalKeyComparator;

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Each extra level is taken with probability 1/BRANCHING.
const BRANCHING: u32 = 4;

/// Index of the head sentinel in the node arena.
const HEAD: usize = 0;

/// A single node in the skip list.
///
/// Each node has `height` forward pointers. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
struct SkipNode {
    key: Vec<u8>,
    value: Vec<u8>,
    forward: Vec<Option<usize>>,
}

/// Arena-allocated skip list ordered by an [`InternalKeyComparator`].
///
/// Nodes are never removed, so a node index stays valid for the lifetime of
/// the list. Cursors over a shared list hold indices rather than borrows.
pub struct SkipList {
    nodes: Vec<SkipNode>,
    height: usize,
    len: usize,
    size_bytes: usize,
    cmp: InternalKeyComparator,
}

impl SkipList {
    /// Create a new empty skip list.
    pub fn new(cmp: InternalKeyComparator) -> Self {
        let head = SkipNode {
            key: Vec::new(),
            value: Vec::new(),
            forward: vec![None; MAX_HEIGHT],
        };
        SkipList {
            nodes: vec![head],
            height: 1,
            len: 0,
            size_bytes: 0,
            cmp,
        }
    }

    /// Insert a key-value pair. Overwrites if key already exists.
    ///
    /// Internal keys carry a unique sequence number, so overwrites only
    /// happen when the same write is replayed.
    pub fn insert(&mut self, key: Vec<u8>, value: Vec<u8>) {
        let mut prev = [HEAD; MAX_HEIGHT];
        let found = self.find_greater_or_equal_with_prev(&key, &mut prev);

        if let Some(idx) = found {
            if self.cmp.compare(&self.nodes[idx].key, &key) == Ordering::Equal {
                self.size_bytes = self.size_bytes - self.nodes[idx].value.len() + value.len();
                self.nodes[idx].value = value;
                return;
            }
        }

        let height = random_height();
        if height > self.height {
            for slot in prev.iter_mut().take(height).skip(self.height) {
                *slot = HEAD;
            }
            self.height = height;
        }

        let idx = self.nodes.len();
        self.size_bytes += key.len() + value.len() + height * std::mem::size_of::<usize>();
        let mut node = SkipNode {
            key,
            value,
            forward: vec![None; height],
        };
        for (level, &p) in prev.iter().enumerate().take(height) {
            node.forward[level] = self.nodes[p].forward[level];
        }
        self.nodes.push(node);
        for (level, &p) in prev.iter().enumerate().take(height) {
            self.nodes[p].forward[level] = Some(idx);
        }
        self.len += 1;
    }

    /// Look up an exact key. Returns the value if found.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let idx = self.find_greater_or_equal(key)?;
        let node = &self.nodes[idx];
        (self.cmp.compare(&node.key, key) == Ordering::Equal).then_some(node.value.as_slice())
    }

    /// Number of entries in the skip list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Approximate memory usage in bytes.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Create an iterator over all entries in sorted order.
    pub fn iter(&self) -> SkipListIterator<'_> {
        SkipListIterator {
            list: self,
            current: self.first(),
        }
    }

    pub(crate) fn key_at(&self, idx: usize) -> &[u8] {
        &self.nodes[idx].key
    }

    pub(crate) fn value_at(&self, idx: usize) -> &[u8] {
        &self.nodes[idx].value
    }

    pub(crate) fn first(&self) -> Option<usize> {
        self.nodes[HEAD].forward[0]
    }

    pub(crate) fn next_of(&self, idx: usize) -> Option<usize> {
        self.nodes[idx].forward[0]
    }

    /// First node whose key is >= `key`.
    pub(crate) fn find_greater_or_equal(&self, key: &[u8]) -> Option<usize> {
        let mut prev = [HEAD; MAX_HEIGHT];
        self.find_greater_or_equal_with_prev(key, &mut prev)
    }

    /// Last node whose key is < `key`, or `None` if there is none.
    pub(crate) fn find_less_than(&self, key: &[u8]) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            match self.nodes[x].forward[level] {
                Some(next) if self.cmp.compare(&self.nodes[next].key, key) == Ordering::Less => {
                    x = next;
                }
                _ => {
                    if level == 0 {
                        return (x != HEAD).then_some(x);
                    }
                    level -= 1;
                }
            }
        }
    }

    /// Last node in the list.
    pub(crate) fn last(&self) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            match self.nodes[x].forward[level] {
                Some(next) => x = next,
                None => {
                    if level == 0 {
                        return (x != HEAD).then_some(x);
                    }
                    level -= 1;
                }
            }
        }
    }

    fn find_greater_or_equal_with_prev(
        &self,
        key: &[u8],
        prev: &mut [usize; MAX_HEIGHT],
    ) -> Option<usize> {
        let mut x = HEAD;
        let mut level = self.height - 1;
        loop {
            let next = self.nodes[x].forward[level];
            match next {
                Some(n) if self.cmp.compare(&self.nodes[n].key, key) == Ordering::Less => {
                    x = n;
                }
                _ => {
                    prev[level] = x;
                    if level == 0 {
                        return next;
                    }
                    level -= 1;
                }
            }
        }
    }
}

/// Generate a random level for a new node.
/// Each level has a 1/4 probability (LevelDB uses 1/4, not 1/2).
fn random_height() -> usize {
    let mut rng = rand::thread_rng();
    let mut height = 1;
    while height < MAX_HEIGHT && rng.gen_range(0..BRANCHING) == 0 {
        height += 1;
    }
    height
}

/// Borrowing iterator over skip list entries in sorted order.
///
/// Simply follows level 0 forward pointers: level 0 is a sorted linked list
/// containing every entry.
pub struct SkipListIterator<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

impl<'a> Iterator for SkipListIterator<'a> {
    type Item = (&'a [u8], &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        self.current = self.list.next_of(idx);
        Some((self.list.key_at(idx), self.list.value_at(idx)))
    }
}
