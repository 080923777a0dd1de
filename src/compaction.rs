//! Writing tables from sorted internal-key streams.
//!
//! Two callers: memtable flush, which keeps every entry, and the full
//! merge, which rewrites all live tables into one and drops what no reader
//! can observe any more.

use std::cmp::Ordering;
use std::path::Path;

use crate::comparator::InternalKeyComparator;
use crate::env::Env;
use crate::iterator::StorageIterator;
use crate::sstable::{SSTableBuilder, SSTableMeta, TableOptions, table_file_name};
use crate::status::Result;
use crate::types::{MAX_SEQUENCE_NUMBER, ParsedInternalKey, SequenceNumber, ValueType};

/// Merge once this many tables are live.
pub const COMPACTION_TRIGGER: usize = 4;

/// Garbage collection applied while merging into the bottom table.
#[derive(Debug, Clone, Copy)]
pub struct Retention {
    /// Oldest sequence any live snapshot (or the latest state) reads at.
    pub smallest_snapshot: SequenceNumber,
}

pub fn needs_compaction(table_count: usize) -> bool {
    table_count >= COMPACTION_TRIGGER
}

/// Drain `iter` from its first entry into table `<dir>/<id>.sst`.
///
/// With `retention`, an entry is dropped when a newer entry for the same
/// user key is visible to every reader, and a tombstone is dropped when it
/// is itself visible to every reader (the output is the only table, so
/// there is nothing older for it to hide).
///
/// Returns `None` and leaves no file behind if nothing survives.
pub fn build_table(
    env: &dyn Env,
    dir: &Path,
    id: u64,
    iter: &mut dyn StorageIterator,
    options: &TableOptions,
    cmp: &InternalKeyComparator,
    retention: Option<Retention>,
) -> Result<Option<SSTableMeta>> {
    let path = table_file_name(dir, id);
    let result = write_entries(env, &path, id, iter, options, cmp, retention);
    match result {
        Ok(Some(meta)) => Ok(Some(meta)),
        other => {
            if env.file_exists(&path) {
                if let Err(e) = env.remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove unused table");
                }
            }
            other
        }
    }
}

fn write_entries(
    env: &dyn Env,
    path: &Path,
    id: u64,
    iter: &mut dyn StorageIterator,
    options: &TableOptions,
    cmp: &InternalKeyComparator,
    retention: Option<Retention>,
) -> Result<Option<SSTableMeta>> {
    let mut builder = SSTableBuilder::new(env, path, id, options.clone())?;
    let mut current_user_key: Option<Vec<u8>> = None;
    let mut last_sequence_for_key = MAX_SEQUENCE_NUMBER;
    let mut dropped = 0u64;

    iter.seek_to_first()?;
    while iter.is_valid() {
        let parsed = ParsedInternalKey::parse(iter.key())?;
        let drop = match retention {
            None => false,
            Some(Retention { smallest_snapshot }) => {
                let first_occurrence = current_user_key
                    .as_deref()
                    .is_none_or(|k| cmp.compare_user(k, parsed.user_key) != Ordering::Equal);
                if first_occurrence {
                    current_user_key = Some(parsed.user_key.to_vec());
                    last_sequence_for_key = MAX_SEQUENCE_NUMBER;
                }
                let drop = if last_sequence_for_key <= smallest_snapshot {
                    // Shadowed by a newer entry every reader sees.
                    true
                } else {
                    parsed.value_type == ValueType::Delete && parsed.sequence <= smallest_snapshot
                };
                last_sequence_for_key = parsed.sequence;
                drop
            }
        };

        if drop {
            dropped += 1;
        } else {
            builder.add(iter.key(), iter.value())?;
        }
        iter.next()?;
    }

    if builder.entry_count() == 0 {
        return Ok(None);
    }
    let meta = builder.finish()?;
    tracing::debug!(table = id, entries = meta.entry_count, dropped, "table written");
    Ok(Some(meta))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::env::DefaultEnv;
    use crate::memtable::MemTable;
    use crate::options::Compression;
    use crate::sstable::{BlockReadOptions, SSTable};

    fn table_options() -> TableOptions {
        TableOptions {
            block_size: 256,
            compression: Compression::None,
            filter_policy: None,
        }
    }

    fn user_keys(table: &Arc<SSTable>) -> Vec<(Vec<u8>, u64)> {
        let mut it = table.iter(BlockReadOptions::verified());
        it.seek_to_first().unwrap();
        let mut out = Vec::new();
        while it.is_valid() {
            let parsed = ParsedInternalKey::parse(it.key()).unwrap();
            out.push((parsed.user_key.to_vec(), parsed.sequence));
            it.next().unwrap();
        }
        out
    }

    #[test]
    fn merge_drops_shadowed_versions_and_tombstones() {
        let dir = tempfile::tempdir().unwrap();
        let cmp = InternalKeyComparator::default();
        let mem = Arc::new(MemTable::new(cmp.clone()));
        mem.add(1, ValueType::Put, b"a", b"old");
        mem.add(2, ValueType::Put, b"a", b"new");
        mem.add(3, ValueType::Put, b"b", b"gone");
        mem.add(4, ValueType::Delete, b"b", b"");
        mem.add(5, ValueType::Put, b"c", b"kept");

        let mut iter = mem.iter();
        let meta = build_table(
            &DefaultEnv,
            dir.path(),
            1,
            &mut iter,
            &table_options(),
            &cmp,
            Some(Retention { smallest_snapshot: 5 }),
        )
        .unwrap()
        .unwrap();
        assert_eq!(meta.entry_count, 2);

        let table = Arc::new(
            SSTable::open(
                Arc::new(DefaultEnv),
                &table_file_name(dir.path(), 1),
                1,
                table_options(),
                cmp,
                None,
            )
            .unwrap(),
        );
        assert_eq!(user_keys(&table), vec![(b"a".to_vec(), 2), (b"c".to_vec(), 5)]);
    }

    #[test]
    fn snapshot_keeps_the_version_it_reads() {
        let dir = tempfile::tempdir().unwrap();
        let cmp = InternalKeyComparator::default();
        let mem = Arc::new(MemTable::new(cmp.clone()));
        mem.add(1, ValueType::Put, b"a", b"v1");
        mem.add(2, ValueType::Put, b"a", b"v2");
        mem.add(3, ValueType::Delete, b"a", b"");

        let mut iter = mem.iter();
        let meta = build_table(
            &DefaultEnv,
            dir.path(),
            2,
            &mut iter,
            &table_options(),
            &cmp,
            Some(Retention { smallest_snapshot: 1 }),
        )
        .unwrap()
        .unwrap();
        // The tombstone and v2 are newer than the snapshot; v1 is what it reads.
        assert_eq!(meta.entry_count, 3);
    }

    #[test]
    fn empty_output_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let cmp = InternalKeyComparator::default();
        let mem = Arc::new(MemTable::new(cmp.clone()));
        mem.add(1, ValueType::Delete, b"a", b"");

        let mut iter = mem.iter();
        let meta = build_table(
            &DefaultEnv,
            dir.path(),
            3,
            &mut iter,
            &table_options(),
            &cmp,
            Some(Retention { smallest_snapshot: 1 }),
        )
        .unwrap();
        assert!(meta.is_none());
        assert!(!table_file_name(dir.path(), 3).exists());
    }
}
