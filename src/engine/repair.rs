//! Best-effort recovery of a damaged database directory.
//!
//! Every log is converted into a table, every table that still reads back
//! cleanly is kept, and a new manifest is written over whatever was there.
//! Tables that fail to read are moved into `lost/` rather than deleted.

use std::path::Path;
use std::sync::Arc;

use crate::comparator::InternalKeyComparator;
use crate::compaction::build_table;
use crate::engine::{FileKind, LOST_DIR, lock_dir, open_table, parse_file_name, replay_log};
use crate::iterator::StorageIterator;
use crate::manifest::Manifest;
use crate::memtable::MemTable;
use crate::options::Options;
use crate::sstable::{BlockReadOptions, SSTableMeta, TableOptions, table_file_name};
use crate::status::{Result, Status};
use crate::types::ParsedInternalKey;
use crate::wal::log_file_name;

pub fn repair(dir: &Path, options: &Options) -> Result<()> {
    options.validate()?;
    let env = Arc::clone(&options.env);
    if !env.file_exists(dir) {
        return Err(Status::NotFound(format!("{}: does not exist", dir.display())));
    }
    let _lock = lock_dir(env.as_ref(), dir)?;

    let icmp = InternalKeyComparator::new(Arc::clone(&options.comparator));
    let table_options = TableOptions {
        block_size: options.block_size,
        compression: options.compression,
        filter_policy: options.filter_policy.clone(),
    };

    let mut logs = Vec::new();
    let mut table_ids = Vec::new();
    let mut max_number = 0u64;
    for name in env.children(dir)? {
        match parse_file_name(&name) {
            Some(FileKind::Log(n)) => {
                logs.push(n);
                max_number = max_number.max(n);
            }
            Some(FileKind::Table(id)) => {
                table_ids.push(id);
                max_number = max_number.max(id);
            }
            _ => {}
        }
    }
    logs.sort_unstable();
    table_ids.sort_unstable();

    let mut manifest = Manifest::new(options.comparator.name());
    if let Ok(old) = Manifest::load(env.as_ref(), dir) {
        manifest.next_file_number = old.next_file_number;
    }
    manifest.next_file_number = manifest.next_file_number.max(max_number + 1);

    // Logs become tables, each replayed into its own memtable.
    for &number in &logs {
        let path = log_file_name(dir, number);
        let mem = Arc::new(MemTable::new(icmp.clone()));
        match replay_log(env.as_ref(), &path, &mem, false) {
            Ok(_) if !mem.is_empty() => {
                let id = manifest.allocate_file_number();
                let mut iter = mem.iter();
                if build_table(env.as_ref(), dir, id, &mut iter, &table_options, &icmp, None)?
                    .is_some()
                {
                    table_ids.push(id);
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable log"),
        }
        move_to_lost(options, dir, &format!("{number:06}.log"))?;
    }

    let mut tables: Vec<SSTableMeta> = Vec::new();
    for id in table_ids {
        match scan_table(dir, id, &table_options, &icmp, options) {
            Ok(meta) => tables.push(meta),
            Err(e) => {
                tracing::warn!(table = id, error = %e, "moving unreadable table aside");
                move_to_lost(options, dir, &format!("{id:06}.sst"))?;
            }
        }
    }
    // Point lookups search newer tables first.
    tables.sort_by_key(|t| (t.max_sequence, t.id));

    manifest.last_sequence = tables.iter().map(|t| t.max_sequence).max().unwrap_or(0);
    manifest.log_number = manifest.next_file_number;
    manifest.tables = tables;
    manifest.store(env.as_ref(), dir)?;
    tracing::info!(
        path = %dir.display(),
        tables = manifest.tables.len(),
        logs = logs.len(),
        last_sequence = manifest.last_sequence,
        "database repaired"
    );
    Ok(())
}

/// Read every entry of a table with checksums on, rebuilding its metadata.
fn scan_table(
    dir: &Path,
    id: u64,
    table_options: &TableOptions,
    icmp: &InternalKeyComparator,
    options: &Options,
) -> Result<SSTableMeta> {
    let table = open_table(&options.env, dir, id, table_options, icmp, options)?;
    let mut iter = table.iter(BlockReadOptions::verified());
    let mut meta = SSTableMeta {
        id,
        smallest: Vec::new(),
        largest: Vec::new(),
        file_size: table.meta().file_size,
        entry_count: 0,
        max_sequence: 0,
    };
    iter.seek_to_first()?;
    while iter.is_valid() {
        let parsed = ParsedInternalKey::parse(iter.key())?;
        if meta.entry_count == 0 {
            meta.smallest = iter.key().to_vec();
        }
        meta.largest.clear();
        meta.largest.extend_from_slice(iter.key());
        meta.max_sequence = meta.max_sequence.max(parsed.sequence);
        meta.entry_count += 1;
        iter.next()?;
    }
    if meta.entry_count == 0 {
        return Err(Status::corruption(format!(
            "{}: table has no entries",
            table_file_name(dir, id).display()
        )));
    }
    Ok(meta)
}

fn move_to_lost(options: &Options, dir: &Path, name: &str) -> Result<()> {
    let lost = dir.join(LOST_DIR);
    options.env.create_dir_all(&lost)?;
    options.env.rename(&dir.join(name), &lost.join(name))?;
    Ok(())
}
