//! The storage engine behind a database handle.
//!
//! Writes go to the log and then the memtable under one writer lock. When
//! the memtable outgrows the write buffer it is written out as a table and
//! a fresh log is started; once enough tables pile up they are merged into
//! one. Readers take the current [`Version`] (memtable plus tables) and a
//! sequence number, and never block writers for longer than an `Arc` clone.

pub mod db_iter;
pub mod repair;
pub mod snapshots;

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::batch::{BatchOp, WriteBatch};
use crate::comparator::InternalKeyComparator;
use crate::compaction::{Retention, build_table, needs_compaction};
use crate::db::Range;
use crate::env::{Env, FileLock};
use crate::iterator::{MergeIterator, StorageIterator};
use crate::manifest::{MANIFEST_FILE, MANIFEST_TMP_FILE, Manifest};
use crate::memtable::{LookupResult, MemTable};
use crate::options::Options;
use crate::sstable::{BlockReadOptions, SSTable, TableOptions, table_file_name};
use crate::status::{Result, Status};
use crate::types::{MAX_SEQUENCE_NUMBER, ParsedInternalKey, SequenceNumber, ValueType, lookup_key, user_key_of};
use crate::wal::{WALReader, WALWriter, log_file_name};
use db_iter::DBIter;
use snapshots::SnapshotList;

pub(crate) const LOCK_FILE: &str = "LOCK";
pub(crate) const LOST_DIR: &str = "lost";

/// Kinds of file the engine keeps in a database directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileKind {
    Log(u64),
    Table(u64),
    Manifest,
    ManifestTmp,
    Lock,
}

pub(crate) fn parse_file_name(name: &str) -> Option<FileKind> {
    match name {
        MANIFEST_FILE => return Some(FileKind::Manifest),
        MANIFEST_TMP_FILE => return Some(FileKind::ManifestTmp),
        LOCK_FILE => return Some(FileKind::Lock),
        _ => {}
    }
    let (stem, ext) = name.rsplit_once('.')?;
    let number = stem.parse::<u64>().ok()?;
    match ext {
        "log" => Some(FileKind::Log(number)),
        "sst" => Some(FileKind::Table(number)),
        _ => None,
    }
}

/// What a reader sees: the active memtable and the live tables, oldest
/// table first. Replaced wholesale on flush and merge.
struct Version {
    mem: Arc<MemTable>,
    tables: Vec<Arc<SSTable>>,
}

/// State owned by whoever holds the writer lock.
struct WriterState {
    wal: WALWriter,
    manifest: Manifest,
    /// A failed log append or flush; every later write reports it.
    bg_error: Option<Status>,
}

pub struct Engine {
    dir: PathBuf,
    env: Arc<dyn Env>,
    options: Options,
    table_options: TableOptions,
    icmp: InternalKeyComparator,
    version: RwLock<Arc<Version>>,
    writer: Mutex<WriterState>,
    last_sequence: AtomicU64,
    snapshots: SnapshotList,
    _lock: FileLock,
}

impl Engine {
    /// Open or create the database in `dir`, replaying any logs left by
    /// the previous session.
    pub fn open(dir: &Path, options: &Options) -> Result<Engine> {
        options.validate()?;
        let env = Arc::clone(&options.env);
        let exists = env.file_exists(&Manifest::path(dir));
        if !exists && !options.create_if_missing {
            return Err(Status::NotFound(format!(
                "{}: does not exist (create_if_missing is false)",
                dir.display()
            )));
        }
        if exists && options.error_if_exists {
            return Err(Status::AlreadyExists(format!(
                "{}: exists (error_if_exists is true)",
                dir.display()
            )));
        }
        if !exists {
            env.create_dir_all(dir)?;
        }
        let lock = lock_dir(env.as_ref(), dir)?;

        let icmp = InternalKeyComparator::new(Arc::clone(&options.comparator));
        let mut manifest = if exists {
            let manifest = Manifest::load(env.as_ref(), dir)?;
            if manifest.comparator != options.comparator.name() {
                return Err(Status::InvalidArgument(format!(
                    "comparator {} does not match existing comparator {}",
                    options.comparator.name(),
                    manifest.comparator
                )));
            }
            manifest
        } else {
            Manifest::new(options.comparator.name())
        };
        let table_options = TableOptions {
            block_size: options.block_size,
            compression: options.compression,
            filter_policy: options.filter_policy.clone(),
        };

        let mut tables = Vec::with_capacity(manifest.tables.len());
        for meta in &manifest.tables {
            tables.push(open_table(&env, dir, meta.id, &table_options, &icmp, options)?);
        }

        let mut logs: Vec<u64> = env
            .children(dir)?
            .iter()
            .filter_map(|name| match parse_file_name(name) {
                Some(FileKind::Log(n)) if n >= manifest.log_number => Some(n),
                _ => None,
            })
            .collect();
        logs.sort_unstable();

        let recovered = Arc::new(MemTable::new(icmp.clone()));
        let mut last_sequence = manifest.last_sequence;
        for &number in &logs {
            let path = log_file_name(dir, number);
            let max = replay_log(env.as_ref(), &path, &recovered, options.paranoid_checks)?;
            last_sequence = last_sequence.max(max);
            manifest.next_file_number = manifest.next_file_number.max(number + 1);
        }

        if !recovered.is_empty() {
            let id = manifest.allocate_file_number();
            let mut iter = recovered.iter();
            if let Some(meta) =
                build_table(env.as_ref(), dir, id, &mut iter, &table_options, &icmp, None)?
            {
                tables.push(open_table(&env, dir, id, &table_options, &icmp, options)?);
                manifest.tables.push(meta);
            }
        }

        let log_number = manifest.allocate_file_number();
        let wal = WALWriter::new(env.as_ref(), &log_file_name(dir, log_number))?;
        manifest.log_number = log_number;
        manifest.last_sequence = last_sequence;
        manifest.store(env.as_ref(), dir)?;

        let engine = Engine {
            dir: dir.to_path_buf(),
            env,
            options: options.clone(),
            table_options,
            version: RwLock::new(Arc::new(Version {
                mem: Arc::new(MemTable::new(icmp.clone())),
                tables,
            })),
            icmp,
            writer: Mutex::new(WriterState {
                wal,
                manifest: manifest.clone(),
                bg_error: None,
            }),
            last_sequence: AtomicU64::new(last_sequence),
            snapshots: SnapshotList::new(),
            _lock: lock,
        };
        engine.remove_obsolete_files(&manifest);
        tracing::info!(
            path = %dir.display(),
            tables = manifest.tables.len(),
            replayed_logs = logs.len(),
            last_sequence,
            "database opened"
        );
        Ok(engine)
    }

    fn current(&self) -> Arc<Version> {
        Arc::clone(&self.version.read())
    }

    fn install(&self, version: Version) {
        *self.version.write() = Arc::new(version);
    }

    pub fn last_sequence(&self) -> SequenceNumber {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Block read settings for one call; paranoid databases always verify.
    pub fn block_read_options(&self, verify_checksums: bool, fill_cache: bool) -> BlockReadOptions {
        BlockReadOptions {
            verify_checksums: verify_checksums || self.options.paranoid_checks,
            fill_cache,
        }
    }

    /// Apply `batch` atomically: readers see all of it or none of it.
    pub fn write(&self, batch: &WriteBatch, sync: bool) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Some(e) = &writer.bg_error {
            return Err(e.duplicate());
        }
        if batch.is_empty() {
            if sync {
                writer.wal.sync()?;
            }
            return Ok(());
        }

        let sequence = self.last_sequence() + 1;
        if let Err(e) = writer.wal.append(&batch.encode(sequence), sync) {
            writer.bg_error = Some(e.duplicate());
            return Err(e);
        }
        let mem = Arc::clone(&self.current().mem);
        apply_batch(&mem, sequence, batch);
        // Publishing the last sequence makes the whole batch visible at once.
        self.last_sequence
            .store(sequence + batch.len() as u64 - 1, Ordering::Release);

        if mem.approximate_memory_usage() >= self.options.write_buffer_size {
            if let Err(e) = self.flush_locked(&mut writer) {
                tracing::warn!(error = %e, "memtable flush failed; rejecting further writes");
                writer.bg_error = Some(e);
            }
        }
        Ok(())
    }

    /// Newest value of `key` visible at `sequence` (latest if `None`).
    pub fn get(
        &self,
        key: &[u8],
        sequence: Option<SequenceNumber>,
        opts: BlockReadOptions,
    ) -> Result<Option<Vec<u8>>> {
        // Version before sequence: every table the sequence can see stays
        // reachable even if a merge lands in between.
        let current = self.current();
        let sequence = sequence.unwrap_or_else(|| self.last_sequence());
        match current.mem.get(key, sequence) {
            LookupResult::Found(value) => return Ok(Some(value)),
            LookupResult::Deleted => return Ok(None),
            LookupResult::Missing => {}
        }

        let lookup = lookup_key(key, sequence);
        for table in current.tables.iter().rev() {
            if let Some((ikey, value)) = table.get(&lookup, opts)? {
                return Ok(match ParsedInternalKey::parse(&ikey)?.value_type {
                    ValueType::Put => Some(value),
                    ValueType::Delete => None,
                });
            }
        }
        Ok(None)
    }

    /// Unpositioned iterator over the state at `sequence` (latest if `None`).
    pub fn new_iterator(&self, sequence: Option<SequenceNumber>, opts: BlockReadOptions) -> DBIter {
        let current = self.current();
        let sequence = sequence.unwrap_or_else(|| self.last_sequence());
        let mut children: Vec<Box<dyn StorageIterator>> = Vec::with_capacity(current.tables.len() + 1);
        children.push(Box::new(current.mem.iter()));
        for table in current.tables.iter().rev() {
            children.push(Box::new(table.iter(opts)));
        }
        DBIter::new(
            MergeIterator::new(self.icmp.clone(), children),
            Arc::clone(&self.options.comparator),
            sequence,
        )
    }

    /// Pin the current state; returns the pinned sequence.
    ///
    /// Read and pin happen under the writer lock, so a merge either sees
    /// the pin or finished before the sequence was read.
    pub fn new_snapshot(&self) -> SequenceNumber {
        let _writer = self.writer.lock();
        let sequence = self.last_sequence();
        self.snapshots.acquire(sequence);
        sequence
    }

    pub fn release_snapshot(&self, sequence: SequenceNumber) {
        if !self.snapshots.release(sequence) {
            tracing::warn!(sequence, "released a snapshot that was not pinned");
        }
    }

    pub fn live_snapshots(&self) -> usize {
        self.snapshots.len()
    }

    /// Bytes of table data covering each `[start, limit)` range. Entries
    /// still in the memtable are not counted.
    pub fn approximate_sizes(&self, ranges: &[Range]) -> Vec<u64> {
        let current = self.current();
        ranges
            .iter()
            .map(|range| {
                let start = lookup_key(&range.start, MAX_SEQUENCE_NUMBER);
                let limit = lookup_key(&range.limit, MAX_SEQUENCE_NUMBER);
                current
                    .tables
                    .iter()
                    .map(|t| {
                        t.approximate_offset_of(&limit)
                            .saturating_sub(t.approximate_offset_of(&start))
                    })
                    .sum()
            })
            .collect()
    }

    /// Flush the memtable and merge every table into one if any data falls
    /// in `[start, limit]` (unbounded where `None`).
    pub fn compact_range(&self, start: Option<&[u8]>, limit: Option<&[u8]>) -> Result<()> {
        let mut writer = self.writer.lock();
        if let Some(e) = &writer.bg_error {
            return Err(e.duplicate());
        }
        let current = self.current();
        let ucmp = self.icmp.user_comparator();
        let overlaps = current.tables.iter().any(|t| {
            let meta = t.meta();
            let below = limit.is_some_and(|l| {
                ucmp.compare(user_key_of(&meta.smallest), l) == std::cmp::Ordering::Greater
            });
            let above = start.is_some_and(|s| {
                ucmp.compare(user_key_of(&meta.largest), s) == std::cmp::Ordering::Less
            });
            !below && !above
        });
        if current.mem.is_empty() && !overlaps {
            return Ok(());
        }
        drop(current);

        self.flush_locked(&mut writer)?;
        if !self.current().tables.is_empty() {
            self.compact_locked(&mut writer)?;
        }
        Ok(())
    }

    /// Write the memtable out as a table and switch to a fresh log.
    fn flush_locked(&self, writer: &mut WriterState) -> Result<()> {
        let current = self.current();
        if current.mem.is_empty() {
            return Ok(());
        }

        let mut edit = writer.manifest.clone();
        let new_log = edit.allocate_file_number();
        let table_id = edit.allocate_file_number();
        let wal = WALWriter::new(self.env.as_ref(), &log_file_name(&self.dir, new_log))?;

        let mut tables = current.tables.clone();
        let mut iter = current.mem.iter();
        let meta = build_table(
            self.env.as_ref(),
            &self.dir,
            table_id,
            &mut iter,
            &self.table_options,
            &self.icmp,
            None,
        )?;
        if let Some(meta) = meta {
            tables.push(open_table(
                &self.env,
                &self.dir,
                table_id,
                &self.table_options,
                &self.icmp,
                &self.options,
            )?);
            edit.tables.push(meta);
        }

        let old_log = edit.log_number;
        edit.log_number = new_log;
        edit.last_sequence = self.last_sequence();
        edit.store(self.env.as_ref(), &self.dir)?;

        writer.manifest = edit;
        writer.wal = wal;
        self.install(Version {
            mem: Arc::new(MemTable::new(self.icmp.clone())),
            tables,
        });
        self.remove_quietly(&log_file_name(&self.dir, old_log));
        tracing::info!(
            table = table_id,
            entries = current.mem.len(),
            tables = writer.manifest.tables.len(),
            "memtable flushed"
        );

        if needs_compaction(writer.manifest.tables.len()) {
            self.compact_locked(writer)?;
        }
        Ok(())
    }

    /// Merge every live table into one.
    fn compact_locked(&self, writer: &mut WriterState) -> Result<()> {
        let current = self.current();
        let smallest_snapshot = self
            .snapshots
            .oldest()
            .unwrap_or_else(|| self.last_sequence());

        let children: Vec<Box<dyn StorageIterator>> = current
            .tables
            .iter()
            .map(|t| Box::new(t.iter(BlockReadOptions::verified())) as Box<dyn StorageIterator>)
            .collect();
        let mut merged = MergeIterator::new(self.icmp.clone(), children);

        let mut edit = writer.manifest.clone();
        let id = edit.allocate_file_number();
        let meta = build_table(
            self.env.as_ref(),
            &self.dir,
            id,
            &mut merged,
            &self.table_options,
            &self.icmp,
            Some(Retention { smallest_snapshot }),
        )?;

        let mut tables = Vec::with_capacity(1);
        edit.tables.clear();
        if let Some(meta) = meta {
            tables.push(open_table(
                &self.env,
                &self.dir,
                id,
                &self.table_options,
                &self.icmp,
                &self.options,
            )?);
            edit.tables.push(meta);
        }
        edit.store(self.env.as_ref(), &self.dir)?;
        writer.manifest = edit;

        self.install(Version {
            mem: Arc::clone(&current.mem),
            tables,
        });
        for table in &current.tables {
            table.mark_obsolete();
        }
        tracing::info!(
            inputs = current.tables.len(),
            output = id,
            smallest_snapshot,
            "tables merged"
        );
        Ok(())
    }

    /// Value of a named engine property, or `None` for unknown names.
    pub fn property(&self, name: &str) -> Option<String> {
        let current = self.current();
        match name {
            "lsmkv.num-files" => Some(current.tables.len().to_string()),
            "lsmkv.approximate-memory-usage" => {
                Some(current.mem.approximate_memory_usage().to_string())
            }
            "lsmkv.last-sequence" => Some(self.last_sequence().to_string()),
            "lsmkv.stats" => {
                let mut out = String::new();
                let _ = writeln!(out, "tables: {}", current.tables.len());
                for table in &current.tables {
                    let meta = table.meta();
                    let _ = writeln!(
                        out,
                        "  #{} {} bytes, {} entries, max sequence {}",
                        meta.id, meta.file_size, meta.entry_count, meta.max_sequence
                    );
                }
                let _ = writeln!(
                    out,
                    "memtable: {} entries, {} bytes",
                    current.mem.len(),
                    current.mem.approximate_memory_usage()
                );
                let _ = writeln!(out, "log: {} bytes", self.writer.lock().wal.offset());
                let _ = writeln!(out, "snapshots: {}", self.snapshots.len());
                if let Some(cache) = &self.options.cache {
                    let stats = cache.stats();
                    let _ = writeln!(
                        out,
                        "cache: {} hits, {} misses, {} / {} bytes",
                        stats.hits,
                        stats.misses,
                        stats.usage,
                        cache.capacity()
                    );
                }
                Some(out)
            }
            _ => None,
        }
    }

    /// Sync the log. The lock is released when the engine is dropped.
    pub fn close(&self) -> Result<()> {
        self.writer.lock().wal.sync()?;
        tracing::info!(path = %self.dir.display(), "database closed");
        Ok(())
    }

    /// Delete logs and tables the manifest no longer references.
    fn remove_obsolete_files(&self, manifest: &Manifest) {
        let names = match self.env.children(&self.dir) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "cannot list database directory");
                return;
            }
        };
        for name in names {
            let obsolete = match parse_file_name(&name) {
                Some(FileKind::Log(n)) => n < manifest.log_number,
                Some(FileKind::Table(id)) => !manifest.tables.iter().any(|t| t.id == id),
                Some(FileKind::ManifestTmp) => true,
                _ => false,
            };
            if obsolete {
                self.remove_quietly(&self.dir.join(&name));
            }
        }
    }

    fn remove_quietly(&self, path: &Path) {
        if let Err(e) = self.env.remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove obsolete file");
        }
    }
}

/// Take the directory lock, reporting contention as `Busy`.
pub(crate) fn lock_dir(env: &dyn Env, dir: &Path) -> Result<FileLock> {
    env.lock_file(&dir.join(LOCK_FILE)).map_err(|e| {
        if e.kind() == io::ErrorKind::WouldBlock {
            Status::Busy(format!("{}: database is already open", dir.display()))
        } else {
            Status::Io(e)
        }
    })
}

pub(crate) fn open_table(
    env: &Arc<dyn Env>,
    dir: &Path,
    id: u64,
    table_options: &TableOptions,
    icmp: &InternalKeyComparator,
    options: &Options,
) -> Result<Arc<SSTable>> {
    let table = SSTable::open(
        Arc::clone(env),
        &table_file_name(dir, id),
        id,
        table_options.clone(),
        icmp.clone(),
        options.cache.clone(),
    )?;
    Ok(Arc::new(table))
}

pub(crate) fn apply_batch(mem: &MemTable, sequence: SequenceNumber, batch: &WriteBatch) {
    for (i, op) in batch.iter().enumerate() {
        let sequence = sequence + i as u64;
        match op {
            BatchOp::Put { key, value } => mem.add(sequence, ValueType::Put, key, value),
            BatchOp::Delete { key } => mem.add(sequence, ValueType::Delete, key, &[]),
        }
    }
}

/// Replay one log into `mem`; returns the highest sequence applied.
///
/// A damaged record ends the log. Paranoid opens fail instead.
pub(crate) fn replay_log(
    env: &dyn Env,
    path: &Path,
    mem: &MemTable,
    paranoid: bool,
) -> Result<SequenceNumber> {
    let reader = WALReader::new(env, path)?;
    let mut max_sequence = 0;
    let mut iter = reader.iter();
    while let Some(record) = iter.next() {
        let decoded = record.and_then(|r| WriteBatch::decode(&r.payload));
        let (sequence, batch) = match decoded {
            Ok(decoded) => decoded,
            Err(e) if paranoid => return Err(e),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    offset = iter.offset(),
                    error = %e,
                    "dropping damaged log tail"
                );
                break;
            }
        };
        if batch.is_empty() {
            continue;
        }
        apply_batch(mem, sequence, &batch);
        max_sequence = max_sequence.max(sequence + batch.len() as u64 - 1);
    }
    Ok(max_sequence)
}

/// Remove the database files in `dir`, then the directory if it is empty.
pub fn destroy(dir: &Path, options: &Options) -> Result<()> {
    let env = options.env.as_ref();
    if !env.file_exists(dir) {
        return Ok(());
    }
    let lock = lock_dir(env, dir)?;
    let mut removed = 0usize;
    for name in env.children(dir)? {
        match parse_file_name(&name) {
            Some(FileKind::Lock) | None => {}
            Some(_) => {
                env.remove_file(&dir.join(&name))?;
                removed += 1;
            }
        }
    }
    drop(lock);
    let lock_path = dir.join(LOCK_FILE);
    if env.file_exists(&lock_path) {
        env.remove_file(&lock_path)?;
    }
    // Unrecognized files (and `lost/`) keep the directory alive.
    if let Err(e) = env.remove_dir(dir) {
        tracing::debug!(path = %dir.display(), error = %e, "database directory kept");
    }
    tracing::info!(path = %dir.display(), removed, "database destroyed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_parse() {
        assert_eq!(parse_file_name("000007.log"), Some(FileKind::Log(7)));
        assert_eq!(parse_file_name("000012.sst"), Some(FileKind::Table(12)));
        assert_eq!(parse_file_name("MANIFEST"), Some(FileKind::Manifest));
        assert_eq!(parse_file_name("LOCK"), Some(FileKind::Lock));
        assert_eq!(parse_file_name("notes.txt"), None);
        assert_eq!(parse_file_name("abc.log"), None);
    }
}
