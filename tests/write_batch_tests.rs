// WriteBatch: ordering within a batch and atomic visibility.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use lsmkv::{BatchOp, DB, Options, ReadOptions, WriteBatch, WriteOptions};
use tempfile::tempdir;

fn open(path: &std::path::Path) -> DB {
    let mut options = Options::default();
    options.set_create_if_missing(true);
    DB::open(path, &options).unwrap()
}

// =============================================================================
// Test 1: Last entry for a key wins
// =============================================================================
#[test]
fn last_entry_for_key_wins() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let mut batch = WriteBatch::new();
    batch.put(b"a", b"1");
    batch.delete(b"a");
    batch.put(b"a", b"2");
    db.write(&WriteOptions::default(), &batch).unwrap();

    assert_eq!(db.get(&ReadOptions::default(), b"a").unwrap(), Some(b"2".to_vec()));
}

// =============================================================================
// Test 2: Put followed by delete in one batch leaves nothing
// =============================================================================
#[test]
fn put_then_delete_in_batch() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    db.put(&WriteOptions::default(), b"b", b"old").unwrap();

    let mut batch = WriteBatch::new();
    batch.put(b"b", b"new");
    batch.delete(b"b");
    batch.put(b"c", b"3");
    db.write(&WriteOptions::default(), &batch).unwrap();

    let ro = ReadOptions::default();
    assert_eq!(db.get(&ro, b"b").unwrap(), None);
    assert_eq!(db.get(&ro, b"c").unwrap(), Some(b"3".to_vec()));
}

// =============================================================================
// Test 3: Batch records entries in order; clear empties it
// =============================================================================
#[test]
fn batch_contents_and_clear() {
    let mut batch = WriteBatch::new();
    batch.put(b"k", b"v");
    batch.delete(b"k");
    assert_eq!(batch.len(), 2);
    let ops: Vec<&BatchOp> = batch.iter().collect();
    assert_eq!(
        ops[0],
        &BatchOp::Put {
            key: b"k".to_vec(),
            value: b"v".to_vec()
        }
    );
    assert_eq!(ops[1].key(), b"k");

    batch.clear();
    assert!(batch.is_empty());
    assert_eq!(batch.approximate_size(), 0);
}

// =============================================================================
// Test 4: A batch is reusable after clear, and across databases
// =============================================================================
#[test]
fn batch_reused_across_databases() {
    let dir = tempdir().unwrap();
    let first = open(&dir.path().join("one"));
    let second = open(&dir.path().join("two"));

    let mut batch = WriteBatch::new();
    batch.put(b"shared", b"x");
    first.write(&WriteOptions::default(), &batch).unwrap();
    second.write(&WriteOptions::default(), &batch).unwrap();

    batch.clear();
    batch.put(b"only-second", b"y");
    second.write(&WriteOptions::default(), &batch).unwrap();

    let ro = ReadOptions::default();
    assert_eq!(first.get(&ro, b"shared").unwrap(), Some(b"x".to_vec()));
    assert_eq!(second.get(&ro, b"shared").unwrap(), Some(b"x".to_vec()));
    assert_eq!(first.get(&ro, b"only-second").unwrap(), None);
    assert_eq!(second.get(&ro, b"only-second").unwrap(), Some(b"y".to_vec()));
}

// =============================================================================
// Test 5: Empty batch is a no-op
// =============================================================================
#[test]
fn empty_batch_is_noop() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let mut wo = WriteOptions::default();
    wo.set_sync(true);
    db.write(&wo, &WriteBatch::new()).unwrap();
    assert_eq!(db.property_value("lsmkv.last-sequence").unwrap(), Some("0".to_string()));
}

// =============================================================================
// Test 6: Appending one batch to another keeps order
// =============================================================================
#[test]
fn append_preserves_order() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let mut first = WriteBatch::new();
    first.put(b"k", b"first");
    let mut second = WriteBatch::new();
    second.put(b"k", b"second");
    first.append(&second);
    assert_eq!(first.len(), 2);

    db.write(&WriteOptions::default(), &first).unwrap();
    assert_eq!(db.get(&ReadOptions::default(), b"k").unwrap(), Some(b"second".to_vec()));
}

// =============================================================================
// Test 7: Snapshot before a write sees none of it, after sees all of it
// =============================================================================
#[test]
fn snapshots_bracket_a_batch() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());

    let before = db.new_snapshot().unwrap();
    let mut batch = WriteBatch::new();
    for i in 0..10 {
        batch.put(format!("k{i}"), format!("v{i}"));
    }
    db.write(&WriteOptions::default(), &batch).unwrap();
    let after = db.new_snapshot().unwrap();

    let mut ro_before = ReadOptions::default();
    ro_before.set_snapshot(Some(&before));
    let mut ro_after = ReadOptions::default();
    ro_after.set_snapshot(Some(&after));
    for i in 0..10 {
        let key = format!("k{i}");
        assert_eq!(db.get(&ro_before, &key).unwrap(), None);
        assert_eq!(db.get(&ro_after, &key).unwrap(), Some(format!("v{i}").into_bytes()));
    }
}

// =============================================================================
// Test 8: Concurrent readers never see a partial batch
// =============================================================================
#[test]
fn concurrent_readers_see_whole_batches() {
    const KEYS: usize = 8;
    let dir = tempdir().unwrap();
    let mut options = Options::default();
    options.set_create_if_missing(true).set_write_buffer_size(2 * 1024);
    let db = Arc::new(DB::open(dir.path(), &options).unwrap());
    let done = Arc::new(AtomicBool::new(false));

    let writer = {
        let (db, done) = (Arc::clone(&db), Arc::clone(&done));
        thread::spawn(move || {
            let mut batch = WriteBatch::new();
            for round in 0..300u32 {
                batch.clear();
                for k in 0..KEYS {
                    batch.put(format!("key{k}"), round.to_string());
                }
                db.write(&WriteOptions::default(), &batch).unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let readers: Vec<_> = (0..2)
        .map(|_| {
            let (db, done) = (Arc::clone(&db), Arc::clone(&done));
            thread::spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let snapshot = db.new_snapshot().unwrap();
                    let mut ro = ReadOptions::default();
                    ro.set_snapshot(Some(&snapshot));
                    let values: Vec<Option<Vec<u8>>> = (0..KEYS)
                        .map(|k| db.get(&ro, format!("key{k}")).unwrap())
                        .collect();
                    assert!(
                        values.iter().all(|v| v == &values[0]),
                        "partial batch observed: {values:?}"
                    );

                    let mut iter = db.new_iterator(&ReadOptions::default()).unwrap();
                    iter.seek_to_first();
                    let mut seen = Vec::new();
                    while iter.valid() {
                        seen.push(iter.value().unwrap().to_vec());
                        iter.next().unwrap();
                    }
                    assert!(seen.is_empty() || seen.len() == KEYS);
                    assert!(seen.iter().all(|v| v == &seen[0]), "partial batch observed");
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(
        db.get(&ReadOptions::default(), b"key0").unwrap(),
        Some(b"299".to_vec())
    );
}

// =============================================================================
// Test 9: Snapshots taken while writes merge tables still read their state
// =============================================================================
#[test]
fn snapshot_taken_during_merges_reads_its_sequence() {
    let dir = tempdir().unwrap();
    let db = Arc::new(open(dir.path()));
    let done = Arc::new(AtomicBool::new(false));

    // Write i lands at sequence i, so a snapshot at sequence n must see "n".
    let writer = {
        let (db, done) = (Arc::clone(&db), Arc::clone(&done));
        thread::spawn(move || {
            for i in 1..=200u32 {
                db.put(&WriteOptions::default(), b"k", i.to_string()).unwrap();
                db.compact_range(None, None).unwrap();
            }
            done.store(true, Ordering::Release);
        })
    };

    let reader = {
        let (db, done) = (Arc::clone(&db), Arc::clone(&done));
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                let snapshot = db.new_snapshot().unwrap();
                let expected = match snapshot.sequence() {
                    0 => None,
                    n => Some(n.to_string().into_bytes()),
                };
                let mut ro = ReadOptions::default();
                ro.set_snapshot(Some(&snapshot));
                assert_eq!(db.get(&ro, b"k").unwrap(), expected);
                thread::yield_now();
                assert_eq!(db.get(&ro, b"k").unwrap(), expected, "after later merges");
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
    assert_eq!(db.property_value("lsmkv.num-files").unwrap(), Some("1".to_string()));
}
