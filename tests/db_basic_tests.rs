// DB handle: point reads and writes, open flags, properties.

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use lsmkv::{
    BloomFilterPolicy, Cache, Comparator, DB, Error, Options, ReadOptions, WriteOptions,
};
use tempfile::tempdir;

fn create_options() -> Options {
    let mut options = Options::default();
    options.set_create_if_missing(true);
    options
}

fn open(path: &Path) -> DB {
    DB::open(path, &create_options()).unwrap()
}

// =============================================================================
// Test 1: Put then get, including an empty value
// =============================================================================
#[test]
fn put_then_get_returns_value() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let (wo, ro) = (WriteOptions::default(), ReadOptions::default());

    db.put(&wo, b"name", b"lsmkv").unwrap();
    db.put(&wo, b"empty", b"").unwrap();

    assert_eq!(db.get(&ro, b"name").unwrap(), Some(b"lsmkv".to_vec()));
    assert_eq!(db.get(&ro, b"empty").unwrap(), Some(Vec::new()));
    db.close().unwrap();
}

// =============================================================================
// Test 2: Never-written and deleted keys are not found, not errors
// =============================================================================
#[test]
fn missing_and_deleted_keys_are_not_found() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let (wo, ro) = (WriteOptions::default(), ReadOptions::default());

    assert_eq!(db.get(&ro, b"never").unwrap(), None);

    db.put(&wo, b"gone", b"soon").unwrap();
    db.delete(&wo, b"gone").unwrap();
    assert_eq!(db.get(&ro, b"gone").unwrap(), None);

    // Deleting an absent key is fine.
    db.delete(&wo, b"never").unwrap();
}

// =============================================================================
// Test 3: Overwrite returns the newest value
// =============================================================================
#[test]
fn overwrite_returns_newest_value() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let (wo, ro) = (WriteOptions::default(), ReadOptions::default());

    for i in 0..10 {
        db.put(&wo, b"counter", format!("{i}")).unwrap();
    }
    assert_eq!(db.get(&ro, b"counter").unwrap(), Some(b"9".to_vec()));
}

// =============================================================================
// Test 4: Caller buffers can be reused right after a put
// =============================================================================
#[test]
fn caller_buffers_are_copied() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let mut key = b"k1".to_vec();
    let mut value = b"v1".to_vec();
    db.put(&WriteOptions::default(), &key, &value).unwrap();

    key[1] = b'2';
    value[1] = b'2';
    assert_eq!(db.get(&ReadOptions::default(), b"k1").unwrap(), Some(b"v1".to_vec()));
    assert_eq!(db.get(&ReadOptions::default(), &key).unwrap(), None);
}

// =============================================================================
// Test 5: Missing database without create_if_missing → Open error
// =============================================================================
#[test]
fn open_missing_without_create_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent");
    let err = DB::open(&path, &Options::default()).unwrap_err();
    assert!(matches!(err, Error::Open { .. }), "got {err:?}");
    assert!(!path.exists());
}

// =============================================================================
// Test 6: Existing database with error_if_exists → Open error
// =============================================================================
#[test]
fn open_existing_with_error_if_exists_fails() {
    let dir = tempdir().unwrap();
    open(dir.path()).close().unwrap();

    let mut options = create_options();
    options.set_error_if_exists(true);
    let err = DB::open(dir.path(), &options).unwrap_err();
    match err {
        Error::Open { path, message } => {
            assert_eq!(path, dir.path());
            assert!(message.contains("exists"), "message: {message}");
        }
        other => panic!("expected Open error, got {other:?}"),
    }
}

// =============================================================================
// Test 7: Rejected options → Open error
// =============================================================================
#[test]
fn invalid_options_fail_open() {
    let dir = tempdir().unwrap();
    let mut options = create_options();
    options.set_write_buffer_size(0);
    assert!(matches!(DB::open(dir.path(), &options), Err(Error::Open { .. })));
}

// =============================================================================
// Test 8: Changing options after open does not affect the open database
// =============================================================================
#[test]
fn options_mutated_after_open_do_not_apply() {
    let dir = tempdir().unwrap();
    let mut options = create_options();
    let db = DB::open(dir.path(), &options).unwrap();
    options.set_write_buffer_size(1);

    let wo = WriteOptions::default();
    for i in 0..50 {
        db.put(&wo, format!("key{i}"), b"value").unwrap();
    }
    // A one-byte buffer would have flushed on every write.
    assert_eq!(db.property_value("lsmkv.num-files").unwrap(), Some("0".to_string()));
}

// =============================================================================
// Test 9: Properties report engine state
// =============================================================================
#[test]
fn property_values() {
    let dir = tempdir().unwrap();
    let db = open(dir.path());
    let wo = WriteOptions::default();
    db.put(&wo, b"a", b"1").unwrap();
    db.put(&wo, b"b", b"2").unwrap();
    db.delete(&wo, b"a").unwrap();

    assert_eq!(db.property_value("lsmkv.last-sequence").unwrap(), Some("3".to_string()));
    let memory: usize = db
        .property_value("lsmkv.approximate-memory-usage")
        .unwrap()
        .unwrap()
        .parse()
        .unwrap();
    assert!(memory > 0);
    // Two 31-byte puts and a 26-byte delete in the active log.
    let stats = db.property_value("lsmkv.stats").unwrap().unwrap();
    assert!(stats.contains("log: 88 bytes"), "stats: {stats}");

    db.compact_range(None, None).unwrap();
    assert_eq!(db.property_value("lsmkv.num-files").unwrap(), Some("1".to_string()));
    let stats = db.property_value("lsmkv.stats").unwrap().unwrap();
    assert!(stats.contains("tables: 1"), "stats: {stats}");
    assert!(stats.contains("log: 0 bytes"), "stats: {stats}");

    assert_eq!(db.property_value("lsmkv.no-such-property").unwrap(), None);
}

// =============================================================================
// Test 10: Small write buffer spreads data over tables, reads still work
// =============================================================================
#[test]
fn reads_span_memtable_and_tables() {
    let dir = tempdir().unwrap();
    let mut options = create_options();
    options.set_write_buffer_size(4 * 1024);
    let db = DB::open(dir.path(), &options).unwrap();
    let (wo, ro) = (WriteOptions::default(), ReadOptions::default());

    for i in 0..2000u32 {
        db.put(&wo, format!("key{i:05}"), format!("value{i}")).unwrap();
    }
    for i in (0..2000u32).step_by(3) {
        db.delete(&wo, format!("key{i:05}")).unwrap();
    }

    let files: usize = db.property_value("lsmkv.num-files").unwrap().unwrap().parse().unwrap();
    assert!(files >= 1);
    // Merging kicks in before the table count grows unbounded.
    assert!(files < 4, "files: {files}");

    for i in 0..2000u32 {
        let got = db.get(&ro, format!("key{i:05}")).unwrap();
        if i % 3 == 0 {
            assert_eq!(got, None, "key{i:05} should be deleted");
        } else {
            assert_eq!(got, Some(format!("value{i}").into_bytes()));
        }
    }
}

// =============================================================================
// Test 11: Bloom filter and block cache do not change results
// =============================================================================
#[test]
fn filter_and_cache_are_transparent() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(Cache::new_lru(1 << 20));
    let mut options = create_options();
    options
        .set_write_buffer_size(8 * 1024)
        .set_filter_policy(Some(Arc::new(BloomFilterPolicy::new(10))))
        .set_cache(Some(Arc::clone(&cache)));
    let db = DB::open(dir.path(), &options).unwrap();
    let (wo, ro) = (WriteOptions::default(), ReadOptions::default());

    for i in 0..1000u32 {
        db.put(&wo, format!("key{i:05}"), format!("value{i}")).unwrap();
    }
    db.compact_range(None, None).unwrap();

    for i in 0..1000u32 {
        assert_eq!(db.get(&ro, format!("key{i:05}")).unwrap(), Some(format!("value{i}").into_bytes()));
    }
    for i in 0..100u32 {
        assert_eq!(db.get(&ro, format!("nokey{i:05}")).unwrap(), None);
    }
    assert!(cache.stats().hits > 0);
}

// =============================================================================
// Test 12: Handle shared across threads
// =============================================================================
#[test]
fn concurrent_writers_and_readers() {
    let dir = tempdir().unwrap();
    let mut options = create_options();
    options.set_write_buffer_size(16 * 1024);
    let db = Arc::new(DB::open(dir.path(), &options).unwrap());

    let handles: Vec<_> = (0..4u32)
        .map(|t| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let (wo, ro) = (WriteOptions::default(), ReadOptions::default());
                for i in 0..500u32 {
                    let key = format!("t{t}-{i:04}");
                    db.put(&wo, &key, key.as_bytes()).unwrap();
                    assert_eq!(db.get(&ro, &key).unwrap(), Some(key.into_bytes()));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let ro = ReadOptions::default();
    for t in 0..4u32 {
        for i in 0..500u32 {
            let key = format!("t{t}-{i:04}");
            assert_eq!(db.get(&ro, &key).unwrap(), Some(key.into_bytes()));
        }
    }
    assert_eq!(
        db.property_value("lsmkv.last-sequence").unwrap(),
        Some("2000".to_string())
    );
}

// =============================================================================
// Test 13: Custom comparator orders keys; its name is checked on reopen
// =============================================================================
struct ReverseComparator;

impl Comparator for ReverseComparator {
    fn name(&self) -> &str {
        "test.ReverseComparator"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        b.cmp(a)
    }
}

#[test]
fn custom_comparator_is_persisted() {
    let dir = tempdir().unwrap();
    let mut options = create_options();
    options.set_comparator(Arc::new(ReverseComparator));
    let db = DB::open(dir.path(), &options).unwrap();
    let wo = WriteOptions::default();
    for key in ["a", "c", "b"] {
        db.put(&wo, key, key).unwrap();
    }
    db.compact_range(None, None).unwrap();

    let mut keys = Vec::new();
    let mut iter = db.new_iterator(&ReadOptions::default()).unwrap();
    iter.seek_to_first();
    while iter.valid() {
        keys.push(iter.key().unwrap().to_vec());
        iter.next().unwrap();
    }
    assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    assert_eq!(db.get(&ReadOptions::default(), b"b").unwrap(), Some(b"b".to_vec()));
    drop(iter);
    db.close().unwrap();

    let err = DB::open(dir.path(), &create_options()).unwrap_err();
    match err {
        Error::Open { message, .. } => assert!(message.contains("comparator"), "message: {message}"),
        other => panic!("expected Open error, got {other:?}"),
    }
}

// =============================================================================
// Test 14: Library version
// =============================================================================
#[test]
fn version_matches_package() {
    assert_eq!(lsmkv::major_version(), 0);
    assert_eq!(lsmkv::minor_version(), 1);
}
