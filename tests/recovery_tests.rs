// Recovery: log replay on reopen, damaged logs, repair.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use lsmkv::{DB, Error, Options, ReadOptions, WriteOptions, repair_database};
use tempfile::tempdir;

fn create_options() -> Options {
    let mut options = Options::default();
    options.set_create_if_missing(true);
    options
}

fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == ext))
        .collect();
    out.sort();
    out
}

// =============================================================================
// Test 1: Unflushed writes come back from the log
// =============================================================================
#[test]
fn reopen_replays_log() {
    let dir = tempdir().unwrap();
    {
        let db = DB::open(dir.path(), &create_options()).unwrap();
        let wo = WriteOptions::default();
        for i in 0..100u32 {
            db.put(&wo, format!("key{i:03}"), format!("value{i}")).unwrap();
        }
        db.delete(&wo, b"key050").unwrap();
        assert_eq!(db.property_value("lsmkv.num-files").unwrap(), Some("0".to_string()));
        db.close().unwrap();
    }

    let db = DB::open(dir.path(), &Options::default()).unwrap();
    let ro = ReadOptions::default();
    assert_eq!(db.get(&ro, b"key000").unwrap(), Some(b"value0".to_vec()));
    assert_eq!(db.get(&ro, b"key099").unwrap(), Some(b"value99".to_vec()));
    assert_eq!(db.get(&ro, b"key050").unwrap(), None);
    assert_eq!(db.property_value("lsmkv.last-sequence").unwrap(), Some("101".to_string()));
}

// =============================================================================
// Test 2: Sequence numbers continue across sessions
// =============================================================================
#[test]
fn later_sessions_overwrite_earlier_ones() {
    let dir = tempdir().unwrap();
    for session in 0..5u32 {
        let db = DB::open(dir.path(), &create_options()).unwrap();
        let ro = ReadOptions::default();
        if session > 0 {
            let prev = format!("s{}", session - 1).into_bytes();
            assert_eq!(db.get(&ro, b"key").unwrap(), Some(prev));
        }
        let mut wo = WriteOptions::default();
        wo.set_sync(true);
        db.put(&wo, b"key", format!("s{session}")).unwrap();
        if session % 2 == 0 {
            db.compact_range(None, None).unwrap();
        }
    }
}

// =============================================================================
// Test 3: Tables and logs together survive a reopen
// =============================================================================
#[test]
fn reopen_with_tables_and_log() {
    let dir = tempdir().unwrap();
    let mut options = create_options();
    options.set_write_buffer_size(4 * 1024);
    {
        let db = DB::open(dir.path(), &options).unwrap();
        let wo = WriteOptions::default();
        for i in 0..1000u32 {
            db.put(&wo, format!("key{i:04}"), format!("value{i}")).unwrap();
        }
        for i in (0..1000u32).step_by(10) {
            db.delete(&wo, format!("key{i:04}")).unwrap();
        }
    }

    let db = DB::open(dir.path(), &options).unwrap();
    let ro = ReadOptions::default();
    for i in 0..1000u32 {
        let want = (i % 10 != 0).then(|| format!("value{i}").into_bytes());
        assert_eq!(db.get(&ro, format!("key{i:04}")).unwrap(), want, "key{i:04}");
    }
    // Replayed logs are folded into tables and removed.
    assert_eq!(files_with_extension(dir.path(), "log").len(), 1);
}

// =============================================================================
// Test 4: Torn log tail is dropped quietly, unless paranoid
// =============================================================================
#[test]
fn torn_log_tail() {
    let dir = tempdir().unwrap();
    {
        let db = DB::open(dir.path(), &create_options()).unwrap();
        for i in 0..10u32 {
            db.put(&WriteOptions::default(), format!("k{i}"), b"v").unwrap();
        }
    }
    let logs = files_with_extension(dir.path(), "log");
    assert_eq!(logs.len(), 1);
    let mut file = OpenOptions::new().append(true).open(&logs[0]).unwrap();
    file.write_all(&[0xAB, 0xCD, 0xEF]).unwrap();
    drop(file);

    let mut paranoid = Options::default();
    paranoid.set_paranoid_checks(true);
    assert!(matches!(DB::open(dir.path(), &paranoid), Err(Error::Open { .. })));

    let db = DB::open(dir.path(), &Options::default()).unwrap();
    for i in 0..10u32 {
        assert_eq!(db.get(&ReadOptions::default(), format!("k{i}")).unwrap(), Some(b"v".to_vec()));
    }
}

// =============================================================================
// Test 5: Damage in the middle of a log loses only what follows it
// =============================================================================
#[test]
fn damaged_log_record_truncates_replay() {
    let dir = tempdir().unwrap();
    {
        let db = DB::open(dir.path(), &create_options()).unwrap();
        for i in 0..10u32 {
            db.put(&WriteOptions::default(), format!("k{i}"), b"v").unwrap();
        }
    }
    // Every record here is 8 header bytes + 24 payload bytes.
    let log = files_with_extension(dir.path(), "log").remove(0);
    let mut data = fs::read(&log).unwrap();
    assert_eq!(data.len(), 10 * 32);
    data[5 * 32 + 12] ^= 0xFF;
    fs::write(&log, &data).unwrap();

    let db = DB::open(dir.path(), &Options::default()).unwrap();
    let ro = ReadOptions::default();
    for i in 0..5u32 {
        assert!(db.get(&ro, format!("k{i}")).unwrap().is_some());
    }
    for i in 5..10u32 {
        assert_eq!(db.get(&ro, format!("k{i}")).unwrap(), None);
    }
}

// =============================================================================
// Test 6: Repair rebuilds a lost manifest and moves junk aside
// =============================================================================
#[test]
fn repair_rebuilds_manifest() {
    let dir = tempdir().unwrap();
    let mut options = create_options();
    options.set_write_buffer_size(4 * 1024);
    {
        let db = DB::open(dir.path(), &options).unwrap();
        let wo = WriteOptions::default();
        for i in 0..800u32 {
            db.put(&wo, format!("key{i:04}"), format!("value{i}")).unwrap();
        }
        db.put(&wo, b"key0000", b"latest").unwrap();
        db.close().unwrap();
    }
    fs::remove_file(dir.path().join("MANIFEST")).unwrap();
    fs::write(dir.path().join("000999.sst"), b"not a table").unwrap();

    assert!(matches!(DB::open(dir.path(), &Options::default()), Err(Error::Open { .. })));

    repair_database(dir.path(), &Options::default()).unwrap();
    assert!(dir.path().join("lost").join("000999.sst").exists());

    let db = DB::open(dir.path(), &Options::default()).unwrap();
    let ro = ReadOptions::default();
    assert_eq!(db.get(&ro, b"key0000").unwrap(), Some(b"latest".to_vec()));
    for i in 1..800u32 {
        assert_eq!(db.get(&ro, format!("key{i:04}")).unwrap(), Some(format!("value{i}").into_bytes()));
    }

    // New writes still win over repaired data.
    db.put(&WriteOptions::default(), b"key0001", b"after-repair").unwrap();
    assert_eq!(db.get(&ro, b"key0001").unwrap(), Some(b"after-repair".to_vec()));
}

// =============================================================================
// Test 7: Repair refuses an open database and a missing one
// =============================================================================
#[test]
fn repair_needs_a_closed_existing_database() {
    let dir = tempdir().unwrap();
    let db = DB::open(dir.path(), &create_options()).unwrap();
    assert!(matches!(repair_database(dir.path(), &Options::default()), Err(Error::Engine(_))));
    db.close().unwrap();

    assert!(repair_database(dir.path().join("missing"), &Options::default()).is_err());
    repair_database(dir.path(), &Options::default()).unwrap();
    DB::open(dir.path(), &Options::default()).unwrap().close().unwrap();
}
