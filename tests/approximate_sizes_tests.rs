// ApproximateSizes: estimates from table offsets, monotonic in the bounds.

use lsmkv::{Compression, DB, Options, Range, WriteOptions};
use proptest::prelude::*;
use tempfile::{TempDir, tempdir};

const KEYS: u32 = 5000;

fn key(i: u32) -> String {
    format!("key{i:06}")
}

fn populated_db() -> (TempDir, DB) {
    let dir = tempdir().unwrap();
    let mut options = Options::default();
    options
        .set_create_if_missing(true)
        .set_compression(Compression::None)
        .set_block_size(1024);
    let db = DB::open(dir.path(), &options).unwrap();
    let wo = WriteOptions::default();
    for i in 0..KEYS {
        db.put(&wo, key(i), vec![b'x'; 100]).unwrap();
    }
    db.compact_range(None, None).unwrap();
    (dir, db)
}

// =============================================================================
// Test 1: Memtable-only data is not counted
// =============================================================================
#[test]
fn memtable_data_is_not_counted() {
    let dir = tempdir().unwrap();
    let mut options = Options::default();
    options.set_create_if_missing(true);
    let db = DB::open(dir.path(), &options).unwrap();
    db.put(&WriteOptions::default(), b"a", b"1").unwrap();
    assert_eq!(db.approximate_sizes(&[Range::new("a", "z")]).unwrap(), vec![0]);
}

// =============================================================================
// Test 2: Sizes roughly track the data in each range
// =============================================================================
#[test]
fn sizes_track_range_width() {
    let (_dir, db) = populated_db();
    let sizes = db
        .approximate_sizes(&[
            Range::new(key(0), key(KEYS)),
            Range::new(key(0), key(KEYS / 2)),
            Range::new(key(1000), key(1100)),
            Range::new("a", "b"),
            Range::new(key(10), key(5)),
        ])
        .unwrap();

    // ~5000 entries of ~120 bytes each.
    assert!(sizes[0] > 400_000 && sizes[0] < 1_000_000, "full: {}", sizes[0]);
    assert!(sizes[1] > sizes[0] / 3 && sizes[1] < sizes[0] * 2 / 3, "half: {}", sizes[1]);
    assert!(sizes[2] < sizes[1]);
    assert_eq!(sizes[3], 0);
    // Reversed bounds are an empty range.
    assert_eq!(sizes[4], 0);
}

// =============================================================================
// Test 3: Enlarging a range never shrinks its estimate
// =============================================================================
#[test]
fn enlarging_bounds_is_monotonic() {
    let (_dir, db) = populated_db();

    proptest!(ProptestConfig::with_cases(128), |(
        mut points in prop::collection::vec(0..KEYS + 10, 4)
    )| {
        points.sort_unstable();
        let (outer_start, inner_start, inner_limit, outer_limit) =
            (points[0], points[1], points[2], points[3]);
        let sizes = db
            .approximate_sizes(&[
                Range::new(key(inner_start), key(inner_limit)),
                Range::new(key(outer_start), key(outer_limit)),
            ])
            .unwrap();
        prop_assert!(sizes[0] <= sizes[1], "inner {} > outer {}", sizes[0], sizes[1]);
    });
}
