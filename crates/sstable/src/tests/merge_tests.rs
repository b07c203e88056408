use crate::{MergeIterator, SSTableReader, SSTableWriter};
use memtable::Memtable;
use tempfile::tempdir;

const TS: i64 = 1_700_000_000_000_000_000;

/// Writes `entries` (key, value-or-tombstone, seq) to a fresh SSTable under
/// `dir` and opens a reader over it.
fn write_and_open(
    dir: &std::path::Path,
    name: &str,
    entries: &[(&[u8], Option<&[u8]>, u64)],
) -> SSTableReader {
    let base = dir.join(name);
    let mut mem = Memtable::new();
    for &(key, val, seq) in entries {
        match val {
            Some(v) => mem.put(key.to_vec(), v.to_vec(), seq, TS),
            None => mem.delete(key.to_vec(), seq, TS),
        }
    }
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();
    SSTableReader::open(&base).unwrap()
}

#[test]
fn merge_single_sstable() {
    let dir = tempdir().unwrap();
    let r = write_and_open(
        dir.path(),
        "a",
        &[
            (b"a", Some(b"1"), 1),
            (b"b", Some(b"2"), 2),
            (b"c", Some(b"3"), 3),
        ],
    );

    let readers = vec![r];
    let mut iter = MergeIterator::new(&readers).unwrap();
    let result = iter.collect_all().unwrap();

    assert_eq!(result.len(), 3);
    assert_eq!(result[0].0, b"a");
    assert_eq!(result[1].0, b"b");
    assert_eq!(result[2].0, b"c");
}

#[test]
fn merge_two_non_overlapping() {
    let dir = tempdir().unwrap();
    let r1 = write_and_open(dir.path(), "a", &[(b"a", Some(b"1"), 1), (b"b", Some(b"2"), 2)]);
    let r2 = write_and_open(dir.path(), "b", &[(b"c", Some(b"3"), 3), (b"d", Some(b"4"), 4)]);

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers).unwrap();
    let result = iter.collect_all().unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result[0].0, b"a");
    assert_eq!(result[1].0, b"b");
    assert_eq!(result[2].0, b"c");
    assert_eq!(result[3].0, b"d");
}

#[test]
fn merge_many_keys_across_sstables() {
    let dir = tempdir().unwrap();

    let mut mem1 = Memtable::new();
    for i in 0..100u64 {
        mem1.put(format!("key{:04}", i).into_bytes(), b"v1".to_vec(), i, TS);
    }
    SSTableWriter::write_from_memtable(&dir.path().join("1"), 0, &mem1, 0.01, TS).unwrap();

    let mut mem2 = Memtable::new();
    for i in 50..150u64 {
        mem2.put(
            format!("key{:04}", i).into_bytes(),
            b"v2".to_vec(),
            i + 100,
            TS,
        );
    }
    SSTableWriter::write_from_memtable(&dir.path().join("2"), 0, &mem2, 0.01, TS).unwrap();

    let r1 = SSTableReader::open(&dir.path().join("1")).unwrap();
    let r2 = SSTableReader::open(&dir.path().join("2")).unwrap();

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers).unwrap();
    let result = iter.collect_all().unwrap();

    // keys 0..150 = 150 unique keys
    assert_eq!(result.len(), 150);

    for (key, entry) in &result {
        let key_str = String::from_utf8_lossy(key);
        if let Ok(num) = key_str.trim_start_matches("key").parse::<u64>() {
            if (50..100).contains(&num) {
                assert_eq!(entry.seq, num + 100, "key {} should have seq from r2", num);
                assert_eq!(entry.value, Some(b"v2".to_vec()));
            }
        }
    }

    let keys: Vec<&[u8]> = result.iter().map(|(k, _)| k.as_slice()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn merge_three_sstables_with_overlap() {
    let dir = tempdir().unwrap();
    let r1 = write_and_open(dir.path(), "1", &[(b"a", Some(b"v1"), 1), (b"c", Some(b"v1"), 1)]);
    let r2 = write_and_open(dir.path(), "2", &[(b"b", Some(b"v2"), 2), (b"c", Some(b"v2"), 2)]);
    let r3 = write_and_open(dir.path(), "3", &[(b"c", Some(b"v3"), 3), (b"d", Some(b"v3"), 3)]);

    let readers = vec![r1, r2, r3];
    let mut iter = MergeIterator::new(&readers).unwrap();
    let result = iter.collect_all().unwrap();

    assert_eq!(result.len(), 4);
    assert_eq!(result[0].0, b"a");
    assert_eq!(result[1].0, b"b");
    assert_eq!(result[2].0, b"c");
    assert_eq!(result[2].1.seq, 3);
    assert_eq!(result[2].1.value, Some(b"v3".to_vec()));
    assert_eq!(result[3].0, b"d");
}

#[test]
fn merge_no_readers() {
    let readers: Vec<SSTableReader> = vec![];
    let mut iter = MergeIterator::new(&readers).unwrap();
    let result = iter.collect_all().unwrap();
    assert!(result.is_empty());
}

#[test]
fn merge_output_is_sorted() {
    let dir = tempdir().unwrap();
    let r1 = write_and_open(
        dir.path(),
        "1",
        &[
            (b"z", Some(b"1"), 1),
            (b"m", Some(b"2"), 2),
            (b"a", Some(b"3"), 3),
        ],
    );
    let r2 = write_and_open(dir.path(), "2", &[(b"x", Some(b"4"), 4), (b"b", Some(b"5"), 5)]);

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers).unwrap();
    let result = iter.collect_all().unwrap();

    let keys: Vec<&[u8]> = result.iter().map(|(k, _)| k.as_slice()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn merge_overlapping_keys_highest_seq_wins() {
    let dir = tempdir().unwrap();
    let r1 = write_and_open(dir.path(), "old", &[(b"key", Some(b"old_value"), 1)]);
    let r2 = write_and_open(dir.path(), "new", &[(b"key", Some(b"new_value"), 5)]);

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers).unwrap();
    let result = iter.collect_all().unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].0, b"key");
    assert_eq!(result[0].1.seq, 5);
    assert_eq!(result[0].1.value, Some(b"new_value".to_vec()));
}

#[test]
fn merge_tombstone_wins_over_older_value() {
    let dir = tempdir().unwrap();
    let r1 = write_and_open(dir.path(), "old", &[(b"key", Some(b"alive"), 1)]);
    let r2 = write_and_open(dir.path(), "new", &[(b"key", None, 5)]);

    let readers = vec![r1, r2];
    let mut iter = MergeIterator::new(&readers).unwrap();
    let result = iter.collect_all().unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].1.seq, 5);
    assert!(result[0].1.is_tombstone());
}

#[test]
fn merge_preserves_relative_order_within_equal_keys_from_same_source() {
    // A single source never emits duplicate keys (the writer rejects them),
    // so merging one reader with itself-shaped input is just a pass-through.
    let dir = tempdir().unwrap();
    let r = write_and_open(
        dir.path(),
        "solo",
        &[(b"a", Some(b"1"), 1), (b"b", Some(b"2"), 2)],
    );
    let readers = vec![r];
    let mut iter = MergeIterator::new(&readers).unwrap();
    assert_eq!(iter.next_entry().unwrap().unwrap().0, b"a");
    assert_eq!(iter.next_entry().unwrap().unwrap().0, b"b");
    assert!(iter.next_entry().unwrap().is_none());
}
