use crate::{SSTableReader, SSTableWriter};
use memtable::Memtable;
use tempfile::tempdir;

const TS: i64 = 1_700_000_000_000_000_000;

fn make_sample_memtable() -> Memtable {
    let mut m = Memtable::new();
    m.put(b"a".to_vec(), b"apple".to_vec(), 1, TS);
    m.put(b"b".to_vec(), b"banana".to_vec(), 2, TS + 1);
    m.put(b"c".to_vec(), b"".to_vec(), 3, TS + 2);
    m.delete(b"d".to_vec(), 4, TS + 3);
    m
}

#[test]
fn open_and_get_entries() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("sample");
    let mem = make_sample_memtable();
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();

    let a = reader.get(b"a").unwrap().expect("a must exist");
    assert_eq!(a.seq, 1);
    assert_eq!(a.value, Some(b"apple".to_vec()));

    let b = reader.get(b"b").unwrap().expect("b must exist");
    assert_eq!(b.seq, 2);
    assert_eq!(b.value, Some(b"banana".to_vec()));

    let c = reader.get(b"c").unwrap().expect("c must exist");
    assert_eq!(c.seq, 3);
    assert_eq!(c.value, Some(b"".to_vec()));

    let d = reader.get(b"d").unwrap().expect("d must exist");
    assert_eq!(d.seq, 4);
    assert!(d.is_tombstone());

    assert!(reader.get(b"nope").unwrap().is_none());
}

#[test]
fn len_and_is_empty() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("len");
    let mem = make_sample_memtable();
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();
    assert_eq!(reader.len(), 4);
    assert!(!reader.is_empty());
}

#[test]
fn large_value_roundtrip() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("bigval");

    let mut mem = Memtable::new();
    let big = vec![b'x'; 500_000];
    mem.put(b"big".to_vec(), big, 1, TS);
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();
    let entry = reader.get(b"big").unwrap().unwrap();
    assert_eq!(entry.value.unwrap().len(), 500_000);
}

#[test]
fn bloom_filter_finds_all_inserted_keys() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("bloom_hit");

    let mut mem = Memtable::new();
    for i in 0..500u64 {
        mem.put(format!("key{:04}", i).into_bytes(), b"v".to_vec(), i, TS);
    }
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();
    for i in 0..500u64 {
        let key = format!("key{:04}", i).into_bytes();
        assert!(
            reader.get(&key).unwrap().is_some(),
            "key{:04} should exist",
            i
        );
    }
}

#[test]
fn bloom_filter_rejects_most_missing_keys() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("bloom_miss");

    let mut mem = Memtable::new();
    for i in 0..100u64 {
        mem.put(format!("exist{:04}", i).into_bytes(), b"v".to_vec(), i, TS);
    }
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();

    let mut misses = 0;
    for i in 0..100u64 {
        let key = format!("missing{:04}", i).into_bytes();
        if reader.get(&key).unwrap().is_none() {
            misses += 1;
        }
    }
    assert!(
        misses > 90,
        "bloom filter should reject most missing keys, got {} misses out of 100",
        misses
    );
}

#[test]
fn open_missing_data_file() {
    let result = SSTableReader::open(std::path::Path::new("/tmp/no_such_riptide_sstable"));
    assert!(result.is_err());
}

#[test]
fn open_corrupt_header_magic() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("badmagic");
    std::fs::write(base.with_extension("sst"), b"not an sstable header at all").unwrap();

    let result = SSTableReader::open(&base);
    assert!(result.is_err());
}

#[test]
fn iterator_yields_keys_in_sorted_order() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("sorted");

    let mut mem = Memtable::new();
    mem.put(b"z".to_vec(), b"1".to_vec(), 1, TS);
    mem.put(b"a".to_vec(), b"2".to_vec(), 2, TS);
    mem.put(b"m".to_vec(), b"3".to_vec(), 3, TS);
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();
    let keys: Vec<Vec<u8>> = reader
        .iterator()
        .unwrap()
        .map(|r| r.unwrap().0)
        .collect();
    assert_eq!(keys, vec![b"a".to_vec(), b"m".to_vec(), b"z".to_vec()]);
}

#[test]
fn multiple_gets_on_same_reader() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("multi");

    let mut mem = Memtable::new();
    for i in 0..100u64 {
        mem.put(format!("k{:03}", i).into_bytes(), b"v".to_vec(), i, TS);
    }
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();
    for _ in 0..2 {
        for i in 0..100u64 {
            let key = format!("k{:03}", i).into_bytes();
            let entry = reader.get(&key).unwrap().unwrap();
            assert_eq!(entry.seq, i);
        }
    }
}

#[test]
fn get_with_variable_length_values_reads_exact_record_bounds() {
    // Each record's on-disk length varies wildly; a wrong `.idx` length
    // would read past one record into the next and corrupt the parse.
    let dir = tempdir().unwrap();
    let base = dir.path().join("varlen");

    let records: Vec<(&[u8], u8, usize)> = vec![
        (b"k0", b'x', 0),
        (b"k1", b'a', 3),
        (b"k2", b'b', 10_000),
        (b"k3", b'c', 1),
        (b"k4", b'd', 50_000),
    ];

    let mut mem = Memtable::new();
    for (i, (key, fill, len)) in records.iter().enumerate() {
        mem.put(key.to_vec(), vec![*fill; *len], i as u64, TS);
    }
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();

    // Fetch out of on-disk order so each `get` seeks into the middle of the
    // file rather than happening to read records front-to-back.
    for &(key, fill, len) in records.iter().rev() {
        let entry = reader.get(key).unwrap().expect("key must exist");
        let value = entry.value.unwrap();
        assert_eq!(value.len(), len);
        assert!(value.iter().all(|&b| b == fill));
    }
}

#[test]
fn contains_key_range_rejects_keys_outside_min_max() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("range");

    let mut mem = Memtable::new();
    mem.put(b"m".to_vec(), b"1".to_vec(), 1, TS);
    mem.put(b"n".to_vec(), b"2".to_vec(), 2, TS);
    SSTableWriter::write_from_memtable(&base, 0, &mem, 0.01, TS).unwrap();

    let reader = SSTableReader::open(&base).unwrap();
    assert!(!reader.contains_key_range(b"a"));
    assert!(!reader.contains_key_range(b"z"));
    assert!(reader.contains_key_range(b"m"));
}
