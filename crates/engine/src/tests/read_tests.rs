use tempfile::tempdir;

use super::helpers::test_config;
use crate::{Engine, EngineError};

type Result<T> = std::result::Result<T, EngineError>;

#[test]
fn range_full_span() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.put(b"b".to_vec(), b"2".to_vec())?;
    engine.put(b"c".to_vec(), b"3".to_vec())?;

    let results = engine.range(b"", &[0xff])?;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], (b"a".to_vec(), b"1".to_vec()));
    assert_eq!(results[1], (b"b".to_vec(), b"2".to_vec()));
    assert_eq!(results[2], (b"c".to_vec(), b"3".to_vec()));
    Ok(())
}

#[test]
fn range_bounded() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    for c in b'a'..=b'z' {
        engine.put(vec![c], vec![c])?;
    }

    // [b, d] inclusive -> b, c, d
    let results = engine.range(b"b", b"d")?;
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].0, b"b".to_vec());
    assert_eq!(results[2].0, b"d".to_vec());
    Ok(())
}

#[test]
fn range_across_memtable_and_sstables() -> Result<()> {
    let dir = tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.memtable.max_bytes = 64;
    let engine = Engine::open(cfg)?;

    for i in 0..20u64 {
        engine.put(format!("k{i:04}").into_bytes(), b"val".to_vec())?;
    }
    engine.flush()?;

    let results = engine.range(b"", &[0xff])?;
    assert_eq!(results.len(), 20);
    for i in 0..19 {
        assert!(results[i].0 < results[i + 1].0);
    }
    Ok(())
}

#[test]
fn range_respects_tombstones() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.put(b"b".to_vec(), b"2".to_vec())?;
    engine.put(b"c".to_vec(), b"3".to_vec())?;
    engine.delete(b"b".to_vec())?;

    let results = engine.range(b"", &[0xff])?;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, b"a".to_vec());
    assert_eq!(results[1].0, b"c".to_vec());
    Ok(())
}

#[test]
fn range_empty_span() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    engine.put(b"a".to_vec(), b"1".to_vec())?;

    let results = engine.range(b"x", b"z")?;
    assert!(results.is_empty());
    Ok(())
}

#[test]
fn prefix_scan_returns_only_matching_keys() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    engine.put(b"user:alice".to_vec(), b"1".to_vec())?;
    engine.put(b"user:bob".to_vec(), b"2".to_vec())?;
    engine.put(b"admin:root".to_vec(), b"9".to_vec())?;

    let results = engine.prefix(b"user:")?;
    assert_eq!(
        results,
        vec![
            (b"user:alice".to_vec(), b"1".to_vec()),
            (b"user:bob".to_vec(), b"2".to_vec()),
        ]
    );
    Ok(())
}

#[test]
fn sorted_keys_excludes_tombstones() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    engine.put(b"a".to_vec(), b"1".to_vec())?;
    engine.put(b"b".to_vec(), b"2".to_vec())?;
    engine.delete(b"a".to_vec())?;

    assert_eq!(engine.sorted_keys()?, vec![b"b".to_vec()]);
    Ok(())
}

#[test]
fn read_path_prefers_l0_over_l1_after_compaction() -> Result<()> {
    let dir = tempdir().unwrap();
    let mut cfg = test_config(dir.path());
    cfg.memtable.max_bytes = 64;
    cfg.lsm.l0_max_ssts = 1;
    let engine = Engine::open(cfg)?;

    engine.put(b"key".to_vec(), b"old".to_vec())?;
    engine.flush()?;
    for i in 0..10u64 {
        engine.put(format!("pad{i:04}").into_bytes(), b"x".to_vec())?;
        engine.flush()?;
    }

    // The background compaction worker may already have caught up by this
    // point (every flush wakes it); `compact()` itself is idempotent, so
    // the assertions below hold regardless of how much it raced ahead.
    engine.compact()?;
    assert_eq!(engine.level_sst_count(0), 0);
    assert!(engine.level_sst_count(1) >= 1);

    engine.put(b"key".to_vec(), b"new".to_vec())?;
    assert_eq!(engine.get(b"key")?.expect("key should exist"), b"new");
    Ok(())
}
