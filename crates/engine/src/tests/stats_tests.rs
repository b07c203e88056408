use tempfile::tempdir;

use super::helpers::test_config;
use crate::{Engine, EngineError};

type Result<T> = std::result::Result<T, EngineError>;

#[test]
fn bytes_written_tracks_flushed_sstable_sizes() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    assert_eq!(engine.stats().bytes_written, 0);

    engine.put(b"k".to_vec(), b"v".to_vec())?;
    engine.flush()?;

    let after_one = engine.stats().bytes_written;
    assert!(after_one > 0, "flushing an sstable should record its on-disk size");

    engine.put(b"k2".to_vec(), b"v2".to_vec())?;
    engine.flush()?;

    assert!(
        engine.stats().bytes_written > after_one,
        "a second flush should add to the running total, not replace it"
    );
    Ok(())
}

#[test]
fn bytes_read_tracks_point_lookups_served_from_sstables() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    engine.put(b"k".to_vec(), b"value".to_vec())?;
    engine.flush()?;

    assert_eq!(
        engine.stats().bytes_read,
        0,
        "nothing has been read from disk yet"
    );

    assert_eq!(engine.get(b"k")?.unwrap(), b"value".to_vec());
    assert!(
        engine.stats().bytes_read > 0,
        "a point lookup served from an sstable should record bytes read"
    );
    Ok(())
}

#[test]
fn bytes_read_ignores_lookups_served_from_the_memtable() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    engine.put(b"k".to_vec(), b"value".to_vec())?;
    assert_eq!(engine.get(b"k")?.unwrap(), b"value".to_vec());

    assert_eq!(
        engine.stats().bytes_read,
        0,
        "a lookup satisfied by the active memtable never touches disk"
    );
    Ok(())
}

#[test]
fn bytes_read_tracks_range_scans_over_sstables() -> Result<()> {
    let dir = tempdir().unwrap();
    let engine = Engine::open(test_config(dir.path()))?;

    for c in b'a'..=b'e' {
        engine.put(vec![c], vec![c])?;
    }
    engine.flush()?;

    assert_eq!(engine.stats().bytes_read, 0);
    let results = engine.range(b"a", b"e")?;
    assert_eq!(results.len(), 5);
    assert!(
        engine.stats().bytes_read > 0,
        "a range scan reading through an sstable should record bytes read"
    );
    Ok(())
}
