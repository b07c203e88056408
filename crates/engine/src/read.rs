//! Read path: `get`, `range`, `prefix`, `sorted_keys`.
//!
//! Point lookups check the active memtable, then the immutable queue
//! (newest first), then L0 (newest first, overlapping, bloom-filtered), then
//! L1..Lₙ (binary search by key range, bloom-filtered). The first match —
//! live value or tombstone — wins.
//!
//! Structural state (immutable queue + level vectors) is only ever touched
//! behind a brief read-lock: the lock is released before any SST I/O runs,
//! so a concurrent compaction swap can never block a reader on disk access.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::Instant;

use memtable::ValueEntry;
use sstable::SSTableReader;

use crate::{EngineError, Engine, Shared};

/// Fixed non-key/value overhead of one on-disk SST record (seq + timestamp +
/// op + two length fields + crc), used to turn a returned entry's key/value
/// lengths into an approximate count of bytes actually read off disk.
const RECORD_OVERHEAD_BYTES: u64 = 8 + 8 + 1 + 4 + 4 + 4;

fn entry_disk_bytes(key: &[u8], entry: &ValueEntry) -> u64 {
    key.len() as u64 + entry.value.as_ref().map_or(0, |v| v.len() as u64) + RECORD_OVERHEAD_BYTES
}

impl Engine {
    /// Point lookup. Returns `None` for both "never written" and "deleted".
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        let start = Instant::now();
        let result = get(&self.shared, key);
        self.shared.stats.record_read(start.elapsed());
        result
    }

    /// Returns every live (non-tombstone) entry with a key in
    /// `[start, end_inclusive]`, in ascending key order.
    pub fn range(&self, start: &[u8], end_inclusive: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        merged_range(&self.shared, Bound::Included(start), Bound::Included(end_inclusive))
    }

    /// Returns every live entry whose key starts with `prefix`, in ascending
    /// key order.
    pub fn prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
        let all = merged_range(&self.shared, Bound::Included(prefix), Bound::Unbounded)?;
        Ok(all.into_iter().take_while(|(k, _)| k.starts_with(prefix)).collect())
    }

    /// Returns every live key, in ascending order.
    pub fn sorted_keys(&self) -> Result<Vec<Vec<u8>>, EngineError> {
        let all = merged_range(&self.shared, Bound::Unbounded, Bound::Unbounded)?;
        Ok(all.into_iter().map(|(k, _)| k).collect())
    }
}

fn get(shared: &Arc<Shared>, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
    if let Some(entry) = shared.active.read().get_entry(key).cloned() {
        return Ok(entry.value);
    }

    let (immutables, levels) = {
        let structural = shared.structural.read();
        (
            structural.immutable.clone(),
            structural.levels.clone(),
        )
    };

    for imm in &immutables {
        if let Some(entry) = imm.get_entry(key) {
            return Ok(entry.value.clone());
        }
    }

    // L0: may overlap, newest first.
    for sst in &levels[0] {
        if let Some(entry) = lookup(shared, sst, key)? {
            return Ok(entry.value);
        }
    }

    // L1..: disjoint, sorted by min_key; binary search for the one SST that
    // could hold `key`.
    for level in &levels[1..] {
        if let Some(sst) = find_in_sorted_level(level, key) {
            if let Some(entry) = lookup(shared, &sst, key)? {
                return Ok(entry.value);
            }
        }
    }

    Ok(None)
}

fn lookup(shared: &Arc<Shared>, sst: &SSTableReader, key: &[u8]) -> Result<Option<ValueEntry>, EngineError> {
    if !sst.contains_key_range(key) {
        return Ok(None);
    }
    let found = sst.get(key)?;
    if let Some(entry) = &found {
        shared.stats.bloom_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        shared.stats.record_bytes_read(entry_disk_bytes(key, entry));
    } else {
        shared.stats.bloom_misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }
    Ok(found)
}

/// Binary search over a level whose SSTs are sorted ascending by
/// `min_key` and pairwise disjoint.
fn find_in_sorted_level(level: &[Arc<SSTableReader>], key: &[u8]) -> Option<Arc<SSTableReader>> {
    let idx = level.partition_point(|s| s.max_key() < key);
    level.get(idx).filter(|s| s.contains_key_range(key)).cloned()
}

/// Folds the active memtable, the immutable queue, and every level's SSTs
/// into one sorted, deduplicated view of `[start, end)`, keeping the
/// highest-sequence entry per key and dropping tombstones.
fn merged_range(
    shared: &Arc<Shared>,
    start: Bound<&[u8]>,
    end: Bound<&[u8]>,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>, EngineError> {
    let mut merged: BTreeMap<Vec<u8>, ValueEntry> = BTreeMap::new();
    let apply = |merged: &mut BTreeMap<Vec<u8>, ValueEntry>, key: Vec<u8>, entry: ValueEntry| match merged
        .get(&key)
    {
        Some(existing) if existing.seq >= entry.seq => {}
        _ => {
            merged.insert(key, entry);
        }
    };

    for (k, v) in shared.active.read().range(start, end) {
        apply(&mut merged, k.to_vec(), v.clone());
    }

    let (immutables, levels) = {
        let structural = shared.structural.read();
        (structural.immutable.clone(), structural.levels.clone())
    };

    for imm in &immutables {
        for (k, v) in imm.range(start, end) {
            apply(&mut merged, k.to_vec(), v.clone());
        }
    }

    for level in &levels {
        for sst in level {
            if !range_overlaps_sst(sst, start, end) {
                continue;
            }
            for item in sst.iterator()? {
                let (k, v) = item?;
                if key_in_range(&k, start, end) {
                    shared.stats.record_bytes_read(entry_disk_bytes(&k, &v));
                    apply(&mut merged, k, v);
                }
            }
        }
    }

    Ok(merged
        .into_iter()
        .filter_map(|(k, v)| v.value.map(|val| (k, val)))
        .collect())
}

fn range_overlaps_sst(sst: &SSTableReader, start: Bound<&[u8]>, end: Bound<&[u8]>) -> bool {
    let below_start = match start {
        Bound::Included(s) => sst.max_key() < s,
        Bound::Excluded(s) => sst.max_key() <= s,
        Bound::Unbounded => false,
    };
    let above_end = match end {
        Bound::Included(e) => sst.min_key() > e,
        Bound::Excluded(e) => sst.min_key() >= e,
        Bound::Unbounded => false,
    };
    !below_start && !above_end
}

fn key_in_range(key: &[u8], start: Bound<&[u8]>, end: Bound<&[u8]>) -> bool {
    let after_start = match start {
        Bound::Included(s) => key >= s,
        Bound::Excluded(s) => key > s,
        Bound::Unbounded => true,
    };
    let before_end = match end {
        Bound::Included(e) => key <= e,
        Bound::Excluded(e) => key < e,
        Bound::Unbounded => true,
    };
    after_start && before_end
}
