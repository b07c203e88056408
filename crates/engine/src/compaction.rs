//! Compaction manager (C6): selects candidate SSTs, k-way merges them, and
//! atomically swaps the results into the level structure under the
//! structural lock.
//!
//! Three strategies, selected by `config.lsm.compaction_style`:
//! - **Leveled** (default): pick the oldest SST from level L (or, for L0,
//!   every L0 SST at once, since L0 entries may overlap each other), merge
//!   it with whatever overlaps it in L+1, and reinstall sorted by
//!   `min_key`.
//! - **SizeTiered**: group similarly-sized SSTs in L0 and merge a group of
//!   ≥3 into one output SST at the same level.
//! - **Hybrid**: size-tiered at L0, leveled at L≥1.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use config::CompactionStyle;
use memtable::ValueEntry;
use sstable::{MergeIterator, SSTableReader, SSTableWriter};
use tracing::{info, warn};

use crate::manifest::Manifest;
use crate::{basename_of, now_ns, EngineError, Shared};

/// Average non-key/value overhead of one on-disk entry (seq + timestamp +
/// op + length fields + crc), used only to size compaction output chunks.
const ENTRY_OVERHEAD_BYTES: u64 = 8 + 8 + 1 + 4 + 4 + 4;

/// Runs compaction passes until none of them find anything to do.
pub(crate) fn drain(shared: &Arc<Shared>) -> Result<(), EngineError> {
    while run_one_pass(shared)? {}
    Ok(())
}

pub(crate) fn run_one_pass(shared: &Arc<Shared>) -> Result<bool, EngineError> {
    match shared.config.lsm.compaction_style {
        CompactionStyle::Leveled => compact_leveled_pass(shared),
        CompactionStyle::SizeTiered => compact_size_tiered(shared, 0),
        CompactionStyle::Hybrid => {
            if compact_size_tiered(shared, 0)? {
                return Ok(true);
            }
            compact_leveled_from(shared, 1)
        }
    }
}

fn compact_leveled_pass(shared: &Arc<Shared>) -> Result<bool, EngineError> {
    compact_leveled_from(shared, 0)
}

fn compact_leveled_from(shared: &Arc<Shared>, start_level: usize) -> Result<bool, EngineError> {
    let bottom = shared.config.lsm.bottom_level();
    for level in start_level..bottom {
        if level_needs_compaction(shared, level) && compact_level_into_next(shared, level)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn level_needs_compaction(shared: &Arc<Shared>, level: usize) -> bool {
    let structural = shared.structural.read();
    if level >= structural.levels.len() || structural.levels[level].is_empty() {
        return false;
    }
    if level == 0 {
        return structural.levels[0].len() > shared.config.lsm.l0_max_ssts;
    }
    let total: u64 = structural.levels[level].iter().map(|s| s.file_size()).sum();
    total > shared.config.lsm.level_capacity(level, shared.config.memtable.max_bytes)
}

fn compact_level_into_next(shared: &Arc<Shared>, level: usize) -> Result<bool, EngineError> {
    let next = level + 1;

    let (inputs, overlaps) = {
        let structural = shared.structural.read();
        if structural.levels[level].is_empty() {
            return Ok(false);
        }
        let inputs: Vec<Arc<SSTableReader>> = if level == 0 {
            structural.levels[0].clone()
        } else {
            vec![pick_oldest(&structural.levels[level])]
        };
        let (lo, hi) = key_span(&inputs);
        let overlaps: Vec<Arc<SSTableReader>> = structural.levels[next]
            .iter()
            .filter(|s| ranges_overlap(s.min_key(), s.max_key(), &lo, &hi))
            .cloned()
            .collect();
        (inputs, overlaps)
    };

    let total_bytes: u64 = inputs.iter().chain(overlaps.iter()).map(|s| s.file_size()).sum();
    if total_bytes > shared.config.lsm.max_compaction_bytes {
        warn!(level, total_bytes, "compaction candidate exceeds max_compaction_bytes, skipping");
        return Ok(false);
    }

    let drop_tombstones = next == shared.config.lsm.bottom_level();
    let merged = merge_inputs(&inputs, &overlaps, drop_tombstones)?;
    if merged.is_empty() {
        retire(shared, &[(level, &inputs), (next, &overlaps)], &[], next)?;
        info!(level, next, "compaction produced no live entries, inputs retired");
        return Ok(true);
    }

    let target = shared.config.lsm.target_file_size(next, shared.config.memtable.max_bytes);
    let min_output = target / 10;
    let chunks = split_into_chunks(merged, target, min_output);

    let mut new_readers = Vec::with_capacity(chunks.len());
    {
        let mut manifest = shared.manifest.lock();
        for chunk in chunks {
            let id = manifest.alloc_file_id();
            let base = shared.sst_dir.join(format!("{:06}", id));
            SSTableWriter::write_from_iterator(&base, next as u32, chunk.into_iter(), shared.config.lsm.bloom_fpr, now_ns())?;
            let reader = SSTableReader::open(&base)?;
            manifest.add(basename_of(&base), next);
            shared.stats.record_bytes_written(reader.file_size());
            new_readers.push(Arc::new(reader));
        }
    }

    retire(shared, &[(level, &inputs), (next, &overlaps)], &new_readers, next)?;
    shared.stats.compaction_count.fetch_add(1, Ordering::Relaxed);
    info!(level, next, inputs = inputs.len(), overlaps = overlaps.len(), outputs = new_readers.len(), "compacted");
    Ok(true)
}

/// Size-tiered compaction: groups SSTs in `level` whose sizes sit within a
/// factor of 2 of each other and merges a group of ≥3 into one output SST
/// at the same level.
fn compact_size_tiered(shared: &Arc<Shared>, level: usize) -> Result<bool, EngineError> {
    let candidates = {
        let structural = shared.structural.read();
        if level >= structural.levels.len() {
            return Ok(false);
        }
        let mut ssts = structural.levels[level].clone();
        ssts.sort_by_key(|s| s.file_size());
        ssts
    };

    let min_comp = shared.config.lsm.target_file_size(level.max(1), shared.config.memtable.max_bytes) / 10;
    let max_comp = shared.config.lsm.max_compaction_bytes;

    let mut start = 0;
    while start < candidates.len() {
        let mut end = start + 1;
        let mut total = candidates[start].file_size();
        while end < candidates.len() && candidates[end].file_size() <= candidates[start].file_size().max(1) * 2 {
            total += candidates[end].file_size();
            end += 1;
        }
        let group = &candidates[start..end];
        if group.len() >= 3 && total >= min_comp && total <= max_comp {
            let group = group.to_vec();
            let merged = merge_inputs(&group, &[], level == shared.config.lsm.bottom_level())?;
            if merged.is_empty() {
                retire(shared, &[(level, group.as_slice())], &[], level)?;
                return Ok(true);
            }
            let mut manifest = shared.manifest.lock();
            let id = manifest.alloc_file_id();
            let base = shared.sst_dir.join(format!("{:06}", id));
            SSTableWriter::write_from_iterator(&base, level as u32, merged.into_iter(), shared.config.lsm.bloom_fpr, now_ns())?;
            let reader = Arc::new(SSTableReader::open(&base)?);
            manifest.add(basename_of(&base), level);
            shared.stats.record_bytes_written(reader.file_size());
            drop(manifest);

            retire(shared, &[(level, group.as_slice())], std::slice::from_ref(&reader), level)?;
            shared.stats.compaction_count.fetch_add(1, Ordering::Relaxed);
            info!(level, group = group.len(), "size-tiered compaction");
            return Ok(true);
        }
        start = end;
    }

    Ok(false)
}

fn pick_oldest(level: &[Arc<SSTableReader>]) -> Arc<SSTableReader> {
    level
        .iter()
        .min_by(|a, b| {
            a.created_at_ns()
                .cmp(&b.created_at_ns())
                .then_with(|| a.min_key().cmp(b.min_key()))
        })
        .cloned()
        .expect("caller checked level is non-empty")
}

fn key_span(ssts: &[Arc<SSTableReader>]) -> (Vec<u8>, Vec<u8>) {
    let lo = ssts.iter().map(|s| s.min_key().to_vec()).min().unwrap_or_default();
    let hi = ssts.iter().map(|s| s.max_key().to_vec()).max().unwrap_or_default();
    (lo, hi)
}

fn ranges_overlap(min1: &[u8], max1: &[u8], min2: &[u8], max2: &[u8]) -> bool {
    !(max1 < min2 || max2 < min1)
}

/// Reopens a fresh, independent file handle for a compaction input. Levels
/// share readers via `Arc` with concurrent point lookups, so compaction
/// opens its own handles rather than borrowing theirs.
fn reopen(sst: &SSTableReader) -> Result<SSTableReader, EngineError> {
    let base = base_of(sst);
    Ok(SSTableReader::open(&base)?)
}

fn base_of(sst: &SSTableReader) -> PathBuf {
    sst.paths().data.with_extension("")
}

fn merge_inputs(
    inputs: &[Arc<SSTableReader>],
    overlaps: &[Arc<SSTableReader>],
    drop_tombstones: bool,
) -> Result<Vec<(Vec<u8>, ValueEntry)>, EngineError> {
    let mut owned = Vec::with_capacity(inputs.len() + overlaps.len());
    for sst in inputs.iter().chain(overlaps.iter()) {
        owned.push(reopen(sst)?);
    }
    let mut iter = MergeIterator::new(&owned)?;
    let mut out = Vec::new();
    while let Some((key, entry)) = iter.next_entry()? {
        if drop_tombstones && entry.is_tombstone() {
            continue;
        }
        out.push((key, entry));
    }
    Ok(out)
}

fn entry_footprint(key: &[u8], entry: &ValueEntry) -> u64 {
    (key.len() as u64) + entry.value.as_ref().map_or(0, |v| v.len() as u64) + ENTRY_OVERHEAD_BYTES
}

/// Splits sorted, deduplicated entries into output chunks sized around
/// `target_bytes`, never emitting a trailing chunk smaller than
/// `min_bytes` unless the whole input is smaller than that.
fn split_into_chunks(
    entries: Vec<(Vec<u8>, ValueEntry)>,
    target_bytes: u64,
    min_bytes: u64,
) -> Vec<Vec<(Vec<u8>, ValueEntry)>> {
    let total: u64 = entries.iter().map(|(k, v)| entry_footprint(k, v)).sum();
    if target_bytes == 0 || total <= target_bytes.max(min_bytes) {
        return vec![entries];
    }

    let mut chunks = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes = 0u64;
    for (key, entry) in entries {
        current_bytes += entry_footprint(&key, &entry);
        current.push((key, entry));
        if current_bytes >= target_bytes {
            chunks.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
    }
    if !current.is_empty() {
        let trailing: u64 = current.iter().map(|(k, v)| entry_footprint(k, v)).sum();
        if trailing < min_bytes && !chunks.is_empty() {
            chunks.last_mut().expect("checked non-empty").extend(current);
        } else {
            chunks.push(current);
        }
    }
    chunks
}

/// Atomically swaps the SSTs in `removals` (each tagged with the level it
/// currently lives in) for `installed` at `installed_level`: persists the
/// manifest, updates in-memory level vectors, then deletes the retired
/// files from disk (only once the manifest no longer references them, so a
/// crash mid-retire never loses a live SST).
fn retire(
    shared: &Arc<Shared>,
    removals: &[(usize, &[Arc<SSTableReader>])],
    installed: &[Arc<SSTableReader>],
    installed_level: usize,
) -> Result<(), EngineError> {
    let retired_basenames: Vec<String> = removals
        .iter()
        .flat_map(|(_, ssts)| ssts.iter())
        .map(|s| basename_of(&base_of(s)))
        .collect();
    let retired_refs: Vec<&str> = retired_basenames.iter().map(String::as_str).collect();

    {
        let mut manifest = shared.manifest.lock();
        manifest.remove(&retired_refs);
        manifest.save()?;
    }

    {
        let mut structural = shared.structural.write();
        for (level, ssts) in removals {
            retain_not_in(&mut structural.levels, *level, ssts);
        }
        for reader in installed {
            install_into_level(&mut structural.levels[installed_level], reader.clone(), installed_level);
        }
    }

    for basename in &retired_basenames {
        for ext in ["sst", "idx", "bloom"] {
            let _ = std::fs::remove_file(shared.sst_dir.join(basename).with_extension(ext));
        }
    }

    Ok(())
}

fn retain_not_in(levels: &mut [Vec<Arc<SSTableReader>>], level: usize, remove: &[Arc<SSTableReader>]) {
    if remove.is_empty() {
        return;
    }
    let remove_paths: Vec<PathBuf> = remove.iter().map(|s| s.paths().data.clone()).collect();
    levels[level].retain(|s| !remove_paths.contains(&s.paths().data));
}

fn install_into_level(level_vec: &mut Vec<Arc<SSTableReader>>, reader: Arc<SSTableReader>, level: usize) {
    if level == 0 {
        level_vec.insert(0, reader);
        return;
    }
    let idx = level_vec.partition_point(|s| s.min_key() < reader.min_key());
    level_vec.insert(idx, reader);
}

