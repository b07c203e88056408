//! Flush worker body: turns the oldest immutable memtable into a new L0
//! SSTable.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use sstable::{SSTableReader, SSTableWriter};
use tracing::{error, info, warn};

use crate::{basename_of, now_ns, EngineError, Shared};

/// Pops and flushes one immutable memtable, if any is queued. Returns
/// `true` if it flushed something (so the caller can loop until the queue
/// is empty), `false` if the queue was already empty.
pub(crate) fn flush_one(shared: &Arc<Shared>) -> Result<bool, EngineError> {
    let imm = {
        let mut structural = shared.structural.write();
        structural.immutable.pop_back()
    };
    let imm = match imm {
        Some(m) => m,
        None => return Ok(false),
    };

    if imm.is_empty() {
        return Ok(true);
    }

    let created_at_ns = now_ns();
    let mut manifest = shared.manifest.lock();
    let id = manifest.alloc_file_id();
    let base = shared.sst_dir.join(format!("{:06}", id));

    let result = SSTableWriter::write_from_memtable(&base, 0, &imm, shared.config.lsm.bloom_fpr, created_at_ns)
        .map_err(EngineError::from)
        .and_then(|_| SSTableReader::open(&base).map_err(EngineError::from));

    let reader = match result {
        Ok(reader) => reader,
        Err(e) => {
            error!(error = %e, "flush failed, leaving memtable queued for retry");
            shared.stats.record_io_error();
            // Put it back at the tail so the next tick retries it, and
            // remove whatever partial files got left behind.
            let mut structural = shared.structural.write();
            structural.immutable.push_back(imm);
            drop(structural);
            cleanup_partial(&base);
            return Err(e);
        }
    };

    manifest.add(basename_of(&base), 0);
    manifest.save()?;
    drop(manifest);

    shared.stats.record_bytes_written(reader.file_size());

    {
        let mut structural = shared.structural.write();
        structural.levels[0].insert(0, Arc::new(reader));
    }

    let flushed_max_seq = imm.iter().map(|(_, entry)| entry.seq).max().unwrap_or(0);
    let checkpoint = shared.checkpoint.fetch_max(flushed_max_seq, Ordering::SeqCst).max(flushed_max_seq);
    if let Err(e) = crate::checkpoint::write(&shared.data_dir, checkpoint) {
        warn!(error = %e, "failed to persist recovery checkpoint after flush");
    }
    if let Err(e) = shared.wal.retire_segments_below(checkpoint) {
        warn!(error = %e, "failed to retire checkpointed wal segments");
    }

    shared.stats.flush_count.fetch_add(1, Ordering::Relaxed);
    info!(file = %base.display(), "flushed immutable memtable to L0");

    let _ = shared.compaction_tx.send(crate::workers::WorkerMsg::Wake);
    Ok(true)
}

fn cleanup_partial(base: &std::path::Path) {
    for ext in ["sst", "idx", "bloom"] {
        let _ = std::fs::remove_file(base.with_extension(ext));
    }
}

/// Flushes immutable memtables until the queue is empty. Used by
/// `Engine::flush`/`Engine::close`, which need to observe the queue fully
/// drained before returning, not just signaled.
pub(crate) fn drain_immutable_queue(shared: &Arc<Shared>) -> Result<(), EngineError> {
    loop {
        let pending = !shared.structural.read().immutable.is_empty();
        if !pending {
            return Ok(());
        }
        if !flush_one(shared)? {
            return Ok(());
        }
    }
}
