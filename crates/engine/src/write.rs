//! Write path: `put`, `delete`, and the memtable roll that feeds the flush
//! worker.
//!
//! Every mutation is appended to the WAL first (durable once the next
//! `flush()` returns), then applied to the active memtable synchronously —
//! a `get` immediately after a `put` always observes it, independent of
//! whether the WAL record has been fsynced yet.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use wal::WalRecord;

use crate::{now_ns, validate_key, validate_value, EngineError, Engine, Shared};

impl Engine {
    /// Inserts or overwrites `key` with `value`.
    pub fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<(), EngineError> {
        validate_key(&key)?;
        validate_value(&value)?;
        write_op(&self.shared, key, Some(value))
    }

    /// Records a tombstone for `key`.
    pub fn delete(&self, key: Vec<u8>) -> Result<(), EngineError> {
        validate_key(&key)?;
        write_op(&self.shared, key, None)
    }
}

fn write_op(shared: &Arc<Shared>, key: Vec<u8>, value: Option<Vec<u8>>) -> Result<(), EngineError> {
    if shared.closed.load(Ordering::SeqCst) {
        return Err(EngineError::Closed);
    }
    if shared.read_only.load(Ordering::SeqCst) {
        return Err(EngineError::Corrupt(
            "engine is in read-only mode after a fatal I/O error".into(),
        ));
    }

    let start = std::time::Instant::now();
    let seq = shared.seq.fetch_add(1, Ordering::SeqCst) + 1;
    let timestamp_ns = now_ns();

    let record = match &value {
        Some(v) => WalRecord::Put {
            seq,
            timestamp_ns,
            key: key.clone(),
            value: v.clone(),
        },
        None => WalRecord::Delete {
            seq,
            timestamp_ns,
            key: key.clone(),
        },
    };
    shared.wal.append(record)?;

    {
        let mut mem = shared.active.write();
        match &value {
            Some(v) => mem.put(key, v.clone(), seq, timestamp_ns),
            None => mem.delete(key, seq, timestamp_ns),
        }
    }

    shared.stats.record_write(start.elapsed());
    maybe_roll(shared)?;
    Ok(())
}

/// Rolls the active memtable into the immutable queue if it has crossed a
/// roll threshold, blocking (briefly, polling) if the queue is already at
/// `immutable_queue_max` until the flush worker drains it.
pub(crate) fn maybe_roll(shared: &Arc<Shared>) -> Result<(), EngineError> {
    let needs_roll = shared.active.read().should_flush(&shared.config.memtable);
    if !needs_roll {
        return Ok(());
    }
    roll(shared, false)
}

/// Rolls the active memtable unconditionally, even if it hasn't crossed a
/// threshold (used by `Engine::flush`/`Engine::close`). A roll of an empty
/// memtable is a no-op.
pub(crate) fn force_roll(shared: &Arc<Shared>) -> Result<(), EngineError> {
    if shared.active.read().is_empty() {
        return Ok(());
    }
    roll(shared, true)
}

fn roll(shared: &Arc<Shared>, force: bool) -> Result<(), EngineError> {
    // Structural lock is acquired before the memtable lock, per the
    // crate's lock order (wal -> structural -> memtable).
    loop {
        {
            let structural = shared.structural.read();
            if structural.immutable.len() < shared.config.lsm.immutable_queue_max {
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    let mut structural = shared.structural.write();
    let mut active = shared.active.write();
    if !force && !active.should_flush(&shared.config.memtable) {
        // Someone else already rolled it while we were waiting.
        return Ok(());
    }
    if active.is_empty() {
        return Ok(());
    }

    let frozen = std::mem::replace(&mut *active, memtable::Memtable::new());
    drop(active);
    structural.immutable.push_front(Arc::new(frozen));
    drop(structural);

    let _ = shared.flush_tx.send(crate::workers::WorkerMsg::Wake);
    Ok(())
}
