//! # Engine — the LSM storage engine core
//!
//! Owns the active memtable, the immutable memtable queue, the per-level
//! SSTable lists, and the background flush/compaction workers. This crate
//! ties together [`memtable`], [`wal`], and [`sstable`] into the
//! read/write/flush/compact surface consumed by the CLI.
//!
//! ## Concurrency
//!
//! Three long-lived background threads run for the lifetime of an open
//! engine: the WAL's own group-commit worker (owned by [`wal::WalWriter`]),
//! a flush worker, and a compaction worker. Foreground `put`/`get`/`delete`
//! calls run on the caller's thread.
//!
//! Lock order, to prevent deadlock: the WAL's internal lock, then the
//! engine's structural lock (level vectors + immutable queue), then the
//! active memtable lock. No code path acquires them in the opposite order.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use sstable::SSTableReader;
use tracing::{info, warn};

use config::Config;
use memtable::Memtable;

mod checkpoint;
mod compaction;
mod error;
mod flush;
pub mod legacy;
mod manifest;
mod read;
mod recovery;
mod stats;
mod workers;
mod write;

#[cfg(test)]
mod tests;

pub use error::EngineError;
pub use manifest::Manifest;
pub use stats::StatsSnapshot;

/// Largest key this engine will accept. Matches the sanity cap the `sstable`
/// and `wal` crates already enforce on read, so a key the write path admits
/// can never later look "corrupt" to a reader.
pub const MAX_KEY_SIZE: usize = 64 * 1024;
/// Largest value this engine will accept, for the same reason.
pub const MAX_VALUE_SIZE: usize = 64 * 1024 * 1024;

/// Keys may not contain this byte (legacy text-log compatibility: it's the
/// field separator in the `key\tvalue\n` import format).
const TAB_BYTE: u8 = 0x09;

pub(crate) struct Structural {
    /// `levels[0]` is L0 (may overlap, newest-first). `levels[1..]` are
    /// pairwise disjoint and sorted ascending by `min_key`.
    pub(crate) levels: Vec<Vec<Arc<SSTableReader>>>,
    /// Immutable memtables awaiting flush. Newest at the front (pushed there
    /// on roll); the flush worker drains from the back (oldest first).
    pub(crate) immutable: VecDeque<Arc<Memtable>>,
}

pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) data_dir: PathBuf,
    pub(crate) sst_dir: PathBuf,
    pub(crate) wal: wal::WalWriter,
    pub(crate) active: RwLock<Memtable>,
    pub(crate) seq: AtomicU64,
    /// Highest sequence number fully reflected on disk, persisted as the
    /// `recovery_checkpoint` file. Advanced by the flush worker; recovery
    /// uses the on-disk copy to skip already-flushed WAL entries on replay.
    pub(crate) checkpoint: AtomicU64,
    pub(crate) structural: RwLock<Structural>,
    pub(crate) manifest: Mutex<Manifest>,
    pub(crate) stats: stats::Stats,
    pub(crate) flush_tx: Sender<workers::WorkerMsg>,
    pub(crate) compaction_tx: Sender<workers::WorkerMsg>,
    pub(crate) closed: AtomicBool,
    /// Set once a background worker observes an unrecoverable I/O failure,
    /// putting the engine into a read-only mode. Foreground writes consult
    /// this before touching the WAL.
    pub(crate) read_only: AtomicBool,
}

/// A handle to an open storage engine.
///
/// Cloning an `Engine` shares the same underlying state (memtable, levels,
/// background workers) via an internal `Arc`; the engine is only actually
/// torn down — workers joined, files closed — when the last handle is
/// dropped or [`Engine::close`] is called explicitly.
pub struct Engine {
    shared: Arc<Shared>,
    workers: Arc<Mutex<Option<workers::Workers>>>,
}

impl Clone for Engine {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            workers: self.workers.clone(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let structural = self.shared.structural.read();
        f.debug_struct("Engine")
            .field("data_dir", &self.shared.config.resolved_data_dir())
            .field("seq", &self.shared.seq.load(Ordering::SeqCst))
            .field("levels", &structural.levels.iter().map(Vec::len).collect::<Vec<_>>())
            .field("immutable_queue", &structural.immutable.len())
            .finish()
    }
}

impl Engine {
    /// Opens (or creates) an engine rooted at `config.resolved_data_dir()`,
    /// replaying its WAL and loading its manifest.
    pub fn open(config: Config) -> Result<Self, EngineError> {
        let data_dir = config.resolved_data_dir();
        std::fs::create_dir_all(&data_dir)?;
        let sst_dir = data_dir.join("sst");
        std::fs::create_dir_all(&sst_dir)?;

        let (shared, workers_init) = recovery::open(config, data_dir, sst_dir)?;
        let shared = Arc::new(shared);

        let flush_handle = workers::spawn_flush_worker(shared.clone(), workers_init.flush_rx);
        let compaction_handle =
            workers::spawn_compaction_worker(shared.clone(), workers_init.compaction_rx);

        info!(data_dir = %shared.config.resolved_data_dir().display(), "engine opened");

        Ok(Self {
            shared,
            workers: Arc::new(Mutex::new(Some(workers::Workers {
                flush: flush_handle,
                compaction: compaction_handle,
            }))),
        })
    }

    /// Forces a WAL flush, rolls the active memtable into the immutable
    /// queue (even if under threshold), and blocks until the flush worker
    /// has drained the whole queue.
    pub fn flush(&self) -> Result<(), EngineError> {
        write::force_roll(&self.shared)?;
        self.shared.wal.flush()?;
        let _ = self.shared.flush_tx.send(workers::WorkerMsg::Wake);
        flush::drain_immutable_queue(&self.shared)
    }

    /// Runs compaction passes until no level needs further compaction.
    pub fn compact(&self) -> Result<(), EngineError> {
        compaction::drain(&self.shared)
    }

    /// Returns a point-in-time snapshot of engine counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        let structural = self.shared.structural.read();
        let level_sst_counts = structural.levels.iter().map(Vec::len).collect::<Vec<_>>();
        let level_byte_sizes = structural
            .levels
            .iter()
            .map(|lvl| lvl.iter().map(|s| s.file_size()).sum())
            .collect::<Vec<_>>();
        let memtable_size = self.shared.active.read().approx_size();
        let immutable_count = structural.immutable.len();
        drop(structural);
        self.shared
            .stats
            .snapshot(memtable_size, immutable_count, level_sst_counts, level_byte_sizes)
    }

    /// Orderly shutdown: flushes the WAL, rolls and drains the memtable,
    /// joins the background workers, and marks the engine closed. Calling
    /// this more than once (or dropping after calling it) is a no-op.
    pub fn close(&self) -> Result<(), EngineError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let flush_result = (|| -> Result<(), EngineError> {
            write::force_roll(&self.shared)?;
            self.shared.wal.flush()?;
            let _ = self.shared.flush_tx.send(workers::WorkerMsg::Wake);
            flush::drain_immutable_queue(&self.shared)
        })();
        if let Err(e) = &flush_result {
            warn!(error = %e, "final flush during close failed");
        }

        let _ = self.shared.flush_tx.send(workers::WorkerMsg::Shutdown);
        let _ = self.shared.compaction_tx.send(workers::WorkerMsg::Shutdown);
        if let Some(workers) = self.workers.lock().take() {
            workers.join();
        }
        self.shared.wal.close();
        flush_result
    }

    #[must_use]
    pub fn seq(&self) -> u64 {
        self.shared.seq.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.shared.read_only.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn sst_count(&self) -> usize {
        self.shared.structural.read().levels.iter().map(Vec::len).sum()
    }

    #[must_use]
    pub fn level_sst_count(&self, level: usize) -> usize {
        self.shared
            .structural
            .read()
            .levels
            .get(level)
            .map_or(0, Vec::len)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best-effort safety net: only the last live handle actually tears
        // the engine down. `Arc::strong_count` includes this one, so `1`
        // means we're it.
        if Arc::strong_count(&self.shared) == 1 {
            if let Err(e) = self.close() {
                warn!(error = %e, "engine drop: close failed");
            }
        }
    }
}

pub(crate) fn now_ns() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Derives the manifest basename (no directory, no extension) from an
/// SSTable base path such as `.../sst/000042`.
pub(crate) fn basename_of(base: &std::path::Path) -> String {
    base.file_name()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn validate_key(key: &[u8]) -> Result<(), EngineError> {
    if key.contains(&TAB_BYTE) {
        return Err(EngineError::InvalidKey(
            "key must not contain the tab byte".into(),
        ));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(EngineError::InvalidKey(format!(
            "key of {} bytes exceeds the {}-byte limit",
            key.len(),
            MAX_KEY_SIZE
        )));
    }
    Ok(())
}

pub(crate) fn validate_value(value: &[u8]) -> Result<(), EngineError> {
    if value.len() > MAX_VALUE_SIZE {
        return Err(EngineError::InvalidKey(format!(
            "value of {} bytes exceeds the {}-byte limit",
            value.len(),
            MAX_VALUE_SIZE
        )));
    }
    Ok(())
}
