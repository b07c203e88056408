//! Engine statistics, exposed via [`crate::Engine::stats`].
//!
//! A fixed record of atomics, cheap to update from any thread without a
//! lock: every counter is a plain `AtomicU64` bumped with `Ordering::Relaxed`
//! on the hot path and only assembled into a [`StatsSnapshot`] on demand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Stats {
    pub(crate) bloom_hits: AtomicU64,
    pub(crate) bloom_misses: AtomicU64,
    pub(crate) bytes_read: AtomicU64,
    pub(crate) bytes_written: AtomicU64,
    pub(crate) flush_count: AtomicU64,
    pub(crate) compaction_count: AtomicU64,
    pub(crate) read_count: AtomicU64,
    pub(crate) read_nanos_total: AtomicU64,
    pub(crate) write_count: AtomicU64,
    pub(crate) write_nanos_total: AtomicU64,
    pub(crate) io_errors: AtomicU64,
}

impl Stats {
    pub(crate) fn record_read(&self, elapsed: Duration) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
        self.read_nanos_total
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self, elapsed: Duration) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
        self.write_nanos_total
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_io_error(&self) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes_read(&self, bytes: u64) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_bytes_written(&self, bytes: u64) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(
        &self,
        memtable_size: usize,
        immutable_count: usize,
        level_sst_counts: Vec<usize>,
        level_byte_sizes: Vec<u64>,
    ) -> StatsSnapshot {
        let read_count = self.read_count.load(Ordering::Relaxed);
        let write_count = self.write_count.load(Ordering::Relaxed);
        StatsSnapshot {
            memtable_size,
            immutable_memtable_count: immutable_count,
            level_sst_counts,
            level_byte_sizes,
            bloom_hits: self.bloom_hits.load(Ordering::Relaxed),
            bloom_misses: self.bloom_misses.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            flush_count: self.flush_count.load(Ordering::Relaxed),
            compaction_count: self.compaction_count.load(Ordering::Relaxed),
            io_errors: self.io_errors.load(Ordering::Relaxed),
            avg_read_latency: avg_duration(read_count, self.read_nanos_total.load(Ordering::Relaxed)),
            avg_write_latency: avg_duration(write_count, self.write_nanos_total.load(Ordering::Relaxed)),
        }
    }
}

fn avg_duration(count: u64, nanos_total: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos(nanos_total / count)
    }
}

/// Point-in-time snapshot returned by [`crate::Engine::stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub memtable_size: usize,
    pub immutable_memtable_count: usize,
    /// SST count per level, indexed by level number.
    pub level_sst_counts: Vec<usize>,
    /// Total on-disk byte size per level, indexed by level number.
    pub level_byte_sizes: Vec<u64>,
    pub bloom_hits: u64,
    pub bloom_misses: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub flush_count: u64,
    pub compaction_count: u64,
    pub io_errors: u64,
    pub avg_read_latency: Duration,
    pub avg_write_latency: Duration,
}
