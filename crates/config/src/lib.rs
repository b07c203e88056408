//! # Config
//!
//! The recognized configuration surface for the LSM storage engine.
//!
//! Every option has a default (see the module-level constants below), so a
//! caller can simply use [`Config::default()`] and override only what it
//! needs. [`Config::data_dir`] additionally honors the `LSMKV_DATA_DIR`
//! environment variable when the caller hasn't set an explicit `data_dir` —
//! an explicit value in the struct always wins over the environment.
//!
//! ## Example
//!
//! ```rust
//! use config::{Config, CompactionStyle};
//!
//! let mut cfg = Config::default();
//! cfg.lsm.compaction_style = CompactionStyle::Hybrid;
//! assert_eq!(cfg.lsm.num_levels, 7);
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Name of the environment variable consulted for the data directory when
/// the caller has not set [`Config::data_dir`] explicitly.
pub const DATA_DIR_ENV_VAR: &str = "LSMKV_DATA_DIR";

/// Default data directory, used when neither the config struct nor the
/// environment variable specify one.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Top-level configuration for the storage engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Directory for the WAL, SSTables, and index files.
    ///
    /// If left as [`Config::default`]'s value (`None` internally represented
    /// as [`DEFAULT_DATA_DIR`]), the `LSMKV_DATA_DIR` environment variable is
    /// consulted at [`Config::resolved_data_dir`] time. An explicit
    /// [`Config::with_data_dir`] call always takes precedence.
    data_dir: PathBuf,
    /// Whether `data_dir` was explicitly set (vs. left at the default),
    /// which determines whether the environment variable may override it.
    data_dir_explicit: bool,
    /// Memtable size/entry/age thresholds that trigger a flush.
    pub memtable: MemtableConfig,
    /// WAL buffering, fsync cadence, and rotation thresholds.
    pub wal: WalConfig,
    /// Level hierarchy, bloom sizing, and compaction parameters.
    pub lsm: LsmConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            data_dir_explicit: false,
            memtable: MemtableConfig::default(),
            wal: WalConfig::default(),
            lsm: LsmConfig::default(),
        }
    }
}

impl Config {
    /// Sets the data directory explicitly. Once set this way, the
    /// `LSMKV_DATA_DIR` environment variable is ignored.
    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self.data_dir_explicit = true;
        self
    }

    /// Returns the effective data directory: the explicit value if one was
    /// set via [`Config::with_data_dir`], otherwise `LSMKV_DATA_DIR` if set
    /// in the environment, otherwise [`DEFAULT_DATA_DIR`].
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        if self.data_dir_explicit {
            return self.data_dir.clone();
        }
        std::env::var_os(DATA_DIR_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| self.data_dir.clone())
    }
}

/// Memtable roll thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemtableConfig {
    /// Size threshold (bytes) for rolling the active memtable.
    pub max_bytes: usize,
    /// Entry-count threshold for rolling the active memtable.
    pub max_entries: usize,
    /// Age threshold for rolling the active memtable.
    pub max_age: Duration,
}

impl Default for MemtableConfig {
    fn default() -> Self {
        Self {
            max_bytes: 16 * 1024 * 1024,
            max_entries: 100_000,
            max_age: Duration::from_secs(30),
        }
    }
}

/// WAL buffering and rotation configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalConfig {
    /// Capacity of the async append buffer consumed by the group-commit worker.
    pub buffer_entries: usize,
    /// Periodic fsync cadence for the group-commit worker.
    pub flush_interval: Duration,
    /// Rotation threshold: once the active WAL segment exceeds this many
    /// bytes, the engine rotates to a fresh segment.
    pub max_file_bytes: u64,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            buffer_entries: 1_000,
            flush_interval: Duration::from_millis(100),
            max_file_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Compaction strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactionStyle {
    /// Leveled compaction at every level ≥ 1 (the default).
    Leveled,
    /// Size-tiered compaction, appropriate for L0 under heavy write load.
    SizeTiered,
    /// Size-tiered at L0, leveled at L ≥ 1.
    Hybrid,
}

impl Default for CompactionStyle {
    fn default() -> Self {
        CompactionStyle::Leveled
    }
}

/// Level hierarchy and compaction configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LsmConfig {
    /// Number of levels, L0..=`num_levels - 1`.
    pub num_levels: usize,
    /// Number of L0 SSTables that triggers compaction.
    pub l0_max_ssts: usize,
    /// Capacity multiplier between consecutive levels (R).
    pub level_size_ratio: u64,
    /// Target bloom filter false-positive rate for newly built SSTables.
    pub bloom_fpr: f64,
    /// Which compaction strategy to run.
    pub compaction_style: CompactionStyle,
    /// Ceiling on the total input size of a single compaction pass.
    pub max_compaction_bytes: u64,
    /// Maximum number of immutable memtables allowed to queue before writers
    /// block on backpressure during a memtable roll.
    pub immutable_queue_max: usize,
}

impl Default for LsmConfig {
    fn default() -> Self {
        Self {
            num_levels: 7,
            l0_max_ssts: 4,
            level_size_ratio: 10,
            bloom_fpr: 0.01,
            compaction_style: CompactionStyle::Leveled,
            max_compaction_bytes: 100 * 1024 * 1024,
            immutable_queue_max: 4,
        }
    }
}

impl LsmConfig {
    /// Returns the configured byte capacity for `level`:
    /// `capacity(L0) = l0_max_ssts * memtable_max_bytes`,
    /// `capacity(L>=1) = memtable_max_bytes * level_size_ratio^L`.
    #[must_use]
    pub fn level_capacity(&self, level: usize, memtable_max_bytes: usize) -> u64 {
        if level == 0 {
            return (self.l0_max_ssts as u64) * (memtable_max_bytes as u64);
        }
        (memtable_max_bytes as u64).saturating_mul(self.level_size_ratio.pow(level as u32))
    }

    /// Returns the index of the bottom (last) level, used by compaction to
    /// decide when a tombstone is safe to discard (the simpler
    /// `num_levels - 1` rule, rather than a reachability check against every
    /// other level).
    #[must_use]
    pub fn bottom_level(&self) -> usize {
        self.num_levels.saturating_sub(1)
    }

    /// Returns the target file size for SSTables written into `level`.
    ///
    /// Used by the compaction manager to size leveled-compaction outputs and
    /// to enforce the "never emit output SSTables smaller than
    /// `target_file_size(level)/10`" bound.
    #[must_use]
    pub fn target_file_size(&self, level: usize, memtable_max_bytes: usize) -> u64 {
        self.level_capacity(level.max(1), memtable_max_bytes) / self.level_size_ratio.max(1)
    }
}
