use std::fs;
use std::path::Path;
use std::time::Duration;

use config::Config;

/// A `Config` rooted at `dir` with thresholds small enough that tests can
/// force rolls/flushes deterministically without waiting on the default
/// 16 MiB / 30s memtable thresholds.
pub fn test_config(dir: &Path) -> Config {
    let mut cfg = Config::default().with_data_dir(dir);
    cfg.memtable.max_bytes = 1024 * 1024;
    cfg.memtable.max_entries = 100_000;
    cfg.memtable.max_age = Duration::from_secs(3600);
    cfg.wal.flush_interval = Duration::from_millis(5);
    cfg
}

pub fn count_sst_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|ext| ext == "sst")
                .unwrap_or(false)
        })
        .count()
}
