//! Startup recovery: load the manifest, open the level structure it
//! describes, replay the WAL forward from where the manifest left off, and
//! hand back a fully-assembled [`Shared`] plus the receivers its background
//! workers need.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use sstable::SSTableReader;
use tracing::{info, warn};

use config::Config;
use memtable::Memtable;
use wal::{WalReader, WalWriter};

use crate::manifest::Manifest;
use crate::stats::Stats;
use crate::workers::WorkerMsg;
use crate::{EngineError, Shared, Structural};

const WAL_FILENAME: &str = "wal.log";

pub(crate) struct WorkersInit {
    pub(crate) flush_rx: Receiver<WorkerMsg>,
    pub(crate) compaction_rx: Receiver<WorkerMsg>,
}

pub(crate) fn open(
    config: Config,
    data_dir: PathBuf,
    sst_dir: PathBuf,
) -> Result<(Shared, WorkersInit), EngineError> {
    clean_temp_files(&sst_dir)?;

    let mut manifest = Manifest::load_or_create(&sst_dir)?;
    let mut levels: Vec<Vec<Arc<SSTableReader>>> = vec![Vec::new(); config.lsm.num_levels];

    for level in 0..config.lsm.num_levels {
        let basenames: Vec<String> = manifest.filenames_at(level).into_iter().map(String::from).collect();
        for basename in basenames {
            let base = sst_dir.join(&basename);
            match SSTableReader::open(&base) {
                Ok(reader) => levels[level].push(Arc::new(reader)),
                Err(e) => {
                    warn!(basename = %basename, level, error = %e, "dropping unreadable sstable named in manifest");
                }
            }
        }
        if level > 0 {
            levels[level].sort_by(|a, b| a.min_key().cmp(b.min_key()));
        }
    }

    // Entries at or below the checkpoint are already reflected in the
    // SSTables just opened above; only entries past it need replaying into
    // the fresh memtable.
    let durable_seq = crate::checkpoint::read(&data_dir)?;

    let wal_path = data_dir.join(WAL_FILENAME);
    let mut active = Memtable::new();
    let mut max_replayed_seq = durable_seq;

    let rotated_segments = wal::list_rotated_segments(&wal_path)?;
    let mut segments_to_replay: Vec<PathBuf> = rotated_segments.into_iter().map(|(_, p)| p).collect();
    if wal_path.exists() {
        segments_to_replay.push(wal_path.clone());
    }

    for segment_path in &segments_to_replay {
        let mut reader = WalReader::open(segment_path)?;
        let replay_result = reader.replay(|record| match record {
            wal::WalRecord::Put {
                seq,
                timestamp_ns,
                key,
                value,
            } => {
                max_replayed_seq = max_replayed_seq.max(seq);
                if seq > durable_seq {
                    active.put(key, value, seq, timestamp_ns);
                }
            }
            wal::WalRecord::Delete { seq, timestamp_ns, key } => {
                max_replayed_seq = max_replayed_seq.max(seq);
                if seq > durable_seq {
                    active.delete(key, seq, timestamp_ns);
                }
            }
            wal::WalRecord::CompactionMarker { .. } => {}
        });
        if let Err(e) = replay_result {
            warn!(segment = %segment_path.display(), error = %e, "wal replay stopped early; proceeding with entries read so far");
        }
    }
    info!(
        entries = active.len(),
        checkpoint = durable_seq,
        segments = segments_to_replay.len(),
        "replayed wal into active memtable"
    );

    let seq = manifest.last_seq.max(max_replayed_seq);
    manifest.last_seq = seq;
    manifest.save()?;

    let wal = WalWriter::create(&wal_path, &config.wal)?;
    if let Err(e) = wal.retire_segments_below(durable_seq) {
        warn!(error = %e, "failed to retire already-checkpointed wal segments left over from a previous run");
    }

    let (flush_tx, flush_rx) = crossbeam_channel::unbounded();
    let (compaction_tx, compaction_rx) = crossbeam_channel::unbounded();

    let shared = Shared {
        config,
        data_dir,
        sst_dir,
        wal,
        active: RwLock::new(active),
        seq: AtomicU64::new(seq),
        checkpoint: AtomicU64::new(durable_seq),
        structural: RwLock::new(Structural {
            levels,
            immutable: VecDeque::new(),
        }),
        manifest: Mutex::new(manifest),
        stats: Stats::default(),
        flush_tx,
        compaction_tx,
        closed: AtomicBool::new(false),
        read_only: AtomicBool::new(false),
    };

    Ok((shared, WorkersInit { flush_rx, compaction_rx }))
}

/// Removes any `*.tmp` files left behind by a writer that crashed mid-write.
/// Final files are only ever visible after an atomic rename, so a leftover
/// `.tmp` can never be a live SSTable.
fn clean_temp_files(sst_dir: &std::path::Path) -> Result<(), EngineError> {
    if !sst_dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(sst_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
            let _ = std::fs::remove_file(&path);
        }
    }
    Ok(())
}
