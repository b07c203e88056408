//! The `recovery_checkpoint` file: an ASCII-decimal sequence number marking
//! the highest write fully reflected in on-disk SSTables. Recovery uses it
//! to skip WAL entries that were already flushed before the last shutdown
//! or crash, instead of re-inserting them into a fresh memtable only to
//! have the next flush write them out again.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::EngineError;

const CHECKPOINT_FILENAME: &str = "recovery_checkpoint";
const CHECKPOINT_TMP_FILENAME: &str = "recovery_checkpoint.tmp";

pub(crate) fn read(data_dir: &Path) -> Result<u64, EngineError> {
    let path = data_dir.join(CHECKPOINT_FILENAME);
    match fs::read_to_string(&path) {
        Ok(contents) => Ok(contents.trim().parse().unwrap_or(0)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(EngineError::Io(e)),
    }
}

/// Atomically advances the on-disk checkpoint to `seq` (write to `.tmp`,
/// fsync, rename over the live file).
pub(crate) fn write(data_dir: &Path, seq: u64) -> Result<(), EngineError> {
    let tmp_path = data_dir.join(CHECKPOINT_TMP_FILENAME);
    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        write!(f, "{seq}")?;
        f.flush()?;
        f.sync_all()?;
    }
    fs::rename(&tmp_path, data_dir.join(CHECKPOINT_FILENAME))?;
    Ok(())
}

#[allow(dead_code)]
pub(crate) fn path(data_dir: &Path) -> PathBuf {
    data_dir.join(CHECKPOINT_FILENAME)
}
