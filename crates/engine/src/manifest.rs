//! Manifest — persistent level assignments for on-disk SSTables.
//!
//! Tracks which SSTable file belongs to which level so the engine can
//! reconstruct its level structure after a restart, along with the highest
//! sequence number ever made durable (so recovery doesn't need to rescan
//! every SSTable's entries to find it).
//!
//! ## File format
//!
//! A simple text format, one directive per line:
//!
//! ```text
//! # RiptideKV SSTable Manifest
//! SEQ:184
//! NEXTID:42
//! L0:sstable_41
//! L0:sstable_39
//! L2:sstable_12
//! ```
//!
//! Lines starting with `#` are comments; blank lines are ignored. `SEQ` is the
//! highest durable sequence number; `NEXTID` is the next SSTable file id to
//! hand out. `L<n>:<basename>` entries are ordered newest-first within a
//! level, matching how the engine keeps its in-memory level vectors.
//!
//! Rewrites are atomic: write to `MANIFEST.tmp`, fsync, rename over
//! `MANIFEST`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::EngineError;

pub const MANIFEST_FILENAME: &str = "MANIFEST";
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

/// One SSTable's level assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstMeta {
    /// Basename shared by the `.sst`/`.idx`/`.bloom` triple (no extension).
    pub basename: String,
    pub level: usize,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    pub entries: Vec<SstMeta>,
    pub last_seq: u64,
    pub next_file_id: u64,
}

impl Manifest {
    pub fn load_or_create(sst_dir: &Path) -> Result<Self, EngineError> {
        let path = sst_dir.join(MANIFEST_FILENAME);
        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
                last_seq: 0,
                next_file_id: 0,
            });
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut entries = Vec::new();
        let mut last_seq = 0u64;
        let mut next_file_id = 0u64;

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("SEQ:") {
                last_seq = rest.parse().map_err(|_| {
                    EngineError::Corrupt(format!("manifest line {}: bad SEQ value", line_no + 1))
                })?;
                continue;
            }
            if let Some(rest) = trimmed.strip_prefix("NEXTID:") {
                next_file_id = rest.parse().map_err(|_| {
                    EngineError::Corrupt(format!("manifest line {}: bad NEXTID value", line_no + 1))
                })?;
                continue;
            }
            let (level_str, basename) = trimmed.split_once(':').ok_or_else(|| {
                EngineError::Corrupt(format!(
                    "manifest line {}: expected 'L<n>:<basename>', got {:?}",
                    line_no + 1,
                    trimmed
                ))
            })?;
            let level: usize = level_str.strip_prefix('L').and_then(|s| s.parse().ok()).ok_or_else(|| {
                EngineError::Corrupt(format!(
                    "manifest line {}: bad level token {:?}",
                    line_no + 1,
                    level_str
                ))
            })?;
            entries.push(SstMeta {
                basename: basename.to_string(),
                level,
            });
        }

        Ok(Self {
            path,
            entries,
            last_seq,
            next_file_id,
        })
    }

    pub fn save(&self) -> Result<(), EngineError> {
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            writeln!(f, "# RiptideKV SSTable Manifest")?;
            writeln!(f, "SEQ:{}", self.last_seq)?;
            writeln!(f, "NEXTID:{}", self.next_file_id)?;
            for e in &self.entries {
                writeln!(f, "L{}:{}", e.level, e.basename)?;
            }
            f.flush()?;
            f.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }
        Ok(())
    }

    /// Allocates the next SSTable file id, without saving.
    pub fn alloc_file_id(&mut self) -> u64 {
        let id = self.next_file_id;
        self.next_file_id += 1;
        id
    }

    /// Returns basenames at `level`, in manifest order (newest first).
    pub fn filenames_at(&self, level: usize) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.basename.as_str())
            .collect()
    }

    /// Registers a new SSTable at `level`, newest-first within that level.
    pub fn add(&mut self, basename: String, level: usize) {
        let insert_pos = self
            .entries
            .iter()
            .position(|e| e.level == level)
            .unwrap_or(self.entries.len());
        self.entries.insert(insert_pos, SstMeta { basename, level });
    }

    /// Removes entries for the given basenames (used when retiring compaction inputs).
    pub fn remove(&mut self, basenames: &[&str]) {
        self.entries.retain(|e| !basenames.contains(&e.basename.as_str()));
    }
}
