//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk storage files for the RiptideKV storage engine.
//!
//! When the in-memory [`memtable::Memtable`] exceeds its size threshold the
//! engine flushes it to disk as an SSTable. SSTables are *write-once,
//! read-many* — once created they are never modified (only replaced during
//! compaction).
//!
//! ## File layout
//!
//! Each SSTable is three separate files sharing a base path and level-number
//! filename, e.g. `000123.sst`, `000123.idx`, `000123.bloom`:
//!
//! ```text
//! 000123.sst    header (fixed fields + min_key + max_key) + DATA section
//! 000123.idx    key -> data_offset mapping, for point lookups
//! 000123.bloom  serialized bloom filter, checked before the index
//! ```
//!
//! See [`format`] for the exact byte layout of the header and DATA records.
//! Splitting the bloom filter and index into their own files means a reader
//! can `mmap`/cache them independently of the (much larger) data file, and a
//! corrupt bloom filter never prevents recovering the data underneath it.
//!
//! All three files for a given SSTable are written atomically (temp file +
//! fsync + rename) by [`writer::SSTableWriter::finalize`], so a crash mid-write
//! never leaves a partial SSTable visible at its final path.

use std::path::{Path, PathBuf};
use thiserror::Error;

mod format;
mod merge;
mod reader;
mod writer;

pub use format::{SstHeader, FORMAT_VERSION, HEADER_FIXED_LEN, IDX_MAGIC, SST_MAGIC};
pub use merge::MergeIterator;
pub use reader::{SSTableReader, SstIter};
pub use writer::SSTableWriter;

#[cfg(test)]
mod tests;

/// Errors produced while reading or writing SSTable files.
#[derive(Debug, Error)]
pub enum SstError {
    #[error("sstable io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sstable corrupt: {0}")]
    Corrupt(String),

    #[error("sstable writer already finalized")]
    AlreadyFinalized,

    #[error("sstable writer received out-of-order key: prev={prev:?} next={next:?}")]
    OutOfOrderKey { prev: Vec<u8>, next: Vec<u8> },

    #[error("refusing to finalize an sstable with no entries")]
    Empty,
}

/// The three file paths that together make up one SSTable, derived from a
/// shared base path (e.g. `.../000123`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstPaths {
    pub data: PathBuf,
    pub index: PathBuf,
    pub bloom: PathBuf,
}

impl SstPaths {
    /// Derives the `.sst`/`.idx`/`.bloom` sibling paths for `base`. `base`'s
    /// own extension, if any, is replaced.
    #[must_use]
    pub fn from_base<P: AsRef<Path>>(base: P) -> Self {
        let base = base.as_ref();
        Self {
            data: base.with_extension("sst"),
            index: base.with_extension("idx"),
            bloom: base.with_extension("bloom"),
        }
    }
}
