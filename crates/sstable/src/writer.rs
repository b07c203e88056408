use bloom::BloomFilter;
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::{Memtable, ValueEntry};
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::format::{SstHeader, IDX_MAGIC};
use crate::{SstError, SstPaths};

const OP_PUT: u8 = 0;
const OP_TOMBSTONE: u8 = 1;

/// Builds a single immutable SSTable (`.sst` + `.idx` + `.bloom`) from a
/// sorted stream of entries.
///
/// Per the on-disk header (see [`crate::format::SstHeader`]), `min_key`,
/// `max_key`, `entry_count`, and `file_size` must all be known before the
/// header can be written, so entries are buffered in memory during
/// [`put`](SSTableWriter::put) and the data/index/bloom files are only
/// written out at [`finalize`](SSTableWriter::finalize). This trades the
/// constant-memory streaming write a true append-only format would give for
/// a header that's simple to produce and simple to validate on open.
pub struct SSTableWriter {
    level: u32,
    entries: Vec<(Vec<u8>, ValueEntry)>,
    finalized: bool,
}

impl SSTableWriter {
    /// Starts building a new SSTable for `level`.
    #[must_use]
    pub fn create(level: u32) -> Self {
        Self {
            level,
            entries: Vec::new(),
            finalized: false,
        }
    }

    /// Buffers `(key, entry)`. Keys must be supplied in strictly ascending
    /// order; the caller is responsible for deduplication.
    pub fn put(&mut self, key: Vec<u8>, entry: ValueEntry) -> Result<(), SstError> {
        if self.finalized {
            return Err(SstError::AlreadyFinalized);
        }
        if let Some((prev, _)) = self.entries.last() {
            if key <= *prev {
                return Err(SstError::OutOfOrderKey {
                    prev: prev.clone(),
                    next: key,
                });
            }
        }
        self.entries.push((key, entry));
        Ok(())
    }

    /// Returns the number of entries buffered so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes the `.sst`, `.idx`, and `.bloom` files for `base_path` and
    /// consumes the writer.
    ///
    /// Each file is written to a `.tmp` sibling, fsynced, then atomically
    /// renamed into place, so a crash mid-flush never leaves a partially
    /// written SSTable at the final path.
    pub fn finalize(
        self,
        base_path: &Path,
        bloom_fpr: f64,
        created_at_ns: i64,
    ) -> Result<SstPaths, SstError> {
        if self.finalized {
            return Err(SstError::AlreadyFinalized);
        }
        if self.entries.is_empty() {
            return Err(SstError::Empty);
        }

        let paths = SstPaths::from_base(base_path);
        let min_key = self.entries.first().unwrap().0.clone();
        let max_key = self.entries.last().unwrap().0.clone();

        // ---- DATA section, buffered so we can compute file_size up front ----
        let mut data_body = Vec::new();
        let mut bloom = BloomFilter::new(self.entries.len().max(1), bloom_fpr);
        for (key, entry) in &self.entries {
            bloom.insert(key);
            write_data_record(&mut data_body, key, entry)?;
        }

        let header = SstHeader {
            level: self.level,
            entry_count: self.entries.len() as u64,
            file_size: 0, // patched below once known
            min_key: min_key.clone(),
            max_key: max_key.clone(),
            created_at_ns,
        };
        let header_len = {
            let mut probe = Vec::new();
            header.write_to(&mut probe)?;
            probe.len() as u64
        };
        let header = SstHeader {
            file_size: header_len + data_body.len() as u64,
            ..header
        };

        write_atomic(&paths.data, |w| {
            header.write_to(w)?;
            w.write_all(&data_body)?;
            Ok(())
        })?;

        // ---- INDEX section ----
        // Offsets are relative to the start of the .sst file, pointing at
        // the `seq` field of each DATA record.
        write_atomic(&paths.index, |w| {
            w.write_u32::<LittleEndian>(IDX_MAGIC)?;
            w.write_u64::<LittleEndian>(self.entries.len() as u64)?;
            let mut offset = header_len;
            for (key, entry) in &self.entries {
                let len = data_record_len(key, entry);
                w.write_u32::<LittleEndian>(key.len() as u32)?;
                w.write_all(key)?;
                w.write_u64::<LittleEndian>(offset)?;
                w.write_u32::<LittleEndian>(len as u32)?;
                offset += len;
            }
            Ok(())
        })?;

        // ---- BLOOM section ----
        write_atomic(&paths.bloom, |w| {
            bloom.write_to(w)?;
            Ok(())
        })?;

        Ok(paths)
    }

    /// Convenience wrapper: builds an SSTable directly from a memtable's
    /// live entries (flush path).
    pub fn write_from_memtable(
        base_path: &Path,
        level: u32,
        mem: &Memtable,
        bloom_fpr: f64,
        created_at_ns: i64,
    ) -> Result<SstPaths, SstError> {
        if mem.is_empty() {
            return Err(SstError::Empty);
        }
        let mut w = Self::create(level);
        for (key, entry) in mem.iter() {
            w.put(key.to_vec(), entry.clone())?;
        }
        w.finalize(base_path, bloom_fpr, created_at_ns)
    }

    /// Convenience wrapper: builds an SSTable from any sorted, deduplicated
    /// iterator of entries (compaction output path).
    pub fn write_from_iterator<I>(
        base_path: &Path,
        level: u32,
        iter: I,
        bloom_fpr: f64,
        created_at_ns: i64,
    ) -> Result<SstPaths, SstError>
    where
        I: Iterator<Item = (Vec<u8>, ValueEntry)>,
    {
        let mut w = Self::create(level);
        for (key, entry) in iter {
            w.put(key, entry)?;
        }
        w.finalize(base_path, bloom_fpr, created_at_ns)
    }
}

fn write_data_record(buf: &mut Vec<u8>, key: &[u8], entry: &ValueEntry) -> Result<(), SstError> {
    let op = if entry.value.is_some() {
        OP_PUT
    } else {
        OP_TOMBSTONE
    };
    let value_len = entry.value.as_ref().map_or(0, |v| v.len()) as u32;

    let start = buf.len();
    buf.write_u64::<LittleEndian>(entry.seq)?;
    buf.write_i64::<LittleEndian>(entry.timestamp_ns)?;
    buf.write_u8(op)?;
    buf.write_u32::<LittleEndian>(key.len() as u32)?;
    buf.write_u32::<LittleEndian>(value_len)?;
    buf.extend_from_slice(key);
    if let Some(v) = &entry.value {
        buf.extend_from_slice(v);
    }

    let mut hasher = Crc32::new();
    hasher.update(&buf[start..]);
    let crc = hasher.finalize();
    buf.write_u32::<LittleEndian>(crc)?;
    Ok(())
}

fn data_record_len(key: &[u8], entry: &ValueEntry) -> u64 {
    let value_len = entry.value.as_ref().map_or(0, |v| v.len());
    (8 + 8 + 1 + 4 + 4 + key.len() + value_len + 4) as u64
}

fn write_atomic<F>(final_path: &Path, body: F) -> Result<(), SstError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), SstError>,
{
    let tmp_path = final_path.with_extension(format!(
        "{}.tmp",
        final_path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
    ));
    let raw = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&tmp_path)?;
    let mut w = BufWriter::new(raw);
    body(&mut w)?;
    w.flush()?;
    w.into_inner()
        .map_err(|e| SstError::Io(e.into_error()))?
        .sync_all()?;
    rename(&tmp_path, final_path)?;
    if let Some(parent) = final_path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
