use bloom::BloomFilter;
use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use memtable::ValueEntry;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::format::{SstHeader, IDX_MAGIC};
use crate::{SstError, SstPaths};

/// Maximum key size we'll allocate during reads. Guards against corrupt
/// length fields causing an out-of-memory allocation.
const MAX_KEY_BYTES: usize = 64 * 1024;
/// Maximum value size we'll allocate during reads.
const MAX_VALUE_BYTES: usize = 64 * 1024 * 1024;

const OP_PUT: u8 = 0;
const OP_TOMBSTONE: u8 = 1;

/// Reads an immutable SSTable (`.sst` + `.idx` + `.bloom`) for point lookups
/// and ordered full scans.
///
/// The index and bloom filter are loaded into memory on [`open`](Self::open);
/// the data file is accessed through a persistent handle behind a `Mutex` so
/// [`get`](Self::get) can be called via a shared `&self`.
pub struct SSTableReader {
    paths: SstPaths,
    header: SstHeader,
    /// Key -> (data_offset, data_length), both as stored in the `.idx` file.
    index: BTreeMap<Vec<u8>, (u64, u32)>,
    bloom: BloomFilter,
    data_file: Mutex<BufReader<File>>,
}

impl SSTableReader {
    /// Opens an SSTable given the shared base path its three files were
    /// written under, validating the header and index checksums.
    pub fn open(base_path: &std::path::Path) -> Result<Self, SstError> {
        let paths = SstPaths::from_base(base_path);

        let mut data_file = File::open(&paths.data)?;
        let header = SstHeader::read_from(&mut data_file)?;

        let actual_len = data_file.metadata()?.len();
        if actual_len != header.file_size {
            return Err(SstError::Corrupt(format!(
                "sst file_size mismatch: header says {}, file is {} bytes",
                header.file_size, actual_len
            )));
        }

        let bloom_file = File::open(&paths.bloom)?;
        let bloom = BloomFilter::read_from(&mut BufReader::new(bloom_file))?;

        let index = read_index(&paths)?;

        data_file.seek(SeekFrom::Start(0))?;
        Ok(Self {
            paths,
            header,
            index,
            bloom,
            data_file: Mutex::new(BufReader::new(data_file)),
        })
    }

    /// Point lookup. Checks the bloom filter and the key range before
    /// touching the index or the data file.
    pub fn get(&self, key: &[u8]) -> Result<Option<ValueEntry>, SstError> {
        if !self.contains_key_range(key) {
            return Ok(None);
        }
        if !self.bloom.may_contain(key) {
            return Ok(None);
        }
        let (offset, length) = match self.index.get(key) {
            Some(&pos) => pos,
            None => return Ok(None),
        };

        let mut f = self
            .data_file
            .lock()
            .map_err(|_| SstError::Corrupt("data file lock poisoned".into()))?;
        f.seek(SeekFrom::Start(offset))?;
        let mut record = vec![0u8; length as usize];
        f.read_exact(&mut record)?;
        let (found_key, entry) = parse_data_record(&record)?;
        if found_key != key {
            return Err(SstError::Corrupt(
                "index points at a record with a different key".into(),
            ));
        }
        Ok(Some(entry))
    }

    /// Cheap pre-filter: `true` if `key` falls within `[min_key, max_key]`.
    /// A `false` here means the key is definitely absent.
    #[must_use]
    pub fn contains_key_range(&self, key: &[u8]) -> bool {
        key >= self.header.min_key.as_slice() && key <= self.header.max_key.as_slice()
    }

    /// Returns a fresh sequential iterator over every entry in ascending key
    /// order, reading from a dedicated file handle so it doesn't contend
    /// with concurrent [`get`](Self::get) calls.
    pub fn iterator(&self) -> Result<SstIter, SstError> {
        let mut f = File::open(&self.paths.data)?;
        f.seek(SeekFrom::Start(self.header.data_start()))?;
        Ok(SstIter {
            rdr: BufReader::new(f),
            remaining: self.header.entry_count,
        })
    }

    /// Drops the open file handle. Equivalent to letting the reader go out
    /// of scope; provided so callers can close a reader explicitly and
    /// observe any final I/O error.
    pub fn close(self) -> Result<(), SstError> {
        drop(self);
        Ok(())
    }

    #[must_use]
    pub fn level(&self) -> u32 {
        self.header.level
    }

    #[must_use]
    pub fn min_key(&self) -> &[u8] {
        &self.header.min_key
    }

    #[must_use]
    pub fn max_key(&self) -> &[u8] {
        &self.header.max_key
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn created_at_ns(&self) -> i64 {
        self.header.created_at_ns
    }

    /// Total size in bytes of the `.sst` data file, as recorded in its header.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.header.file_size
    }

    #[must_use]
    pub fn paths(&self) -> &SstPaths {
        &self.paths
    }
}

fn read_index(paths: &SstPaths) -> Result<BTreeMap<Vec<u8>, (u64, u32)>, SstError> {
    let file = File::open(&paths.index)?;
    let mut r = BufReader::new(file);

    let magic = r.read_u32::<LittleEndian>()?;
    if magic != IDX_MAGIC {
        return Err(SstError::Corrupt(format!("bad idx magic: {:#x}", magic)));
    }
    let count = r.read_u64::<LittleEndian>()?;

    let mut index = BTreeMap::new();
    for _ in 0..count {
        let key_len = r.read_u32::<LittleEndian>()? as usize;
        if key_len > MAX_KEY_BYTES {
            return Err(SstError::Corrupt("idx key_len exceeds sanity cap".into()));
        }
        let mut key = vec![0u8; key_len];
        r.read_exact(&mut key)?;
        let offset = r.read_u64::<LittleEndian>()?;
        let length = r.read_u32::<LittleEndian>()?;
        index.insert(key, (offset, length));
    }
    Ok(index)
}

/// Reads one DATA record whose on-disk length is not yet known (used by the
/// sequential iterator, which has no index to consult).
fn read_data_record<R: Read>(r: &mut R) -> Result<(Vec<u8>, ValueEntry), SstError> {
    let mut header = [0u8; 8 + 8 + 1 + 4 + 4];
    r.read_exact(&mut header)?;
    let mut cur = &header[..];
    cur.read_u64::<LittleEndian>()?;
    cur.read_i64::<LittleEndian>()?;
    cur.read_u8()?;
    let key_len = cur.read_u32::<LittleEndian>()? as usize;
    let value_len = cur.read_u32::<LittleEndian>()? as usize;
    if key_len > MAX_KEY_BYTES {
        return Err(SstError::Corrupt("data key_len exceeds sanity cap".into()));
    }
    if value_len > MAX_VALUE_BYTES {
        return Err(SstError::Corrupt("data value_len exceeds sanity cap".into()));
    }

    let mut rest = vec![0u8; key_len + value_len + 4];
    r.read_exact(&mut rest)?;

    let mut record = Vec::with_capacity(header.len() + rest.len());
    record.extend_from_slice(&header);
    record.extend_from_slice(&rest);
    parse_data_record(&record)
}

/// Parses one complete DATA record (seq through trailing crc32) out of a
/// byte slice whose length is already known to be exactly that record's
/// size — either because the index told us (point lookup) or because we
/// just read it off a length-delimited header (sequential scan).
fn parse_data_record(record: &[u8]) -> Result<(Vec<u8>, ValueEntry), SstError> {
    let mut cur = record;
    let seq = cur.read_u64::<LittleEndian>()?;
    let timestamp_ns = cur.read_i64::<LittleEndian>()?;
    let op = cur.read_u8()?;
    let key_len = cur.read_u32::<LittleEndian>()? as usize;
    let value_len = cur.read_u32::<LittleEndian>()? as usize;

    if key_len > MAX_KEY_BYTES {
        return Err(SstError::Corrupt("data key_len exceeds sanity cap".into()));
    }
    if value_len > MAX_VALUE_BYTES {
        return Err(SstError::Corrupt("data value_len exceeds sanity cap".into()));
    }
    if cur.len() != key_len + value_len + 4 {
        return Err(SstError::Corrupt(
            "data record length does not match its key_len/value_len fields".into(),
        ));
    }

    let key = cur[..key_len].to_vec();
    let value_bytes = cur[key_len..key_len + value_len].to_vec();
    let mut crc_field = &cur[key_len + value_len..];
    let stored_crc = crc_field.read_u32::<LittleEndian>()?;

    let mut hasher = Crc32::new();
    hasher.update(&record[..record.len() - 4]);
    if hasher.finalize() != stored_crc {
        return Err(SstError::Corrupt(format!(
            "data record crc32 mismatch for key of length {}",
            key.len()
        )));
    }

    let value = match op {
        OP_PUT => Some(value_bytes),
        OP_TOMBSTONE => None,
        other => return Err(SstError::Corrupt(format!("unknown sst op code {}", other))),
    };

    Ok((
        key,
        ValueEntry {
            seq,
            timestamp_ns,
            value,
        },
    ))
}

/// Sequential, ascending-order iterator over an SSTable's entries.
pub struct SstIter {
    rdr: BufReader<File>,
    remaining: u64,
}

impl Iterator for SstIter {
    type Item = Result<(Vec<u8>, ValueEntry), SstError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(read_data_record(&mut self.rdr))
    }
}
