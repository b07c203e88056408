//! SSTable binary format: header layout shared by the `.sst` data file, the
//! `.idx` index file, and the `.bloom` filter file.
//!
//! ## `.sst` data file
//!
//! ```text
//! [HEADER, fixed 48 bytes]
//! [min_key: min_key_len bytes][max_key: max_key_len bytes]
//! [DATA: repeated entries, see below]
//! ```
//!
//! Header fields (all little-endian):
//!
//! ```text
//! magic(u32="SSTB") | format_version(u32) | level(u32) | entry_count(u64)
//! file_size(u64) | min_key_len(u32) | max_key_len(u32) | created_at_ns(i64)
//! header_crc32(u32)
//! ```
//!
//! `header_crc32` covers every header field before it plus `min_key` and
//! `max_key`. `file_size` is the total size of the `.sst` file once finalized
//! and is used as a cheap corruption check on open.
//!
//! Each DATA entry:
//!
//! ```text
//! seq(u64) | timestamp_ns(i64) | op(u8: 0=Put,1=Tombstone) | key_len(u32)
//! value_len(u32) | key | value | crc32(u32)
//! ```
//!
//! ## `.idx` index file
//!
//! ```text
//! magic(u32="SIDX") | entry_count(u64)
//! repeated: key_len(u32) | key | data_offset(u64) | data_length(u32)
//! ```
//!
//! `data_offset` points at the `seq` field of the corresponding DATA entry in
//! the `.sst` file; `data_length` is that record's total on-disk size (seq
//! through trailing crc32), so a reader can bound a record read without
//! re-deriving the length from `key_len`/`value_len` fields it hasn't read
//! yet.
//!
//! ## `.bloom` filter file
//!
//! The raw [`bloom::BloomFilter`] wire format (see that crate).

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Write};

pub const SST_MAGIC: u32 = 0x5353_5442; // "SSTB"
pub const IDX_MAGIC: u32 = 0x5349_4458; // "SIDX"
pub const FORMAT_VERSION: u32 = 1;

/// Fixed portion of the `.sst` header, in bytes:
/// magic(4) + version(4) + level(4) + entry_count(8) + file_size(8)
/// + min_key_len(4) + max_key_len(4) + created_at_ns(8) + header_crc32(4).
pub const HEADER_FIXED_LEN: u64 = 4 + 4 + 4 + 8 + 8 + 4 + 4 + 8 + 4;

/// Parsed `.sst` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstHeader {
    pub level: u32,
    pub entry_count: u64,
    pub file_size: u64,
    pub min_key: Vec<u8>,
    pub max_key: Vec<u8>,
    pub created_at_ns: i64,
}

impl SstHeader {
    /// Total byte offset where the DATA section begins.
    #[must_use]
    pub fn data_start(&self) -> u64 {
        HEADER_FIXED_LEN + self.min_key.len() as u64 + self.max_key.len() as u64
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(HEADER_FIXED_LEN as usize);
        buf.write_u32::<LittleEndian>(SST_MAGIC)?;
        buf.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        buf.write_u32::<LittleEndian>(self.level)?;
        buf.write_u64::<LittleEndian>(self.entry_count)?;
        buf.write_u64::<LittleEndian>(self.file_size)?;
        buf.write_u32::<LittleEndian>(self.min_key.len() as u32)?;
        buf.write_u32::<LittleEndian>(self.max_key.len() as u32)?;
        buf.write_i64::<LittleEndian>(self.created_at_ns)?;

        let mut hasher = Crc32::new();
        hasher.update(&buf);
        hasher.update(&self.min_key);
        hasher.update(&self.max_key);
        let crc = hasher.finalize();

        w.write_all(&buf)?;
        w.write_u32::<LittleEndian>(crc)?;
        w.write_all(&self.min_key)?;
        w.write_all(&self.max_key)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut fixed = [0u8; HEADER_FIXED_LEN as usize];
        r.read_exact(&mut fixed)?;

        let mut cur = &fixed[..];
        let magic = cur.read_u32::<LittleEndian>()?;
        if magic != SST_MAGIC {
            return Err(corrupt(format!("bad sst magic: {:#x}", magic)));
        }
        let version = cur.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported sst format version: {}", version)));
        }
        let level = cur.read_u32::<LittleEndian>()?;
        let entry_count = cur.read_u64::<LittleEndian>()?;
        let file_size = cur.read_u64::<LittleEndian>()?;
        let min_key_len = cur.read_u32::<LittleEndian>()? as usize;
        let max_key_len = cur.read_u32::<LittleEndian>()? as usize;
        let created_at_ns = cur.read_i64::<LittleEndian>()?;

        const MAX_KEY_BYTES: usize = 64 * 1024;
        if min_key_len > MAX_KEY_BYTES || max_key_len > MAX_KEY_BYTES {
            return Err(corrupt("header key length exceeds sanity cap"));
        }

        let stored_crc = r.read_u32::<LittleEndian>()?;

        let mut min_key = vec![0u8; min_key_len];
        r.read_exact(&mut min_key)?;
        let mut max_key = vec![0u8; max_key_len];
        r.read_exact(&mut max_key)?;

        let mut hasher = Crc32::new();
        hasher.update(&fixed);
        hasher.update(&min_key);
        hasher.update(&max_key);
        if hasher.finalize() != stored_crc {
            return Err(corrupt("sst header crc32 mismatch"));
        }

        Ok(Self {
            level,
            entry_count,
            file_size,
            min_key,
            max_key,
            created_at_ns,
        })
    }
}

fn corrupt<M: Into<String>>(msg: M) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}
