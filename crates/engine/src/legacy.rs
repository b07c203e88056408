//! One-way migration helpers for the predecessor engine's on-disk formats.
//! These are boundary utilities, not part of the core write path: they
//! replay a legacy log through the public [`Engine`] API rather than being
//! understood by the engine itself.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;

use crate::{Engine, EngineError};

const LEGACY_BINARY_MAGIC: &[u8; 4] = b"MOZB";
const LEGACY_DELETED_MARKER: &str = "__DELETED__";

const LEGACY_OP_PUT: u8 = 1;
const LEGACY_OP_DELETE: u8 = 2;

/// Imports a legacy append-only text log (`key\tvalue\n` per line, with the
/// literal value `__DELETED__` denoting a tombstone) by replaying every line
/// through [`Engine::put`]/[`Engine::delete`] in file order. Later lines for
/// the same key naturally shadow earlier ones, since each call overwrites
/// the key's current entry.
pub fn import_text(engine: &Engine, path: impl AsRef<Path>) -> Result<(), EngineError> {
    let file = File::open(path)?;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let (key, value) = line.split_once('\t').ok_or_else(|| {
            EngineError::Corrupt(format!(
                "legacy text log line {}: expected 'key\\tvalue', got {:?}",
                line_no + 1,
                line
            ))
        })?;
        if value == LEGACY_DELETED_MARKER {
            engine.delete(key.as_bytes().to_vec())?;
        } else {
            engine.put(key.as_bytes().to_vec(), value.as_bytes().to_vec())?;
        }
    }
    Ok(())
}

/// Imports a legacy binary entry log: a sequence of
/// `magic="MOZB" | timestamp_ns:u64_le | op:u8 | key_len:u16_le |
/// value_len:u32_le | key | value | crc32:u32_le` records. Stops at a clean
/// EOF between records; a CRC mismatch or bad magic fails with
/// [`EngineError::Corrupt`].
pub fn import_binary(engine: &Engine, path: impl AsRef<Path>) -> Result<(), EngineError> {
    let mut reader = BufReader::new(File::open(path)?);
    loop {
        let mut magic = [0u8; 4];
        match reader.read_exact(&mut magic) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(EngineError::Io(e)),
        }
        if &magic != LEGACY_BINARY_MAGIC {
            return Err(EngineError::Corrupt(format!(
                "legacy binary log: bad magic {:?}",
                magic
            )));
        }

        let timestamp_ns = reader.read_u64::<LittleEndian>()?;
        let op = reader.read_u8()?;
        let key_len = reader.read_u16::<LittleEndian>()?;
        let value_len = reader.read_u32::<LittleEndian>()?;

        let mut key = vec![0u8; key_len as usize];
        reader.read_exact(&mut key)?;
        let mut value = vec![0u8; value_len as usize];
        reader.read_exact(&mut value)?;
        let stored_crc = reader.read_u32::<LittleEndian>()?;

        let mut hasher = Crc32::new();
        hasher.update(&timestamp_ns.to_le_bytes());
        hasher.update(&[op]);
        hasher.update(&key_len.to_le_bytes());
        hasher.update(&value_len.to_le_bytes());
        hasher.update(&key);
        hasher.update(&value);
        if hasher.finalize() != stored_crc {
            return Err(EngineError::Corrupt(
                "legacy binary log: crc32 mismatch".into(),
            ));
        }

        match op {
            LEGACY_OP_PUT => {
                engine.put(key, value)?;
            }
            LEGACY_OP_DELETE => {
                engine.delete(key)?;
            }
            other => {
                return Err(EngineError::Corrupt(format!(
                    "legacy binary log: unknown op code {other}"
                )))
            }
        }
    }
}

/// Exports every live key currently in `engine` using the legacy binary
/// framing (the inverse of [`import_binary`]). Timestamps are stamped with
/// the current wall clock, since the engine does not retain a per-key
/// write timestamp once the value has been superseded through compaction.
pub fn export_binary(engine: &Engine, path: impl AsRef<Path>) -> Result<(), EngineError> {
    let tmp_path = path.as_ref().with_extension("tmp");
    {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        for key in engine.sorted_keys()? {
            let Some(value) = engine.get(&key)? else {
                continue;
            };
            write_legacy_record(&mut file, &key, &value)?;
        }
        file.flush()?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

fn write_legacy_record(w: &mut impl Write, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
    let timestamp_ns = crate::now_ns() as u64;
    let key_len = u16::try_from(key.len())
        .map_err(|_| EngineError::InvalidKey("key too long for legacy binary export".into()))?;
    let value_len = value.len() as u32;

    let mut body = Vec::with_capacity(13 + key.len() + value.len());
    body.write_u64::<LittleEndian>(timestamp_ns)?;
    body.write_u8(LEGACY_OP_PUT)?;
    body.write_u16::<LittleEndian>(key_len)?;
    body.write_u32::<LittleEndian>(value_len)?;
    body.extend_from_slice(key);
    body.extend_from_slice(value);

    let mut hasher = Crc32::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    w.write_all(LEGACY_BINARY_MAGIC)?;
    w.write_all(&body)?;
    w.write_u32::<LittleEndian>(crc)?;
    Ok(())
}
