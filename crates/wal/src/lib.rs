//! # WAL — Write-Ahead Log
//!
//! Provides crash-safe durability for the LSM storage engine.
//!
//! Every mutation (`PUT`, `DELETE`, or a compaction marker) is serialized into
//! a binary record and appended to the log **before** the corresponding
//! in-memory update is acknowledged to the caller. On restart the log is
//! replayed to reconstruct the active memtable, so no acknowledged write is
//! lost.
//!
//! Appends do not hit disk synchronously. [`WalWriter::append`] hands the
//! record to a background group-commit thread and returns immediately with
//! the record's sequence number; [`WalWriter::flush`] blocks until every
//! record enqueued so far is fsynced. This lets many concurrent writers share
//! one fsync instead of paying for one each.
//!
//! ## Segment rotation
//!
//! Once the active segment (the file the writer was opened with, e.g.
//! `wal.log`) exceeds `WalConfig::max_file_bytes`, the worker fsyncs it,
//! renames it to `wal.log.N` (`N` the next unused rotation number in that
//! directory), and resumes appending to a fresh, empty `wal.log`. A rotated
//! segment is never written to again; it is replayed at startup and
//! eventually deleted by [`retire_segments_below`] once every sequence
//! number it holds is covered by the durable checkpoint.
//!
//! ## Binary Record Format
//!
//! ```text
//! [seq: u64 LE][timestamp_ns: i64 LE][op: u8][key_len: u32 LE][value_len: u32 LE]
//! [key: key_len bytes][value: value_len bytes][crc32: u32 LE]
//! ```
//!
//! `op` is `0` (Put), `1` (Delete), or `2` (CompactionMarker). A
//! CompactionMarker carries no key or value (`key_len = value_len = 0`); it
//! records where a compaction completed and is skipped during replay. The
//! CRC covers every byte of the record that precedes it.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{WalWriter, WalReader, WalRecord};
//! use config::WalConfig;
//!
//! let w = WalWriter::create("wal.log", &WalConfig::default()).unwrap();
//! w.append(WalRecord::Put {
//!     seq: 1,
//!     timestamp_ns: 0,
//!     key: b"hello".to_vec(),
//!     value: b"world".to_vec(),
//! }).unwrap();
//! w.flush().unwrap();
//! drop(w);
//!
//! let mut r = WalReader::open("wal.log").unwrap();
//! r.replay(|rec| println!("{:?}", rec)).unwrap();
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use parking_lot::Mutex;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, warn};

use config::WalConfig;

/// Fixed-size portion of a record: seq(8) + timestamp_ns(8) + op(1) + key_len(4) + value_len(4).
const HEADER_LEN: usize = 8 + 8 + 1 + 4 + 4;

/// Safety cap on a single key or value length, guarding against corrupt
/// length fields sending the reader off to allocate gigabytes.
const MAX_FIELD_LEN: u32 = 64 * 1024 * 1024;

const OP_PUT: u8 = 0;
const OP_DEL: u8 = 1;
const OP_COMPACTION_MARKER: u8 = 2;

/// A single WAL record.
///
/// Every record carries a monotonically increasing **sequence number** and a
/// wall-clock timestamp, both assigned by the engine before the record is
/// appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalRecord {
    /// A key-value insertion.
    Put {
        seq: u64,
        timestamp_ns: i64,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    /// A key deletion (tombstone).
    Delete {
        seq: u64,
        timestamp_ns: i64,
        key: Vec<u8>,
    },
    /// Marks that a compaction completed at this point in the log.
    ///
    /// Carries no key or value. Replay skips these; they exist so a reader
    /// inspecting the raw log (or a future repair tool) can see where
    /// compactions landed relative to live writes.
    CompactionMarker { seq: u64, timestamp_ns: i64 },
}

impl WalRecord {
    /// The sequence number carried by any variant.
    #[must_use]
    pub fn seq(&self) -> u64 {
        match self {
            WalRecord::Put { seq, .. } => *seq,
            WalRecord::Delete { seq, .. } => *seq,
            WalRecord::CompactionMarker { seq, .. } => *seq,
        }
    }
}

/// Errors that can occur during WAL operations.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record failed CRC validation or contained an unknown op code.
    #[error("corrupt record")]
    Corrupt,

    /// The group-commit buffer is full; the caller should retry after a
    /// short backoff or wait for `flush()` to drain it.
    #[error("wal buffer full, apply backpressure")]
    Backpressure,

    /// The background group-commit worker has already shut down.
    #[error("wal writer is closed")]
    Closed,
}

enum Command {
    Append(WalRecord),
    Flush(mpsc::Sender<Result<(), WalError>>),
    Shutdown,
}

/// Append-only WAL writer backed by a background group-commit thread.
///
/// [`append`](WalWriter::append) enqueues a record and returns its sequence
/// number immediately; the worker thread batches enqueued records into a
/// single `write_all` and fsyncs either when [`flush`](WalWriter::flush) is
/// called or after `flush_interval` elapses, whichever comes first.
pub struct WalWriter {
    path: PathBuf,
    cmd_tx: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: Arc<std::sync::atomic::AtomicBool>,
}

impl WalWriter {
    /// Opens (or creates) a WAL file in append mode and starts its
    /// group-commit worker thread.
    pub fn create<P: AsRef<Path>>(path: P, cfg: &WalConfig) -> Result<Self, WalError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let bytes = file.metadata()?.len();

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(cfg.buffer_entries.max(1));
        let flush_interval = cfg.flush_interval;
        let max_file_bytes = cfg.max_file_bytes;
        let closed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let closed_worker = closed.clone();

        let active = ActiveSegment {
            file,
            path: path.clone(),
            bytes,
        };

        let worker = std::thread::spawn(move || {
            group_commit_loop(active, max_file_bytes, cmd_rx, flush_interval);
            closed_worker.store(true, std::sync::atomic::Ordering::SeqCst);
        });

        Ok(Self {
            path,
            cmd_tx,
            worker: Mutex::new(Some(worker)),
            closed,
        })
    }

    /// Enqueues `record` for durable write and returns its sequence number.
    ///
    /// Returns immediately once the record is accepted into the buffer; it
    /// is **not** guaranteed durable until a subsequent [`flush`](Self::flush)
    /// returns `Ok`. Returns [`WalError::Backpressure`] if the buffer is full.
    pub fn append(&self, record: WalRecord) -> Result<u64, WalError> {
        if self.closed.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(WalError::Closed);
        }
        let seq = record.seq();
        match self.cmd_tx.try_send(Command::Append(record)) {
            Ok(()) => Ok(seq),
            Err(TrySendError::Full(_)) => Err(WalError::Backpressure),
            Err(TrySendError::Disconnected(_)) => Err(WalError::Closed),
        }
    }

    /// Blocks until every record enqueued before this call has been fsynced.
    pub fn flush(&self) -> Result<(), WalError> {
        let (tx, rx) = mpsc::channel();
        self.cmd_tx
            .send(Command::Flush(tx))
            .map_err(|_| WalError::Closed)?;
        rx.recv().map_err(|_| WalError::Closed)?
    }

    /// Signals the worker to flush and exit, then joins it. Called
    /// automatically on drop; safe to call more than once.
    pub fn close(&self) {
        let _ = self.cmd_tx.send(Command::Shutdown);
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }

    /// Deletes every rotated-out segment sibling of the active file whose
    /// highest sequence number is `<= checkpoint`. The active segment itself
    /// is never touched. Segments are checked from oldest to newest and
    /// scanning stops at the first one not yet fully covered, since rotation
    /// only ever produces segments with strictly increasing sequence ranges.
    pub fn retire_segments_below(&self, checkpoint: u64) -> Result<(), WalError> {
        retire_segments_below(&self.path, checkpoint)
    }
}

impl Drop for WalWriter {
    fn drop(&mut self) {
        self.close();
    }
}

/// The file the group-commit worker currently appends to, plus enough state
/// to decide when it needs to roll over to a fresh one.
struct ActiveSegment {
    file: File,
    path: PathBuf,
    bytes: u64,
}

fn group_commit_loop(
    mut active: ActiveSegment,
    max_file_bytes: u64,
    rx: Receiver<Command>,
    flush_interval: Duration,
) {
    debug!(?flush_interval, max_file_bytes, "wal group-commit worker started");
    let mut dirty = false;
    let mut pending_acks: Vec<mpsc::Sender<Result<(), WalError>>> = Vec::new();

    'outer: loop {
        let msg = match rx.recv_timeout(flush_interval) {
            Ok(m) => m,
            Err(RecvTimeoutError::Timeout) => {
                if dirty {
                    let result = fsync(&mut active.file);
                    dirty = false;
                    ack_all(&mut pending_acks, result);
                    maybe_rotate(&mut active, max_file_bytes);
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match msg {
            Command::Shutdown => {
                if dirty {
                    let result = fsync(&mut active.file);
                    ack_all(&mut pending_acks, result);
                }
                break 'outer;
            }
            Command::Append(record) => {
                if let Ok(written) = write_record(&mut active.file, &record) {
                    active.bytes += written;
                    dirty = true;
                }
            }
            Command::Flush(ack) => pending_acks.push(ack),
        }

        // Drain whatever else is immediately available so a burst of
        // concurrent appends shares one fsync (the point of group commit).
        loop {
            match rx.try_recv() {
                Ok(Command::Append(record)) => {
                    if let Ok(written) = write_record(&mut active.file, &record) {
                        active.bytes += written;
                        dirty = true;
                    }
                }
                Ok(Command::Flush(ack)) => pending_acks.push(ack),
                Ok(Command::Shutdown) => {
                    if dirty {
                        let result = fsync(&mut active.file);
                        dirty = false;
                        ack_all(&mut pending_acks, result);
                    }
                    break 'outer;
                }
                Err(_) => break,
            }
        }

        if !pending_acks.is_empty() {
            let result = if dirty {
                let r = fsync(&mut active.file);
                dirty = false;
                r
            } else {
                Ok(())
            };
            ack_all(&mut pending_acks, result);
        }

        maybe_rotate(&mut active, max_file_bytes);
    }
}

/// Rotates `active` to a fresh empty file once it has crossed
/// `max_file_bytes` (a threshold of `0` disables rotation). Logged and
/// otherwise ignored on failure: a failed rotation just means the active
/// segment keeps growing, which is recoverable, unlike losing a record.
fn maybe_rotate(active: &mut ActiveSegment, max_file_bytes: u64) {
    if max_file_bytes == 0 || active.bytes < max_file_bytes {
        return;
    }
    if let Err(e) = active.file.sync_all() {
        warn!(error = %e, "wal rotation: fsync before rotate failed, leaving segment active");
        return;
    }
    match rotate(active) {
        Ok(()) => debug!(path = %active.path.display(), "wal segment rotated"),
        Err(e) => warn!(error = %e, "wal rotation failed, continuing on the current segment"),
    }
}

fn rotate(active: &mut ActiveSegment) -> Result<(), WalError> {
    let next_id = next_rotation_id(&active.path)?;
    let rotated_path = rotated_segment_path(&active.path, next_id);
    std::fs::rename(&active.path, &rotated_path)?;
    let fresh = OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(&active.path)?;
    active.file = fresh;
    active.bytes = 0;
    Ok(())
}

/// Appends `.{id}` to `active_path`'s file name, e.g. `wal.log` -> `wal.log.3`.
fn rotated_segment_path(active_path: &Path, id: u64) -> PathBuf {
    let mut name = active_path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{id}"));
    active_path.with_file_name(name)
}

/// Lists this WAL's already-rotated segments (not including the active
/// file), sorted ascending by rotation id — i.e. oldest first. Used by
/// recovery to find every segment that needs replaying alongside the active
/// one.
pub fn list_rotated_segments(active_path: &Path) -> Result<Vec<(u64, PathBuf)>, WalError> {
    let dir = active_path.parent().unwrap_or_else(|| Path::new("."));
    let active_name = active_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let prefix = format!("{active_name}.");

    let mut segments = Vec::new();
    if !dir.exists() {
        return Ok(segments);
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else { continue };
        if let Some(suffix) = file_name.strip_prefix(&prefix) {
            if let Ok(id) = suffix.parse::<u64>() {
                segments.push((id, entry.path()));
            }
        }
    }
    segments.sort_by_key(|(id, _)| *id);
    Ok(segments)
}

fn next_rotation_id(active_path: &Path) -> Result<u64, WalError> {
    Ok(list_rotated_segments(active_path)?.last().map_or(1, |(id, _)| id + 1))
}

fn retire_segments_below(active_path: &Path, checkpoint: u64) -> Result<(), WalError> {
    for (id, path) in list_rotated_segments(active_path)? {
        let max_seq = segment_max_seq(&path)?;
        if max_seq > checkpoint {
            debug!(id, max_seq, checkpoint, "wal segment still needed, stopping retirement scan");
            break;
        }
        if let Err(e) = std::fs::remove_file(&path) {
            warn!(path = %path.display(), error = %e, "failed to remove retired wal segment");
        } else {
            debug!(path = %path.display(), max_seq, "retired fully-checkpointed wal segment");
        }
    }
    Ok(())
}

fn segment_max_seq(path: &Path) -> Result<u64, WalError> {
    let file = File::open(path)?;
    let mut r = BufReader::new(file);
    let mut max_seq = 0u64;
    loop {
        match read_one(&mut r)? {
            ReadOutcome::Stop => return Ok(max_seq),
            ReadOutcome::Record(record, _) => max_seq = max_seq.max(record.seq()),
        }
    }
}

fn ack_all(acks: &mut Vec<mpsc::Sender<Result<(), WalError>>>, result: Result<(), WalError>) {
    if let Err(e) = &result {
        error!(error = %e, "wal fsync failed, surfacing to pending flush callers");
    }
    for ack in acks.drain(..) {
        let resent = match &result {
            Ok(()) => Ok(()),
            Err(WalError::Io(e)) => Err(WalError::Io(io::Error::new(e.kind(), e.to_string()))),
            Err(_) => Err(WalError::Corrupt),
        };
        let _ = ack.send(resent);
    }
}

fn fsync(file: &mut File) -> Result<(), WalError> {
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

/// Serializes `record` into the wire format, appends it to `w`, and returns
/// the number of bytes written.
fn write_record<W: Write>(w: &mut W, record: &WalRecord) -> Result<u64, WalError> {
    let mut buf = Vec::with_capacity(HEADER_LEN + 32);

    let (seq, timestamp_ns, op, key, value): (u64, i64, u8, &[u8], &[u8]) = match record {
        WalRecord::Put {
            seq,
            timestamp_ns,
            key,
            value,
        } => (*seq, *timestamp_ns, OP_PUT, key, value),
        WalRecord::Delete {
            seq,
            timestamp_ns,
            key,
        } => (*seq, *timestamp_ns, OP_DEL, key, &[]),
        WalRecord::CompactionMarker { seq, timestamp_ns } => {
            (*seq, *timestamp_ns, OP_COMPACTION_MARKER, &[], &[])
        }
    };

    buf.write_u64::<LittleEndian>(seq)?;
    buf.write_i64::<LittleEndian>(timestamp_ns)?;
    buf.write_u8(op)?;
    buf.write_u32::<LittleEndian>(key.len() as u32)?;
    buf.write_u32::<LittleEndian>(value.len() as u32)?;
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);

    let mut hasher = Crc32::new();
    hasher.update(&buf);
    let crc = hasher.finalize();
    buf.write_u32::<LittleEndian>(crc)?;

    w.write_all(&buf)?;
    Ok(buf.len() as u64)
}

/// Outcome of reading one record off the wire.
enum ReadOutcome {
    Record(WalRecord, u64),
    /// Clean EOF or a torn tail (partial record, e.g. a crash mid-write).
    Stop,
}

/// Reads and validates exactly one record from `r`.
///
/// Returns `Ok(ReadOutcome::Stop)` for a clean EOF or a torn tail (any point
/// where a read comes up short because the writer never finished the
/// record). Returns `Err(WalError::Corrupt)` only when a *complete* record
/// was read but its CRC doesn't match or its op code is unrecognized.
fn read_one<R: Read>(r: &mut R) -> Result<ReadOutcome, WalError> {
    let seq = match r.read_u64::<LittleEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Stop),
        Err(e) => return Err(WalError::Io(e)),
    };
    let timestamp_ns = match r.read_i64::<LittleEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Stop),
        Err(e) => return Err(WalError::Io(e)),
    };
    let op = match r.read_u8() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Stop),
        Err(e) => return Err(WalError::Io(e)),
    };
    let key_len = match r.read_u32::<LittleEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Stop),
        Err(e) => return Err(WalError::Io(e)),
    };
    let value_len = match r.read_u32::<LittleEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Stop),
        Err(e) => return Err(WalError::Io(e)),
    };

    if key_len > MAX_FIELD_LEN || value_len > MAX_FIELD_LEN {
        return Err(WalError::Corrupt);
    }

    let mut key = vec![0u8; key_len as usize];
    if let Err(e) = r.read_exact(&mut key) {
        return if e.kind() == io::ErrorKind::UnexpectedEof {
            Ok(ReadOutcome::Stop)
        } else {
            Err(WalError::Io(e))
        };
    }

    let mut value = vec![0u8; value_len as usize];
    if let Err(e) = r.read_exact(&mut value) {
        return if e.kind() == io::ErrorKind::UnexpectedEof {
            Ok(ReadOutcome::Stop)
        } else {
            Err(WalError::Io(e))
        };
    }

    let crc = match r.read_u32::<LittleEndian>() {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(ReadOutcome::Stop),
        Err(e) => return Err(WalError::Io(e)),
    };

    let mut hasher = Crc32::new();
    hasher.update(&seq.to_le_bytes());
    hasher.update(&timestamp_ns.to_le_bytes());
    hasher.update(&[op]);
    hasher.update(&key_len.to_le_bytes());
    hasher.update(&value_len.to_le_bytes());
    hasher.update(&key);
    hasher.update(&value);
    if hasher.finalize() != crc {
        return Err(WalError::Corrupt);
    }

    let consumed = (HEADER_LEN + key.len() + value.len() + 4) as u64;

    let record = match op {
        OP_PUT => WalRecord::Put {
            seq,
            timestamp_ns,
            key,
            value,
        },
        OP_DEL => WalRecord::Delete {
            seq,
            timestamp_ns,
            key,
        },
        OP_COMPACTION_MARKER => WalRecord::CompactionMarker { seq, timestamp_ns },
        _ => return Err(WalError::Corrupt),
    };

    Ok(ReadOutcome::Record(record, consumed))
}

/// Sequential WAL reader that yields valid records.
///
/// Generic over any `Read` implementor, so it can be used with real files
/// (`WalReader<File>`) or in-memory buffers for testing.
pub struct WalReader<R: Read> {
    rdr: BufReader<R>,
}

impl WalReader<File> {
    /// Opens an existing WAL file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<WalReader<File>, WalError> {
        let f = File::open(path)?;
        Ok(WalReader {
            rdr: BufReader::new(f),
        })
    }
}

impl<R: Read> WalReader<R> {
    /// Constructs a reader from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        WalReader {
            rdr: BufReader::new(reader),
        }
    }

    /// Replays every valid record, calling `apply` for `Put`/`Delete`
    /// records in order. `CompactionMarker` records are skipped — they exist
    /// for integrity tooling, not for memtable reconstruction.
    ///
    /// - Clean EOF or a torn tail -> `Ok(())`.
    /// - CRC mismatch or unknown op code -> `Err(WalError::Corrupt)`.
    /// - I/O error -> `Err(WalError::Io(...))`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<(), WalError>
    where
        F: FnMut(WalRecord),
    {
        loop {
            match read_one(&mut self.rdr)? {
                ReadOutcome::Stop => return Ok(()),
                ReadOutcome::Record(record, _) => {
                    if !matches!(record, WalRecord::CompactionMarker { .. }) {
                        apply(record);
                    }
                }
            }
        }
    }
}

/// Summary of a [`validate_integrity`] or [`repair`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Number of complete, CRC-valid records found from the start of the file.
    pub valid_records: u64,
    /// Byte offset up to which the file is known-good.
    pub valid_bytes: u64,
    /// `true` if anything (a torn tail or a corrupt record) followed the
    /// valid prefix.
    pub had_trailing_garbage: bool,
}

fn scan_valid_prefix<R: Read>(mut r: R) -> Result<IntegrityReport, WalError> {
    let mut valid_records = 0u64;
    let mut valid_bytes = 0u64;
    loop {
        match read_one(&mut r) {
            Ok(ReadOutcome::Record(_, consumed)) => {
                valid_records += 1;
                valid_bytes += consumed;
            }
            Ok(ReadOutcome::Stop) => {
                return Ok(IntegrityReport {
                    valid_records,
                    valid_bytes,
                    had_trailing_garbage: false,
                });
            }
            Err(WalError::Corrupt) => {
                return Ok(IntegrityReport {
                    valid_records,
                    valid_bytes,
                    had_trailing_garbage: true,
                });
            }
            Err(e) => return Err(e),
        }
    }
}

/// Scans the WAL file at `path` from the start, validating each record's CRC
/// without applying anything, and reports how much of the file is
/// known-good.
///
/// Unlike [`WalReader::replay`], a CRC mismatch does **not** raise an error
/// here — it is reported via [`IntegrityReport::had_trailing_garbage`], since
/// this function exists precisely to characterize corruption, not to refuse
/// to look at it.
pub fn validate_integrity<P: AsRef<Path>>(path: P) -> Result<IntegrityReport, WalError> {
    let file = File::open(path)?;
    scan_valid_prefix(BufReader::new(file))
}

/// Repairs the WAL file at `path` in place by truncating it to its longest
/// valid prefix.
///
/// Before truncating, the original file is copied to `<path>.bak`. The
/// truncated content is written to a temporary file and atomically renamed
/// over `path`, so a crash mid-repair never leaves a half-written WAL.
pub fn repair<P: AsRef<Path>>(path: P) -> Result<IntegrityReport, WalError> {
    let path = path.as_ref();
    let report = validate_integrity(path)?;
    let total_len = std::fs::metadata(path)?.len();

    if report.valid_bytes < total_len {
        warn!(
            path = %path.display(),
            valid_bytes = report.valid_bytes,
            total_len,
            "truncating corrupt wal tail"
        );
        let backup_path = sibling_with_suffix(path, ".bak");
        std::fs::copy(path, &backup_path)?;

        let data = std::fs::read(path)?;
        let tmp_path = sibling_with_suffix(path, ".repair.tmp");
        std::fs::write(&tmp_path, &data[..report.valid_bytes as usize])?;
        std::fs::rename(&tmp_path, path)?;
    }

    Ok(report)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(suffix);
    PathBuf::from(s)
}
