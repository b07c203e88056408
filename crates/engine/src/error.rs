//! Error taxonomy for the storage engine.
//!
//! Covers the error kinds the engine surfaces: invalid input, I/O,
//! backpressure, corruption, and "closed". "Not found" is deliberately
//! absent — every read path returns `Option`, never an error, for a missing
//! key.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wal error: {0}")]
    Wal(#[from] wal::WalError),

    #[error("sstable error: {0}")]
    Sst(#[from] sstable::SstError),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("wal buffer full, apply backpressure")]
    Backpressure,

    #[error("corrupt: {0}")]
    Corrupt(String),

    #[error("engine is closed")]
    Closed,
}

impl EngineError {
    /// `true` for transient conditions a caller may reasonably retry
    /// (backpressure, or a `WalError::Backpressure` wrapped underneath).
    #[must_use]
    pub fn is_backpressure(&self) -> bool {
        matches!(self, EngineError::Backpressure)
            || matches!(self, EngineError::Wal(wal::WalError::Backpressure))
    }
}
