//! # Domain Errors
//!
//! Error types for the storage engine.

use thiserror::Error;

/// Errors raised by engine construction and operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The requested engine/backing combination is not supported.
    #[error("Invalid engine spec: {0}")]
    InvalidSpec(String),

    /// A write would push the engine past its size ceiling.
    #[error("Engine capacity exceeded: write needs {requested} bytes, {available} available")]
    CapacityExceeded {
        /// Net bytes the write would add.
        requested: u64,
        /// Bytes left under the ceiling.
        available: u64,
    },

    /// Underlying file I/O failed.
    #[error("Engine I/O error: {0}")]
    Io(String),

    /// The backing file could not be decoded.
    #[error("Engine file corrupted at offset {offset}: {reason}")]
    Corrupted {
        /// Byte offset of the first undecodable record.
        offset: usize,
        /// What was wrong with it.
        reason: String,
    },
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}
