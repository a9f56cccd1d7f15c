//! # Capacity and Write Operations

/// A key/value pair as returned by scans.
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Point-in-time capacity of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineCapacity {
    /// Size ceiling in bytes.
    pub capacity: u64,
    /// Bytes still writable under the ceiling.
    pub available: u64,
    /// Bytes held by live keys and values.
    pub used: u64,
}

impl EngineCapacity {
    pub fn new(capacity: u64, used: u64) -> Self {
        Self {
            capacity,
            available: capacity.saturating_sub(used),
            used,
        }
    }

    /// Available space as a whole percentage of the ceiling (0-100).
    pub fn available_percent(&self) -> u8 {
        if self.capacity == 0 {
            return 0;
        }
        ((self.available as u128 * 100) / self.capacity as u128) as u8
    }
}

/// One write in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put { key: Vec<u8>, value: Vec<u8> },
    /// Delete a key.
    Delete { key: Vec<u8> },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            BatchOperation::Put { key, .. } | BatchOperation::Delete { key } => key,
        }
    }
}
