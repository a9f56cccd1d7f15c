//! # Engine Port
//!
//! The narrow interface the store core consumes. Implementations use
//! interior mutability so one engine can be shared (`Arc<dyn Engine>`) by
//! a store and all of its replicas.

use shared_types::Attributes;
use std::fmt::Debug;
use std::ops::ControlFlow;

use crate::domain::{BatchOperation, EngineCapacity, EngineError, EngineKind, KeyValue};

/// Abstract single-node key/value engine.
///
/// Production: [`crate::FileEngine`]
/// Testing: [`crate::InMemEngine`]
pub trait Engine: Send + Sync + Debug {
    /// Backing kind.
    fn kind(&self) -> EngineKind;

    /// Attributes of the engine.
    fn attrs(&self) -> &Attributes;

    /// Configured block cache size in bytes.
    fn cache_size(&self) -> u64;

    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError>;

    /// Put a single key-value pair.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError>;

    /// Delete a key. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), EngineError>;

    /// Apply all operations or none of them.
    fn write_batch(&self, operations: Vec<BatchOperation>) -> Result<(), EngineError>;

    /// Key/value pairs in `[start, end)` in key order. `limit == 0` means
    /// no limit.
    fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<KeyValue>, EngineError>;

    /// Visit pairs in `[start, end)` in key order until the visitor breaks.
    fn iterate(
        &self,
        start: &[u8],
        end: &[u8],
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<(), EngineError>;

    /// Current capacity report.
    fn capacity(&self) -> Result<EngineCapacity, EngineError>;
}
