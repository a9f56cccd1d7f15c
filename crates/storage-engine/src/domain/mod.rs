//! # Domain Module
//!
//! Engine specification, capacity accounting and errors.

pub mod capacity;
pub mod errors;
pub mod spec;

pub use capacity::{BatchOperation, EngineCapacity, KeyValue};
pub use errors::EngineError;
pub use spec::{EngineKind, EngineSpec, DEFAULT_IN_MEM_SIZE_BYTES, MIN_ENGINE_SIZE_BYTES};
