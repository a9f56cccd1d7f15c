//! # Storage Engine
//!
//! The single-node key/value engine a store is backed by. The store core
//! consumes it only through the [`Engine`] port: point reads and writes,
//! ordered scans over a key span, and a capacity report.
//!
//! ## Backings
//!
//! | Kind | Adapter | Notes |
//! |------|---------|-------|
//! | `InMem` | [`InMemEngine`] | Ordered map with a byte ceiling, default 512 MiB |
//! | `OnDisk` | [`FileEngine`] | Ordered map persisted atomically to one file |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storage_engine::{new_engine, EngineSpec};
//!
//! let engine = new_engine(EngineSpec::in_mem(64 << 20))?;
//! engine.put(b"a", b"1")?;
//! let pairs = engine.scan(b"a", b"z", 0)?;
//! ```

pub mod adapters;
pub mod domain;
pub mod factory;
pub mod ports;

pub use adapters::{FileEngine, InMemEngine};
pub use domain::{
    BatchOperation, EngineCapacity, EngineError, EngineKind, EngineSpec, KeyValue,
    DEFAULT_IN_MEM_SIZE_BYTES, MIN_ENGINE_SIZE_BYTES,
};
pub use factory::new_engine;
pub use ports::Engine;
