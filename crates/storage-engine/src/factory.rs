//! # Engine Factory
//!
//! Thin constructor mapping an [`EngineSpec`] to an opened engine.

use std::sync::Arc;

use crate::adapters::{FileEngine, InMemEngine};
use crate::domain::{EngineError, EngineKind, EngineSpec};
use crate::ports::Engine;

/// Open the engine described by `spec`.
///
/// Unsupported combinations fail with [`EngineError::InvalidSpec`].
pub fn new_engine(spec: EngineSpec) -> Result<Arc<dyn Engine>, EngineError> {
    spec.validate()?;
    let engine: Arc<dyn Engine> = match spec.kind {
        EngineKind::InMem => Arc::new(InMemEngine::open(&spec)?),
        EngineKind::OnDisk => Arc::new(FileEngine::open(&spec)?),
    };
    Ok(engine)
}
