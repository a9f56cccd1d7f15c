//! # Engine Specification
//!
//! What kind of engine to open and with which limits. Unsupported
//! combinations are rejected by [`EngineSpec::validate`] instead of
//! aborting the process.

use shared_types::Attributes;
use std::path::PathBuf;

use super::errors::EngineError;

/// Size ceiling of an in-memory engine when none is configured (512 MiB).
pub const DEFAULT_IN_MEM_SIZE_BYTES: u64 = 512 << 20;

/// Smallest size ceiling an engine may be opened with (64 KiB).
pub const MIN_ENGINE_SIZE_BYTES: u64 = 64 << 10;

/// Backing of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    /// Volatile, process memory only.
    InMem,
    /// Persisted to a file under `path`.
    OnDisk,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::InMem => write!(f, "in-mem"),
            EngineKind::OnDisk => write!(f, "on-disk"),
        }
    }
}

/// Parameters for [`crate::new_engine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSpec {
    /// Backing kind.
    pub kind: EngineKind,
    /// Attributes advertised by stores on this engine.
    pub attrs: Attributes,
    /// Size ceiling in bytes.
    pub size_bytes: u64,
    /// Block cache size in bytes.
    pub cache_size_bytes: u64,
    /// File location, required for `OnDisk`, forbidden for `InMem`.
    pub path: Option<PathBuf>,
}

impl EngineSpec {
    /// In-memory engine with the given ceiling and no cache.
    pub fn in_mem(size_bytes: u64) -> Self {
        Self {
            kind: EngineKind::InMem,
            attrs: Attributes::new(["mem"]),
            size_bytes,
            cache_size_bytes: 0,
            path: None,
        }
    }

    /// File-backed engine at `path`.
    pub fn on_disk(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            kind: EngineKind::OnDisk,
            attrs: Attributes::default(),
            size_bytes,
            cache_size_bytes: 0,
            path: Some(path.into()),
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_cache_size(mut self, cache_size_bytes: u64) -> Self {
        self.cache_size_bytes = cache_size_bytes;
        self
    }

    /// Check the spec describes a supported engine.
    pub fn validate(&self) -> Result<(), EngineError> {
        match (self.kind, &self.path) {
            (EngineKind::InMem, Some(path)) => {
                return Err(EngineError::InvalidSpec(format!(
                    "in-memory engine cannot have a path ({})",
                    path.display()
                )));
            }
            (EngineKind::OnDisk, None) => {
                return Err(EngineError::InvalidSpec(
                    "on-disk engine requires a path".to_string(),
                ));
            }
            _ => {}
        }

        if self.size_bytes < MIN_ENGINE_SIZE_BYTES {
            return Err(EngineError::InvalidSpec(format!(
                "size {} bytes is below the minimum of {} bytes",
                self.size_bytes, MIN_ENGINE_SIZE_BYTES
            )));
        }

        if self.cache_size_bytes > self.size_bytes {
            return Err(EngineError::InvalidSpec(format!(
                "cache size {} bytes exceeds engine size {} bytes",
                self.cache_size_bytes, self.size_bytes
            )));
        }

        Ok(())
    }
}

impl Default for EngineSpec {
    fn default() -> Self {
        Self::in_mem(DEFAULT_IN_MEM_SIZE_BYTES)
    }
}
