use parking_lot::RwLock;
use shared_types::Attributes;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use super::memory::OrderedMap;
use crate::domain::{
    BatchOperation, EngineCapacity, EngineError, EngineKind, EngineSpec, KeyValue,
};
use crate::ports::Engine;

/// File-backed engine.
///
/// Keeps an ordered map in memory and rewrites the backing file
/// atomically (temp file + rename) on every committed write. A write that
/// fails to persist leaves both the file and the in-memory view unchanged.
#[derive(Debug)]
pub struct FileEngine {
    path: PathBuf,
    attrs: Attributes,
    size_bytes: u64,
    cache_size_bytes: u64,
    table: RwLock<OrderedMap>,
}

impl FileEngine {
    /// Open (or create) the engine described by `spec`.
    pub fn open(spec: &EngineSpec) -> Result<Self, EngineError> {
        spec.validate()?;
        let path = match (spec.kind, &spec.path) {
            (EngineKind::OnDisk, Some(path)) => path.clone(),
            _ => {
                return Err(EngineError::InvalidSpec(format!(
                    "cannot open a {} spec as a file engine",
                    spec.kind
                )))
            }
        };

        let data = Self::load_from_file(&path)?;
        let table = OrderedMap::from_map(data);

        if table.len() > 0 {
            tracing::info!(
                "[engine] Loaded {} keys ({} bytes) from {}",
                table.len(),
                table.used(),
                path.display()
            );
        } else {
            tracing::info!("[engine] No existing data at {}", path.display());
        }

        Ok(Self {
            path,
            attrs: spec.attrs.clone(),
            size_bytes: spec.size_bytes,
            cache_size_bytes: spec.cache_size_bytes,
            table: RwLock::new(table),
        })
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_file(path: &Path) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, EngineError> {
        let mut file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        // Format: [key_len:u32][key][value_len:u32][value]...
        let mut data = BTreeMap::new();
        let mut cursor = 0;
        while cursor < bytes.len() {
            let record_start = cursor;
            let key = Self::read_chunk(&bytes, &mut cursor, record_start)?;
            let value = Self::read_chunk(&bytes, &mut cursor, record_start)?;
            data.insert(key, value);
        }
        Ok(data)
    }

    fn read_chunk(
        bytes: &[u8],
        cursor: &mut usize,
        record_start: usize,
    ) -> Result<Vec<u8>, EngineError> {
        let truncated = || EngineError::Corrupted {
            offset: record_start,
            reason: "truncated record".to_string(),
        };
        let len_bytes: [u8; 4] = bytes
            .get(*cursor..*cursor + 4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(truncated)?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        *cursor += 4;
        let chunk = bytes.get(*cursor..*cursor + len).ok_or_else(truncated)?;
        *cursor += len;
        Ok(chunk.to_vec())
    }

    fn save_to_file(&self, table: &OrderedMap) -> Result<(), EngineError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut bytes = Vec::with_capacity(table.used() as usize + table.len() * 8);
        for (key, value) in table.entries() {
            bytes.extend_from_slice(&encode_len(key.len())?);
            bytes.extend_from_slice(key);
            bytes.extend_from_slice(&encode_len(value.len())?);
            bytes.extend_from_slice(value);
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// Length prefix of a key or value in the data file.
fn encode_len(len: usize) -> Result<[u8; 4], EngineError> {
    u32::try_from(len)
        .map(u32::to_le_bytes)
        .map_err(|_| EngineError::CapacityExceeded {
            requested: len as u64,
            available: u64::from(u32::MAX),
        })
}

/// Keys and values must fit a `u32` length prefix.
fn check_field_lengths(operations: &[BatchOperation]) -> Result<(), EngineError> {
    for op in operations {
        match op {
            BatchOperation::Put { key, value } => {
                encode_len(key.len())?;
                encode_len(value.len())?;
            }
            BatchOperation::Delete { key } => {
                encode_len(key.len())?;
            }
        }
    }
    Ok(())
}

impl Engine for FileEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::OnDisk
    }

    fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    fn cache_size(&self) -> u64 {
        self.cache_size_bytes
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, EngineError> {
        Ok(self.table.read().get(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), EngineError> {
        self.write_batch(vec![BatchOperation::put(key, value)])
    }

    fn delete(&self, key: &[u8]) -> Result<(), EngineError> {
        self.write_batch(vec![BatchOperation::delete(key)])
    }

    fn write_batch(&self, operations: Vec<BatchOperation>) -> Result<(), EngineError> {
        check_field_lengths(&operations)?;
        let mut table = self.table.write();
        table.check_fits(&operations, self.size_bytes)?;
        let mut staged = table.clone();
        staged.apply(operations);
        self.save_to_file(&staged)?;
        *table = staged;
        Ok(())
    }

    fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Result<Vec<KeyValue>, EngineError> {
        Ok(self.table.read().scan(start, end, limit))
    }

    fn iterate(
        &self,
        start: &[u8],
        end: &[u8],
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) -> Result<(), EngineError> {
        self.table.read().iterate(start, end, visitor);
        Ok(())
    }

    fn capacity(&self) -> Result<EngineCapacity, EngineError> {
        Ok(EngineCapacity::new(self.size_bytes, self.table.read().used()))
    }
}
