use parking_lot::RwLock;
use shared_types::Attributes;
use std::collections::{BTreeMap, HashMap};
use std::ops::{Bound, ControlFlow};

use crate::domain::{
    BatchOperation, EngineCapacity, EngineError, EngineKind, EngineSpec, KeyValue,
};
use crate::ports::Engine;

fn entry_size(key: &[u8], value: &[u8]) -> u64 {
    (key.len() + value.len()) as u64
}

/// Ordered key/value table with byte accounting, shared by both engine
/// backings.
#[derive(Debug, Clone, Default)]
pub(crate) struct OrderedMap {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    used: u64,
}

impl OrderedMap {
    pub(crate) fn from_map(data: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        let used = data.iter().map(|(k, v)| entry_size(k, v)).sum();
        Self { data, used }
    }

    pub(crate) fn used(&self) -> u64 {
        self.used
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.get(key).cloned()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
        self.data.iter()
    }

    /// Net byte change if `operations` were applied in order.
    fn net_growth(&self, operations: &[BatchOperation]) -> i128 {
        let mut overlay: HashMap<&[u8], u64> = HashMap::new();
        let mut growth: i128 = 0;
        for op in operations {
            let key = op.key();
            let old = overlay.get(key).copied().unwrap_or_else(|| {
                self.data
                    .get(key)
                    .map(|v| entry_size(key, v))
                    .unwrap_or(0)
            });
            let new = match op {
                BatchOperation::Put { key, value } => entry_size(key, value),
                BatchOperation::Delete { .. } => 0,
            };
            growth += new as i128 - old as i128;
            overlay.insert(key, new);
        }
        growth
    }

    /// Fails with `CapacityExceeded` if the batch would not fit under
    /// `ceiling`.
    pub(crate) fn check_fits(
        &self,
        operations: &[BatchOperation],
        ceiling: u64,
    ) -> Result<(), EngineError> {
        let growth = self.net_growth(operations);
        if growth <= 0 {
            return Ok(());
        }
        let available = ceiling.saturating_sub(self.used);
        if growth as u64 > available {
            return Err(EngineError::CapacityExceeded {
                requested: growth as u64,
                available,
            });
        }
        Ok(())
    }

    pub(crate) fn apply(&mut self, operations: Vec<BatchOperation>) {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    let size = entry_size(&key, &value);
                    if let Some(old) = self.data.get(&key) {
                        self.used -= entry_size(&key, old);
                    }
                    self.data.insert(key, value);
                    self.used += size;
                }
                BatchOperation::Delete { key } => {
                    if let Some(old) = self.data.remove(&key) {
                        self.used -= entry_size(&key, &old);
                    }
                }
            }
        }
    }

    pub(crate) fn scan(&self, start: &[u8], end: &[u8], limit: usize) -> Vec<KeyValue> {
        if start >= end {
            return Vec::new();
        }
        let iter = self
            .data
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
            .map(|(k, v)| (k.clone(), v.clone()));
        if limit == 0 {
            iter.collect()
        } else {
            iter.take(limit).collect()
        }
    }

    pub(crate) fn iterate(
        &self,
        start: &[u8],
        end: &[u8],
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> ControlFlow<()>,
    ) {
        if start >= end {
            return;
        }
        for (k, v) in self
            .data
            .range::<[u8], _>((Bound::Included(start), Bound::Excluded(end)))
        {
            if visitor(k, v).is_break() {
                break;
            }
        }
    }
}

/// In-memory engine with a byte ceiling.
///
/// Volatile: contents are lost when the engine is dropped.
#[derive(Debug)]
pub struct InMemEngine {
    attrs: Attributes,
    size_bytes: u64,
    cache_size_bytes: u64,
    table: RwLock<OrderedMap>,
}

impl InMemEngine {
    /// Open an in-memory engine described by `spec`.
    pub fn open(spec: &EngineSpec) -> Result<Self, EngineError> {
        spec.validate()?;
        if spec.kind != EngineKind::InMem {
            return Err(EngineError::InvalidSpec(format!(
                "cannot open a {} spec as an in-memory engine",
                spec.kind
            )));
        }
        tracing::debug!(
            size_bytes = spec.size_bytes,
            cache_size_bytes = spec.cache_size_bytes,
            "[engine] opened in-memory engine"
        );
        Ok(Self {
            attrs: spec.attrs.clone(),
            size_bytes: spec.size_bytes,
            cache_size_bytes: spec.cache_size_bytes,
            table: RwLock::new(OrderedMap::default()),
        })
    }

    /// In-memory engine with the given ceiling and default attributes.
    pub fn with_size(size_bytes: u64) -> Result<Self, EngineError> {
        Self::open(&EngineSpec::in_mem(size_bytes))
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Engine for InMemEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::InMem
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
        let mut table = self.table.write();
        table.check_fits(&operations, self.size_bytes)?;
        table.apply(operations);
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
