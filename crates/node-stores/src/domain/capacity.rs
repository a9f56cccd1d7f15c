//! # Capacity Reporting

use shared_types::{Attributes, NodeId, StoreId};
use storage_engine::EngineCapacity;

/// Point-in-time capacity of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCapacity {
    /// Engine size ceiling in bytes.
    pub capacity: u64,
    /// Engine bytes still writable.
    pub available: u64,
    /// Engine bytes in use.
    pub used: u64,
    /// Bytes held by outstanding reservations.
    pub reserved_bytes: u64,
    pub reservation_count: usize,
    pub replica_count: usize,
}

impl StoreCapacity {
    pub fn new(
        engine: EngineCapacity,
        reserved_bytes: u64,
        reservation_count: usize,
        replica_count: usize,
    ) -> Self {
        Self {
            capacity: engine.capacity,
            available: engine.available,
            used: engine.used,
            reserved_bytes,
            reservation_count,
            replica_count,
        }
    }

    /// Available bytes not already promised to a reservation.
    pub fn unreserved_available(&self) -> u64 {
        self.available.saturating_sub(self.reserved_bytes)
    }
}

/// What a store advertises about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    pub store_id: StoreId,
    pub node_id: NodeId,
    pub attrs: Attributes,
    pub capacity: StoreCapacity,
}
