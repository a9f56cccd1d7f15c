//! # Domain Errors
//!
//! Error taxonomy of the store core.
//!
//! | Class | Variants | Caller remediation |
//! |-------|----------|--------------------|
//! | Dispatch | `MisroutedRequest`, `StoreNotFound`, `StoreRemoved` | Refresh routing, retry elsewhere |
//! | Replica | `RangeNotFound` | Refresh range location |
//! | Checksum | `ChecksumNotReady`, `ChecksumNotFound`, `ChecksumComputationFailed` | Retry later or treat as inconclusive |
//! | Admission | `ReservationRejected` | Pick another target |

use shared_types::{ChecksumId, NodeId, RangeId, StoreId};
use storage_engine::EngineError;
use thiserror::Error;

use super::reservation::RejectReason;

/// Store core error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The request named a different node than the one serving it.
    #[error("Misrouted request: addressed to node {requested}, received by node {local}")]
    MisroutedRequest {
        /// Node named in the request header
        requested: NodeId,
        /// Node that received the request
        local: NodeId,
    },

    /// No store with this id is registered on the node.
    #[error("Store {0} was not found on this node")]
    StoreNotFound(StoreId),

    /// The store was registered here but has been taken offline.
    #[error("Store {0} has been removed from this node")]
    StoreRemoved(StoreId),

    /// A store with this id is already registered.
    #[error("Store {0} is already registered")]
    StoreExists(StoreId),

    /// The store holds no replica of the range.
    #[error("Range {range_id} was not found on store {store_id}")]
    RangeNotFound { store_id: StoreId, range_id: RangeId },

    /// The store already holds a replica of the range.
    #[error("Store {store_id} already holds a replica of range {range_id}")]
    ReplicaExists { store_id: StoreId, range_id: RangeId },

    /// The range descriptor does not describe a non-empty span.
    #[error("Invalid descriptor for range {0}: start key must sort before end key")]
    InvalidRangeDescriptor(RangeId),

    /// The replica was destroyed while the operation was in flight.
    #[error("Replica of range {0} has been destroyed")]
    ReplicaDestroyed(RangeId),

    /// The checksum computation is still running.
    #[error("Checksum {checksum_id} for range {range_id} is not ready")]
    ChecksumNotReady {
        range_id: RangeId,
        checksum_id: ChecksumId,
    },

    /// No computation with this id was ever started on the replica, or its
    /// record has been garbage-collected.
    #[error("Checksum {checksum_id} for range {range_id} was not found")]
    ChecksumNotFound {
        range_id: RangeId,
        checksum_id: ChecksumId,
    },

    /// The computation ran and failed.
    #[error("Checksum {checksum_id} for range {range_id} failed: {reason}")]
    ChecksumComputationFailed {
        range_id: RangeId,
        checksum_id: ChecksumId,
        reason: String,
    },

    /// A reservation was refused. Only produced by
    /// `ReservationResponse::into_result`; the protocol itself answers with
    /// a response value.
    #[error("Reservation rejected: {reason}")]
    ReservationRejected { reason: RejectReason },

    /// Local and requested checksums disagree. Logged, and surfaced through
    /// the response snapshot rather than returned.
    #[error("consistency check failed on range {range_id}: expected checksum {expected}, got {actual}")]
    ConsistencyMismatch {
        range_id: RangeId,
        /// Requester's checksum, hex encoded
        expected: String,
        /// Local checksum, hex encoded
        actual: String,
    },

    /// Configuration rejected by validation.
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Background work could not be scheduled.
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// The storage engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl StoreError {
    /// True for both never-registered and removed stores.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::StoreNotFound(_) | StoreError::StoreRemoved(_))
    }

    /// Dispatch-level errors are structural; retrying the same target
    /// cannot succeed.
    pub fn is_routing_error(&self) -> bool {
        matches!(self, StoreError::MisroutedRequest { .. }) || self.is_not_found()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_misrouted_message_names_both_nodes() {
        let err = StoreError::MisroutedRequest {
            requested: NodeId(7),
            local: NodeId(1),
        };
        let msg = err.to_string();
        assert!(msg.contains("n7"));
        assert!(msg.contains("n1"));
        assert!(err.is_routing_error());
    }

    #[test]
    fn test_removed_is_not_found_but_distinct() {
        let removed = StoreError::StoreRemoved(StoreId(2));
        let missing = StoreError::StoreNotFound(StoreId(2));
        assert!(removed.is_not_found());
        assert!(missing.is_not_found());
        assert_ne!(removed, missing);
        assert!(!StoreError::RangeNotFound {
            store_id: StoreId(1),
            range_id: RangeId(1)
        }
        .is_not_found());
    }

    #[test]
    fn test_engine_error_converts() {
        let err: StoreError = EngineError::Io("disk gone".into()).into();
        assert!(matches!(err, StoreError::Engine(_)));
        assert!(err.to_string().contains("disk gone"));
    }
}
