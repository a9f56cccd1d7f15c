//! # Reservation Protocol Types
//!
//! A rebalancer reserves space on a target store before streaming a range
//! replica to it. Rejections are ordinary backpressure and travel as a
//! response value, not as an error.

use serde::{Deserialize, Serialize};
use shared_types::{NodeId, RangeId, StoreId, StoreRequest, StoreRequestHeader};
use std::fmt;

use super::errors::StoreError;

/// Request to hold `size_bytes` on the addressed store for `range_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub header: StoreRequestHeader,
    /// Node of the requesting rebalancer.
    pub from_node_id: NodeId,
    /// Store the replica will be streamed from.
    pub from_store_id: StoreId,
    /// Range the space is reserved for.
    pub range_id: RangeId,
    pub size_bytes: u64,
}

impl StoreRequest for ReservationRequest {
    fn header(&self) -> &StoreRequestHeader {
        &self.header
    }
}

/// Why a reservation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Admitting the reservation would over-commit the store.
    InsufficientSpace { requested: u64, available: u64 },
    /// The store already holds its maximum number of reservations.
    TooManyReservations { limit: usize },
    /// The engine is nearly full.
    StoreOverloaded {
        available_percent: u8,
        required_percent: u8,
    },
    /// Another rebalancer already holds the reservation for this range.
    RangeAlreadyReserved {
        holder_node_id: NodeId,
        holder_store_id: StoreId,
    },
}

impl RejectReason {
    /// Metric label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::InsufficientSpace { .. } => "insufficient_space",
            RejectReason::TooManyReservations { .. } => "too_many_reservations",
            RejectReason::StoreOverloaded { .. } => "store_overloaded",
            RejectReason::RangeAlreadyReserved { .. } => "range_already_reserved",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientSpace {
                requested,
                available,
            } => write!(
                f,
                "insufficient space: requested {} bytes, {} available",
                requested, available
            ),
            RejectReason::TooManyReservations { limit } => {
                write!(f, "too many concurrent reservations (limit {})", limit)
            }
            RejectReason::StoreOverloaded {
                available_percent,
                required_percent,
            } => write!(
                f,
                "store overloaded: {}% available, {}% required",
                available_percent, required_percent
            ),
            RejectReason::RangeAlreadyReserved {
                holder_node_id,
                holder_store_id,
            } => write!(
                f,
                "range already reserved by {}/{}",
                holder_node_id, holder_store_id
            ),
        }
    }
}

/// Outcome of a reservation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationResponse {
    pub reserved: bool,
    /// Set exactly when `reserved` is false.
    pub reason: Option<RejectReason>,
}

impl ReservationResponse {
    pub fn accepted() -> Self {
        Self {
            reserved: true,
            reason: None,
        }
    }

    pub fn rejected(reason: RejectReason) -> Self {
        Self {
            reserved: false,
            reason: Some(reason),
        }
    }

    /// Convert a rejection into [`StoreError::ReservationRejected`].
    pub fn into_result(self) -> Result<(), StoreError> {
        match self.reason {
            Some(reason) if !self.reserved => Err(StoreError::ReservationRejected { reason }),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result() {
        assert!(ReservationResponse::accepted().into_result().is_ok());

        let reason = RejectReason::TooManyReservations { limit: 2 };
        let err = ReservationResponse::rejected(reason).into_result().unwrap_err();
        assert_eq!(err, StoreError::ReservationRejected { reason });
        assert!(err.to_string().contains("limit 2"));
    }

    #[test]
    fn test_labels_are_distinct() {
        let labels = [
            RejectReason::InsufficientSpace {
                requested: 1,
                available: 0,
            }
            .label(),
            RejectReason::TooManyReservations { limit: 1 }.label(),
            RejectReason::StoreOverloaded {
                available_percent: 1,
                required_percent: 5,
            }
            .label(),
        ];
        assert_ne!(labels[0], labels[1]);
        assert_ne!(labels[1], labels[2]);
        assert_ne!(labels[0], labels[2]);
    }
}
