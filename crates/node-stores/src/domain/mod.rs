//! # Domain Layer
//!
//! Request/response types of the store-addressed operations, the store
//! configuration and the error taxonomy.

pub mod capacity;
pub mod checksum;
pub mod config;
pub mod errors;
pub mod freeze;
pub mod reservation;

pub use capacity::{StoreCapacity, StoreDescriptor};
pub use checksum::{
    ChecksumResult, CollectChecksumRequest, CollectChecksumResponse, ComputeChecksum,
    RangeSnapshot,
};
pub use config::StoreConfig;
pub use errors::StoreError;
pub use freeze::{FrozenStatus, PollFrozenRequest, PollFrozenResponse};
pub use reservation::{RejectReason, ReservationRequest, ReservationResponse};
