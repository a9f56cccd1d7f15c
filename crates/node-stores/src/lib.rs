//! # Node Stores
//!
//! Per-node store multiplexing and consistency verification.
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! A node hosts several independent stores, each owning a disjoint set of
//! range replicas. This crate:
//! - routes store-addressed requests to the right local store and rejects
//!   requests meant for another node ([`StoresServer`])
//! - admits or rejects space reservations ahead of replica transfers
//!   ([`Bookie`])
//! - serves cross-replica consistency checksums, attaching a data snapshot
//!   when the requester's checksum disagrees
//! - reports and forces the frozen state of replicas for rolling upgrades
//!
//! ## Module Structure
//!
//! ```text
//! node-stores/
//! ├── domain/      # Requests, responses, config, errors
//! ├── ports/       # StoresApi (inbound), Clock (outbound)
//! ├── bookie.rs    # Reservation ledger
//! ├── replica.rs   # Replica handle and checksum records
//! ├── store.rs     # Local store
//! ├── registry.rs  # StoreId -> Store directory
//! └── server.rs    # Store-addressed dispatcher
//! ```

pub mod bookie;
pub mod domain;
pub mod ports;
pub mod registry;
pub mod replica;
pub mod server;
pub mod store;

pub use bookie::{Bookie, Reservation};
pub use domain::{
    ChecksumResult, CollectChecksumRequest, CollectChecksumResponse, ComputeChecksum,
    FrozenStatus, PollFrozenRequest, PollFrozenResponse, RangeSnapshot, RejectReason,
    ReservationRequest, ReservationResponse, StoreCapacity, StoreConfig, StoreDescriptor,
    StoreError,
};
pub use ports::{Clock, ManualClock, StoresApi, SystemClock};
pub use registry::Stores;
pub use replica::Replica;
pub use server::StoresServer;
pub use store::{Store, SweepStats};
