//! # Inbound Ports
//!
//! Store-addressed operations exposed to the node's RPC layer.

use async_trait::async_trait;

use crate::domain::{
    CollectChecksumRequest, CollectChecksumResponse, PollFrozenRequest, PollFrozenResponse,
    ReservationRequest, ReservationResponse, StoreError,
};

/// Store-addressed API - inbound port.
///
/// Every operation first checks the request header names this node, then
/// resolves the addressed store. Both failures are returned before any
/// store state is touched.
#[async_trait]
pub trait StoresApi: Send + Sync {
    /// Report, and optionally force, the frozen state of every replica on
    /// the store.
    async fn poll_frozen(&self, req: PollFrozenRequest) -> Result<PollFrozenResponse, StoreError>;

    /// Admit or reject a space reservation. Rejections are a normal
    /// response.
    async fn reserve(&self, req: ReservationRequest) -> Result<ReservationResponse, StoreError>;

    /// Return the local checksum of a consistency-check round, with a
    /// snapshot of the replica's data if it disagrees with the requester.
    async fn collect_checksum(
        &self,
        req: CollectChecksumRequest,
    ) -> Result<CollectChecksumResponse, StoreError>;
}
