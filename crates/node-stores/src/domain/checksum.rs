//! # Consistency Checksum Types
//!
//! A consistency-check round is named by a [`ChecksumId`] committed
//! through the range's consensus log. Every replica computes a checksum
//! of its data at that point; the initiator then collects them and
//! compares.

use serde::{Deserialize, Serialize};
use shared_types::{ChecksumId, RangeId, StoreRequest, StoreRequestHeader};
use storage_engine::KeyValue;

/// Command delivered by the replication layer once the consistency-check
/// command has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeChecksum {
    pub checksum_id: ChecksumId,
    /// Keep a copy of the span's data with the checksum so it can be
    /// handed back on a mismatch.
    pub snapshot: bool,
}

impl ComputeChecksum {
    /// A round that captures a snapshot alongside the checksum.
    pub fn new(checksum_id: ChecksumId) -> Self {
        Self {
            checksum_id,
            snapshot: true,
        }
    }

    /// A round that computes the checksum only. A mismatch on such a
    /// round is still logged, but no data is returned with it.
    pub fn checksum_only(checksum_id: ChecksumId) -> Self {
        Self {
            checksum_id,
            snapshot: false,
        }
    }
}

/// Copy of a replica's data taken while its checksum was computed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RangeSnapshot {
    pub range_id: RangeId,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    /// Key/value pairs of the span, in key order.
    pub entries: Vec<KeyValue>,
}

impl RangeSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A finished checksum computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumResult {
    /// SHA-512 digest of the span.
    pub checksum: Vec<u8>,
    /// The data the digest was computed over, if the round asked for it.
    pub snapshot: Option<RangeSnapshot>,
}

/// Request for the local checksum of one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectChecksumRequest {
    pub header: StoreRequestHeader,
    pub range_id: RangeId,
    pub checksum_id: ChecksumId,
    /// The initiator's checksum for the same round.
    pub checksum: Vec<u8>,
}

impl StoreRequest for CollectChecksumRequest {
    fn header(&self) -> &StoreRequestHeader {
        &self.header
    }
}

/// Local checksum, plus a snapshot when it disagrees with the requester
/// and the round captured one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectChecksumResponse {
    pub checksum: Vec<u8>,
    pub snapshot: Option<RangeSnapshot>,
}

impl CollectChecksumResponse {
    /// Whether diagnostic data was attached.
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}
