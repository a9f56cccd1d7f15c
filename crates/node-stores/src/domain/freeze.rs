//! # Freeze Poll Types

use serde::{Deserialize, Serialize};
use shared_types::{RangeId, StoreRequest, StoreRequestHeader};

/// Poll the frozen state of every replica on a store, optionally freezing
/// the ones that are not yet frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollFrozenRequest {
    pub header: StoreRequestHeader,
    pub collect_frozen: bool,
}

impl StoreRequest for PollFrozenRequest {
    fn header(&self) -> &StoreRequestHeader {
        &self.header
    }
}

/// Status of one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenStatus {
    pub range_id: RangeId,
    pub frozen: bool,
    /// Why the replica could not be frozen.
    pub error: Option<String>,
}

/// Per-replica results, ordered by range id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PollFrozenResponse {
    pub results: Vec<FrozenStatus>,
}

impl PollFrozenResponse {
    pub fn frozen_count(&self) -> usize {
        self.results.iter().filter(|s| s.frozen).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|s| s.error.is_some()).count()
    }

    pub fn status(&self, range_id: RangeId) -> Option<&FrozenStatus> {
        self.results.iter().find(|s| s.range_id == range_id)
    }
}
