//! # Store Request Header
//!
//! Addressing metadata carried by every store-addressed request.
//!
//! ## Properties
//!
//! - **Constructed per request**: never persisted.
//! - **Header Authority**: the `node_id` must match the serving node and
//!   the `store_id` must name a store registered there. Payloads never
//!   carry their own routing fields.

use serde::{Deserialize, Serialize};

use crate::entities::{NodeId, StoreId};

/// Target node and store of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoreRequestHeader {
    /// Node the sender believes hosts the store.
    pub node_id: NodeId,
    /// Store the request is addressed to.
    pub store_id: StoreId,
}

impl StoreRequestHeader {
    pub fn new(node_id: NodeId, store_id: StoreId) -> Self {
        Self { node_id, store_id }
    }
}

/// Implemented by every request type routed through the store dispatcher.
pub trait StoreRequest {
    /// The addressing header of the request.
    fn header(&self) -> &StoreRequestHeader;
}

impl StoreRequest for StoreRequestHeader {
    fn header(&self) -> &StoreRequestHeader {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_serde_roundtrip() {
        let header = StoreRequestHeader::new(NodeId(1), StoreId(2));
        let json = serde_json::to_string(&header).unwrap();
        let back: StoreRequestHeader = serde_json::from_str(&json).unwrap();
        assert_eq!(header, back);
    }

    #[test]
    fn test_header_is_its_own_request() {
        let header = StoreRequestHeader::new(NodeId(4), StoreId(9));
        assert_eq!(StoreRequest::header(&header).store_id, StoreId(9));
    }
}
