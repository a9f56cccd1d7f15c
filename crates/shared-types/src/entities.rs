//! # Core Domain Entities
//!
//! Identifiers and descriptors for the node, its stores and the ranges
//! they replicate.
//!
//! ## Clusters
//!
//! - **Identity**: `NodeId`, `StoreId`, `RangeId`, `ChecksumId`
//! - **Placement**: `Attributes`, `Locality`, `NodeDescriptor`
//! - **Keyspace**: `RangeDescriptor`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::ParseIdError;

// =============================================================================
// CLUSTER A: IDENTITY
// =============================================================================

/// Stable identifier of a node in the cluster.
///
/// Zero is reserved for "unset" and never identifies a running node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u32);

/// Stable identifier of a store, unique within its node.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct StoreId(pub u32);

/// Identifier of a range (one contiguous partition of the keyspace).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct RangeId(pub u64);

impl NodeId {
    /// Returns true if the identifier is the reserved zero value.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

impl fmt::Display for StoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for RangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Identifier of one consistency-check round.
///
/// Minted by the round initiator and committed through the range's
/// consensus log before any replica computes its checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecksumId(pub Uuid);

impl ChecksumId {
    /// Mint a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChecksumId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChecksumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChecksumId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(ChecksumId)
            .map_err(|e| ParseIdError::InvalidChecksumId(e.to_string()))
    }
}

// =============================================================================
// CLUSTER B: PLACEMENT
// =============================================================================

/// Free-form attributes of a node or store (e.g. `ssd`, `mem`).
///
/// Kept sorted and de-duplicated so two attribute sets compare equal
/// regardless of the order they were declared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Attributes {
    attrs: Vec<String>,
}

impl Attributes {
    /// Build an attribute set from any iterator of strings.
    pub fn new<I, S>(attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut attrs: Vec<String> = attrs.into_iter().map(Into::into).collect();
        attrs.sort();
        attrs.dedup();
        Self { attrs }
    }

    /// Whether the attribute is present.
    pub fn contains(&self, attr: &str) -> bool {
        self.attrs.binary_search_by(|a| a.as_str().cmp(attr)).is_ok()
    }

    /// Whether every attribute of `self` is present in `other`.
    pub fn is_subset(&self, other: &Attributes) -> bool {
        self.attrs.iter().all(|a| other.contains(a))
    }

    /// The attributes in sorted order.
    pub fn as_slice(&self) -> &[String] {
        &self.attrs
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }
}

impl fmt::Display for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.attrs.join(","))
    }
}

/// One level of a locality hierarchy (e.g. `region=eu`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tier {
    pub key: String,
    pub value: String,
}

/// Ordered locality tiers, most general first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Locality {
    pub tiers: Vec<Tier>,
}

impl FromStr for Locality {
    type Err = ParseIdError;

    /// Parse `region=eu,zone=b` style strings. The empty string is the
    /// empty locality.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        let tiers = s
            .split(',')
            .map(|part| {
                let (key, value) = part
                    .split_once('=')
                    .ok_or_else(|| ParseIdError::InvalidLocality(part.to_string()))?;
                if key.is_empty() || value.is_empty() {
                    return Err(ParseIdError::InvalidLocality(part.to_string()));
                }
                Ok(Tier {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tiers })
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .tiers
            .iter()
            .map(|t| format!("{}={}", t.key, t.value))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Identity of the local node. Immutable after node startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// The node's identifier.
    pub node_id: NodeId,
    /// Advertised network address (`host:port`).
    pub address: String,
    /// Node-level attributes.
    pub attrs: Attributes,
    /// Locality of the node.
    pub locality: Locality,
}

impl NodeDescriptor {
    pub fn new(node_id: NodeId, address: impl Into<String>) -> Self {
        Self {
            node_id,
            address: address.into(),
            attrs: Attributes::default(),
            locality: Locality::default(),
        }
    }
}

// =============================================================================
// CLUSTER C: KEYSPACE
// =============================================================================

/// The span of keys a range covers: `[start_key, end_key)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    /// The range's identifier.
    pub range_id: RangeId,
    /// Inclusive start of the span.
    pub start_key: Vec<u8>,
    /// Exclusive end of the span.
    pub end_key: Vec<u8>,
}

impl RangeDescriptor {
    pub fn new(range_id: RangeId, start_key: impl Into<Vec<u8>>, end_key: impl Into<Vec<u8>>) -> Self {
        Self {
            range_id,
            start_key: start_key.into(),
            end_key: end_key.into(),
        }
    }

    /// Whether `key` falls inside the span.
    pub fn contains_key(&self, key: &[u8]) -> bool {
        key >= self.start_key.as_slice() && key < self.end_key.as_slice()
    }

    /// A span is valid when it is non-empty.
    pub fn is_valid(&self) -> bool {
        self.start_key < self.end_key
    }
}
