//! # Node Configuration
//!
//! Everything needed to stand up a node: its identity, the stores it
//! hosts and their policies. Configuration is explicit and validated up
//! front; an unsupported store combination is a typed error, never a
//! panic.
//!
//! ## Environment
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `NODE_ID` | `1` | Node identifier (non-zero) |
//! | `NODE_ADDRESS` | `127.0.0.1:26257` | Advertised address |
//! | `NODE_LOCALITY` | empty | `region=eu,zone=b` |
//! | `NODE_ATTRS` | empty | Comma-separated node attributes |
//! | `NODE_STORES` | one in-memory store | `;`-separated store specs |
//! | `NODE_REPLICATION_FACTOR` | `3` | Default replication factor |
//! | `NODE_MAX_RESERVATIONS` | `4` | Per-store reservation count limit |
//! | `NODE_MAX_RESERVED_BYTES` | `256MiB` | Per-store reservation byte ceiling |
//! | `NODE_RESERVATION_TTL_SECS` | `30` | Reservation lifetime |
//! | `NODE_CHECKSUM_WAIT_MS` | `5000` | Bound on waiting for a pending checksum |
//!
//! A store spec is a comma-separated list of `key=value` pairs:
//! `type=mem,size=512MiB` or `type=disk,path=/data/s1,size=10GiB,cache=1GiB,attrs=ssd:fast`.

use node_stores::StoreConfig;
use shared_types::{Attributes, Locality, NodeId};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use storage_engine::{EngineKind, EngineSpec, DEFAULT_IN_MEM_SIZE_BYTES, MIN_ENGINE_SIZE_BYTES};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Node id must be set to a non-zero value")]
    MissingNodeId,

    #[error("At least one store must be configured")]
    NoStores,

    #[error("Store #{index}: in-memory store cannot have a path")]
    InMemWithPath { index: usize },

    #[error("Store #{index}: on-disk store requires a path")]
    OnDiskWithoutPath { index: usize },

    #[error("Store #{index}: size {size} bytes is below the minimum of {min} bytes")]
    StoreTooSmall { index: usize, size: u64, min: u64 },

    #[error("Store #{index}: cache size {cache} bytes exceeds store size {size} bytes")]
    CacheTooLarge { index: usize, cache: u64, size: u64 },

    #[error("Default replication factor must be at least 1")]
    ZeroReplicationFactor,

    #[error("Invalid store spec '{spec}': {reason}")]
    InvalidStoreSpec { spec: String, reason: String },

    #[error("Invalid store policy: {0}")]
    InvalidStorePolicy(String),

    #[error("Invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },
}

// =============================================================================
// STORE SPEC
// =============================================================================

/// How one store of the node is backed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSpec {
    pub kind: EngineKind,
    /// Data location, required for on-disk stores.
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    pub cache_size_bytes: u64,
    pub attrs: Attributes,
}

impl StoreSpec {
    /// In-memory store with the given ceiling.
    pub fn in_mem(size_bytes: u64) -> Self {
        Self {
            kind: EngineKind::InMem,
            path: None,
            size_bytes,
            cache_size_bytes: 0,
            attrs: Attributes::new(["mem"]),
        }
    }

    /// File-backed store at `path`.
    pub fn on_disk(path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            kind: EngineKind::OnDisk,
            path: Some(path.into()),
            size_bytes,
            cache_size_bytes: 0,
            attrs: Attributes::default(),
        }
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_cache_size(mut self, cache_size_bytes: u64) -> Self {
        self.cache_size_bytes = cache_size_bytes;
        self
    }

    /// The engine to open for this store.
    pub fn engine_spec(&self) -> EngineSpec {
        EngineSpec {
            kind: self.kind,
            attrs: self.attrs.clone(),
            size_bytes: self.size_bytes,
            cache_size_bytes: self.cache_size_bytes,
            path: self.path.clone(),
        }
    }

    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        match (self.kind, &self.path) {
            (EngineKind::InMem, Some(_)) => return Err(ConfigError::InMemWithPath { index }),
            (EngineKind::OnDisk, None) => return Err(ConfigError::OnDiskWithoutPath { index }),
            _ => {}
        }
        if self.size_bytes < MIN_ENGINE_SIZE_BYTES {
            return Err(ConfigError::StoreTooSmall {
                index,
                size: self.size_bytes,
                min: MIN_ENGINE_SIZE_BYTES,
            });
        }
        if self.cache_size_bytes > self.size_bytes {
            return Err(ConfigError::CacheTooLarge {
                index,
                cache: self.cache_size_bytes,
                size: self.size_bytes,
            });
        }
        Ok(())
    }
}

impl FromStr for StoreSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| ConfigError::InvalidStoreSpec {
            spec: s.to_string(),
            reason,
        };

        let mut kind = None;
        let mut path = None;
        let mut size_bytes = None;
        let mut cache_size_bytes = 0;
        let mut attrs = None;

        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(format!("expected key=value, got '{}'", part)))?;
            match key.trim() {
                "type" => {
                    kind = Some(match value {
                        "mem" => EngineKind::InMem,
                        "disk" => EngineKind::OnDisk,
                        other => return Err(invalid(format!("unknown type '{}'", other))),
                    })
                }
                "path" => path = Some(PathBuf::from(value)),
                "size" => size_bytes = Some(parse_size(value).map_err(invalid)?),
                "cache" => cache_size_bytes = parse_size(value).map_err(invalid)?,
                "attrs" => attrs = Some(Attributes::new(value.split(':').filter(|a| !a.is_empty()))),
                other => return Err(invalid(format!("unknown key '{}'", other))),
            }
        }

        // A path without an explicit type means a disk store.
        let kind = kind.unwrap_or(if path.is_some() {
            EngineKind::OnDisk
        } else {
            EngineKind::InMem
        });
        let mut spec = match kind {
            EngineKind::InMem => StoreSpec::in_mem(size_bytes.unwrap_or(DEFAULT_IN_MEM_SIZE_BYTES)),
            EngineKind::OnDisk => StoreSpec {
                path: None,
                ..StoreSpec::on_disk(PathBuf::new(), size_bytes.unwrap_or(DEFAULT_IN_MEM_SIZE_BYTES))
            },
        };
        spec.path = path;
        spec.cache_size_bytes = cache_size_bytes;
        if let Some(attrs) = attrs {
            spec.attrs = attrs;
        }
        Ok(spec)
    }
}

/// Parse `1024`, `64KiB`, `512MiB` or `2GiB`.
fn parse_size(value: &str) -> Result<u64, String> {
    let value = value.trim();
    let (digits, shift) = [("GiB", 30), ("MiB", 20), ("KiB", 10)]
        .iter()
        .find_map(|(suffix, shift)| value.strip_suffix(suffix).map(|d| (d, *shift)))
        .unwrap_or((value, 0));
    let n: u64 = digits
        .trim()
        .parse()
        .map_err(|_| format!("invalid size '{}'", value))?;
    n.checked_mul(1u64 << shift)
        .ok_or_else(|| format!("size '{}' overflows", value))
}

// =============================================================================
// NODE CONFIG
// =============================================================================

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub node_id: NodeId,
    /// Advertised `host:port`.
    pub address: String,
    pub locality: Locality,
    pub attrs: Attributes,
    /// One entry per store, in StoreId order starting at 1.
    pub stores: Vec<StoreSpec>,
    /// Policy applied to every store.
    pub store: StoreConfig,
    /// Replication factor for ranges created by this node.
    pub default_replication_factor: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: NodeId(1),
            address: "127.0.0.1:26257".to_string(),
            locality: Locality::default(),
            attrs: Attributes::default(),
            stores: vec![StoreSpec::in_mem(DEFAULT_IN_MEM_SIZE_BYTES)],
            store: StoreConfig::default(),
            default_replication_factor: 3,
        }
    }
}

impl NodeConfig {
    /// Single small in-memory store with short timeouts.
    pub fn for_testing() -> Self {
        Self {
            stores: vec![StoreSpec::in_mem(16 << 20)],
            store: StoreConfig::for_testing(),
            default_replication_factor: 1,
            ..Self::default()
        }
    }

    pub fn with_store(mut self, spec: StoreSpec) -> Self {
        self.stores.push(spec);
        self
    }

    /// Check the configuration before anything is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_id.is_unset() {
            return Err(ConfigError::MissingNodeId);
        }
        if self.stores.is_empty() {
            return Err(ConfigError::NoStores);
        }
        for (index, spec) in self.stores.iter().enumerate() {
            spec.validate(index)?;
        }
        if self.default_replication_factor == 0 {
            return Err(ConfigError::ZeroReplicationFactor);
        }
        self.store
            .validate()
            .map_err(|e| ConfigError::InvalidStorePolicy(e.to_string()))
    }

    /// Load configuration from `NODE_*` environment variables on top of
    /// the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = lookup("NODE_ID") {
            config.node_id = NodeId(parse_env("NODE_ID", &value)?);
        }
        if let Some(value) = lookup("NODE_ADDRESS") {
            config.address = value;
        }
        if let Some(value) = lookup("NODE_LOCALITY") {
            config.locality = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "NODE_LOCALITY".into(),
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup("NODE_ATTRS") {
            config.attrs = Attributes::new(value.split(',').map(str::trim).filter(|a| !a.is_empty()));
        }
        if let Some(value) = lookup("NODE_STORES") {
            config.stores = value
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(StoreSpec::from_str)
                .collect::<Result<_, _>>()?;
        }
        if let Some(value) = lookup("NODE_REPLICATION_FACTOR") {
            config.default_replication_factor = parse_env("NODE_REPLICATION_FACTOR", &value)?;
        }
        if let Some(value) = lookup("NODE_MAX_RESERVATIONS") {
            config.store.max_reservations = parse_env("NODE_MAX_RESERVATIONS", &value)?;
        }
        if let Some(value) = lookup("NODE_MAX_RESERVED_BYTES") {
            config.store.max_reserved_bytes =
                parse_size(&value).map_err(|_| ConfigError::InvalidEnv {
                    var: "NODE_MAX_RESERVED_BYTES".into(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup("NODE_RESERVATION_TTL_SECS") {
            config.store.reservation_ttl =
                Duration::from_secs(parse_env("NODE_RESERVATION_TTL_SECS", &value)?);
        }
        if let Some(value) = lookup("NODE_CHECKSUM_WAIT_MS") {
            config.store.checksum_wait_timeout =
                Duration::from_millis(parse_env("NODE_CHECKSUM_WAIT_MS", &value)?);
        }

        Ok(config)
    }
}

fn parse_env<T: FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}
