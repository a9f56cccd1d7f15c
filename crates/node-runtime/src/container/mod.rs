//! # Store Container
//!
//! Node configuration and the container holding the node's stores with
//! lifetime management.
//!
//! - Stores are opened in configuration order and numbered from 1
//! - Requests reach a store only through the `StoresServer` dispatcher

pub mod config;
pub mod stores;

pub use config::{ConfigError, NodeConfig, StoreSpec};
pub use stores::{NodeError, StoreContainer};
