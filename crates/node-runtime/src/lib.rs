//! # Node Runtime Library
//!
//! Bootstraps a node from a validated [`NodeConfig`]: opens one engine per
//! configured store, starts the stores and puts the store-addressed
//! dispatcher in front of them. The main entry point is the `main.rs`
//! binary; the library is exposed for integration tests.
//!
//! ## Structure
//!
//! - `container/` - configuration and the store container
//! - `node.rs` - the running [`Node`] and its [`NodeServices`] interface

pub mod container;
pub mod node;

pub use container::{ConfigError, NodeConfig, NodeError, StoreContainer, StoreSpec};
pub use node::{Node, NodeServices};
