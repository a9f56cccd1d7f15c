//! # Shared Types Crate
//!
//! Identifiers and descriptors shared by every crate of the node:
//! the storage engine, the store core and the node runtime.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: cross-crate identifiers are defined here.
//! - **Header Authority**: every store-addressed request carries a
//!   `StoreRequestHeader`; the header, not the payload, decides which node
//!   and store serve it.
//! - **Typed Identifiers**: node, store and range identifiers are distinct
//!   newtypes so they cannot be mixed up at call sites.

pub mod entities;
pub mod errors;
pub mod header;

pub use entities::*;
pub use errors::*;
pub use header::{StoreRequest, StoreRequestHeader};
