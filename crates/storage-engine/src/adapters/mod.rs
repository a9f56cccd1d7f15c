//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the [`crate::Engine`] port.

mod file;
mod memory;

pub use file::FileEngine;
pub use memory::InMemEngine;
