//! # Ports Layer
//!
//! - [`inbound`]: what the store core offers to the RPC layer
//! - [`outbound`]: what the store core needs from its environment

pub mod inbound;
pub mod outbound;

pub use inbound::StoresApi;
pub use outbound::{Clock, ManualClock, SystemClock};
