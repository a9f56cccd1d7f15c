//! # Error Types
//!
//! Errors raised while parsing shared identifiers.

use thiserror::Error;

/// Failure to parse an identifier or descriptor from text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIdError {
    /// Not a valid checksum identifier (UUID).
    #[error("Invalid checksum id: {0}")]
    InvalidChecksumId(String),

    /// A locality tier is not of the form `key=value`.
    #[error("Invalid locality tier: {0:?}")]
    InvalidLocality(String),
}
