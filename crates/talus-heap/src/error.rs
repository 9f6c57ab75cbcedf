//! Error types for heap operations.
//!
//! The public entry points report failure exclusively through a null return;
//! these types cover the fallible internal surface: arena creation, explicit
//! configuration, and heap-walk validation.

use std::io;

use thiserror::Error;

/// Result alias for heap operations.
pub type AllocResult<T> = Result<T, AllocError>;

/// Error raised by arena creation, configuration, or validation.
#[derive(Debug, Error)]
pub enum AllocError {
    /// The OS refused the anonymous mapping backing an arena. The arena is
    /// marked unusable and every allocation from it returns null.
    #[error("failed to map arena region of {size} bytes")]
    MappingFailed {
        /// Requested mapping size in bytes (before page rounding).
        size: usize,
        #[source]
        source: io::Error,
    },

    /// Rejected heap configuration, or configuration after first use.
    #[error("invalid heap configuration: {0}")]
    InvalidConfig(&'static str),

    /// A heap walk found a chunk or free-list inconsistency.
    #[error("heap corruption detected: {0}")]
    Corruption(&'static str),
}
