//! Error Module - RGC Error Types
//!
//! Defines the recoverable error surface of the collector.
//!
//! The region core itself is assertion-based: precondition violations
//! (non-iso arguments, region-kind mismatches, corrupt class tags) fail
//! fast with a panic rather than returning an error. The only recoverable
//! failures originate in the allocator, and those propagate unchanged.

use thiserror::Error;

/// Main error type for all RGC operations
#[derive(Debug, Error)]
pub enum RgcError {
    #[error("out of memory: failed to allocate {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("allocation of {requested} bytes exceeds the maximum object size")]
    OversizedAllocation { requested: usize },
}

impl RgcError {
    /// Check if this error is recoverable
    ///
    /// Allocator exhaustion can be recovered from by collecting other
    /// regions and retrying; an oversized request never succeeds.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RgcError::OutOfMemory { .. })
    }
}

/// Result type alias for RGC operations
pub type Result<T> = std::result::Result<T, RgcError>;
