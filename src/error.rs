//! Error types for RamLUN
//!
//! Provides a unified error type for all operations.
//!
//! A compare mismatch is not an error: it is reported as
//! [`IoOutcome::Miscompare`](crate::transfer::IoOutcome::Miscompare).

use thiserror::Error;

/// Result type alias using LunError
pub type Result<T> = std::result::Result<T, LunError>;

/// Unified error type for RamLUN operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LunError {
    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    /// Charging another page would exceed the configured capacity.
    /// Recoverable: only the request that hit it fails.
    #[error("No space left: {used} of {limit} bytes provisioned")]
    NoSpace { used: u64, limit: u64 },

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("LBA range {lba}+{blocks} exceeds LUN size of {size_blocks} blocks")]
    LbaOutOfRange { lba: u64, blocks: u64, size_blocks: u64 },

    /// A transfer reached past the end of a LUN that shrank underneath it
    #[error("Page {page} is past the end of the LUN ({total_pages} pages)")]
    PageOutOfRange { page: u64, total_pages: u64 },

    #[error("Host buffer is {actual} bytes, request needs {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request aborted after {blocks_done} blocks")]
    Aborted { blocks_done: u64 },

    #[error("Data move failed: {0}")]
    DataMove(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("LUN is shutting down")]
    ShuttingDown,

    #[error("Request dropped before completion")]
    Incomplete,

    #[error("Failed to start worker thread: {0}")]
    WorkerSpawn(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    InvalidConfig(String),
}

impl LunError {
    /// True for failures caused by thin-provisioning exhaustion
    pub fn is_no_space(&self) -> bool {
        matches!(self, LunError::NoSpace { .. })
    }
}
