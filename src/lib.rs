//! # RamLUN
//!
//! An in-memory block backend for SCSI/NVMe targets with:
//! - Two personalities: thin-provisioned ramdisk and discard-only black hole
//! - Lazily allocated pages in a sparse N-ary page tree
//! - Capacity accounting with unmap and anchor (provision-only) support
//! - Bounded scatter/gather chunking with queued continuations
//! - Byte-exact compare reporting the first mismatching offset
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Lun façade                          │
//! │       (create / resize / submit / unmap / shutdown)         │
//! └───────┬──────────────────────┬──────────────────────┬───────┘
//!         │                      │                      │
//!         ▼                      ▼                      ▼
//!  ┌─────────────┐      ┌─────────────────┐     ┌──────────────┐
//!  │  Transfer   │─────▶│  Continuation   │     │ Range Delete │
//!  │   Engine    │      │ Queue (workers) │     │   / Anchor   │
//!  └──────┬──────┘      └─────────────────┘     └──────┬───────┘
//!         │    ┌─────────────┐                         │
//!         ├───▶│   Compare   │                         │
//!         │    └──────┬──────┘                         │
//!         ▼           ▼                                ▼
//!  ┌─────────────────────────────────────────────────────────────┐
//!  │              Page Store (RwLock<tree + ledger>)             │
//!  └─────────────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod store;
pub mod transfer;
pub mod compare;
pub mod unmap;
pub mod lun;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LunError, Result};
pub use config::{Geometry, LunConfig, Personality};
pub use lun::{Fill, LbaStatus, Lun, LunAttributes, ProvisioningStatus, WriteSame};
pub use transfer::{IoOutcome, IoRequest, Operation};
pub use unmap::UnmapRange;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RamLUN
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
