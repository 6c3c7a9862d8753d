//! Transfer Module
//!
//! Moves data between host buffers and the page store in bounded chunks.
//!
//! ## Responsibilities
//! - Split a request into chunks of at most `max_segments` pages
//! - Describe each chunk as a direct segment or a scatter/gather list
//! - Hand chunks to the [`DataMover`] collaborator
//! - Push the remainder of large requests to the continuation queue
//!
//! ## Request Lifecycle
//! ```text
//!   submit ──▶ step (chunk 0) ──▶ done? ──yes──▶ completion
//!                                   │
//!                                   no
//!                                   ▼
//!                        ContinuationQueue (FIFO)
//!                                   │
//!                                   ▼
//!                worker: step, step, ... ──▶ completion
//! ```

mod engine;
mod mover;
mod queue;
mod request;
mod sg;

pub use engine::{Progress, TransferEngine};
pub use mover::{DataMover, MemoryMover};
pub use queue::{Completion, Continuation, ContinuationQueue};
pub use request::{AbortHandle, IoRequest, Operation};
pub use sg::{Chunk, ChunkData, Direction, Segment};

/// Final result of a request that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOutcome {
    Success,

    /// Compare found a difference at `offset` bytes into the request
    Miscompare { offset: u64 },
}

impl IoOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, IoOutcome::Success)
    }
}
