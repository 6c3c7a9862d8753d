//! Data mover
//!
//! The collaborator that actually moves bytes between the host buffer and a
//! chunk's segments. The Transfer Engine treats the return of `move_data` as
//! the completion callback and continues (or finishes) from there.

use crate::error::{LunError, Result};

use super::sg::{Chunk, Direction};

/// Moves bytes for one chunk
pub trait DataMover: Send + Sync {
    /// Move `chunk.len()` bytes between `host` and the chunk's segments.
    ///
    /// `host` is exactly the slice of the request's buffer this chunk covers.
    fn move_data(&self, chunk: &mut Chunk, host: &mut [u8]) -> Result<()>;
}

/// In-process mover: plain memory copies
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryMover;

impl DataMover for MemoryMover {
    fn move_data(&self, chunk: &mut Chunk, host: &mut [u8]) -> Result<()> {
        if host.len() != chunk.len() {
            return Err(LunError::DataMove(format!(
                "host window is {} bytes, chunk describes {}",
                host.len(),
                chunk.len()
            )));
        }

        let direction = chunk.direction;
        let mut offset = 0;
        for segment in chunk.data.segments_mut() {
            let window = &mut host[offset..offset + segment.len()];
            match direction {
                Direction::ToHost => segment.copy_out(window),
                Direction::FromHost => segment.copy_in(window),
            }
            offset += segment.len();
        }
        Ok(())
    }
}
