//! Transfer Engine
//!
//! Walks the page store in bounded chunks. Each call to [`TransferEngine::step`]
//! handles exactly one chunk:
//!
//! 1. locate the page and in-page offset of the cursor
//! 2. size the chunk: `min(remaining, max_segments * blocks_per_page - offset)`
//! 3. one page ⇒ direct segment, several ⇒ one segment per page
//! 4. hand the chunk to the data mover
//! 5. advance the cursor (and run the compare for compare requests)
//!
//! Page reservation failures abort the chunk with `NoSpace`. Pages reserved
//! earlier in the same chunk stay reserved.

use std::sync::Arc;

use crate::compare;
use crate::config::Geometry;
use crate::error::{LunError, Result};
use crate::store::{Admission, PageStore};

use super::mover::DataMover;
use super::request::{IoRequest, Operation};
use super::sg::{Chunk, ChunkData, Direction, Segment};
use super::IoOutcome;

/// Where a request stands after a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// More chunks to go
    Pending,

    /// Request finished
    Done(IoOutcome),
}

/// Chunking engine shared by submitters and continuation workers
pub struct TransferEngine {
    store: Arc<PageStore>,
    geometry: Geometry,
    max_segments: usize,
    mover: Arc<dyn DataMover>,
}

impl TransferEngine {
    pub fn new(
        store: Arc<PageStore>,
        geometry: Geometry,
        max_segments: usize,
        mover: Arc<dyn DataMover>,
    ) -> Self {
        Self {
            store,
            geometry,
            max_segments,
            mover,
        }
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Most blocks one chunk can cover when it starts on a page boundary
    pub fn max_chunk_blocks(&self) -> u64 {
        (self.max_segments as u64).saturating_mul(self.geometry.blocks_per_page)
    }

    /// Describe the next chunk of `request`, reserving its pages
    pub fn next_chunk(&self, request: &IoRequest) -> Result<Chunk> {
        let geometry = &self.geometry;
        let lba = request.lba() + request.processed();
        let offset = geometry.offset_in_page(lba);
        let blocks = request.remaining().min(self.max_chunk_blocks() - offset);
        let end = lba + blocks;

        let (admission, direction) = match request.op() {
            Operation::Read => (Admission::Read, Direction::ToHost),
            Operation::Write => (Admission::Write, Direction::FromHost),
            Operation::Compare => (Admission::Read, Direction::FromHost),
        };

        let pages = (geometry.page_of(end - 1) - geometry.page_of(lba) + 1) as usize;
        let mut segments = Vec::with_capacity(pages);
        let mut cursor = lba;
        while cursor < end {
            let in_page = geometry.offset_in_page(cursor);
            let count = (geometry.blocks_per_page - in_page).min(end - cursor);
            let len = geometry.bytes(count);

            let segment = if request.op() == Operation::Compare {
                Segment::staging(len)
            } else {
                let page = self.store.reserve(geometry.page_of(cursor), admission)?;
                Segment::page(page, geometry.bytes(in_page), len)
            };
            segments.push(segment);
            cursor += count;
        }

        Ok(Chunk {
            lba,
            blocks,
            host_offset: geometry.bytes(request.processed()),
            direction,
            data: ChunkData::from(segments),
        })
    }

    /// Run one chunk of `request` through the data mover
    pub fn step(&self, request: &mut IoRequest) -> Result<Progress> {
        if request.is_aborted() {
            return Err(LunError::Aborted {
                blocks_done: request.processed(),
            });
        }
        if request.remaining() == 0 {
            return Ok(Progress::Done(IoOutcome::Success));
        }

        let mut chunk = self.next_chunk(request)?;
        let host_range = chunk.host_offset..chunk.host_offset + self.geometry.bytes(chunk.blocks);
        let size_error = LunError::BufferSize {
            expected: self.geometry.bytes(request.blocks()),
            actual: request.data().len(),
        };
        let host = request.data_mut().get_mut(host_range).ok_or(size_error)?;

        self.mover.move_data(&mut chunk, host)?;
        request.advance(chunk.blocks);

        tracing::trace!(
            lba = chunk.lba,
            blocks = chunk.blocks,
            segments = chunk.segment_count(),
            direct = chunk.data.is_direct(),
            "Chunk moved"
        );

        if request.op() == Operation::Compare {
            let base = chunk.host_offset as u64;
            if let Some(offset) = compare::compare_chunk(&self.store, &self.geometry, &chunk, base) {
                return Ok(Progress::Done(IoOutcome::Miscompare { offset }));
            }
        }

        if request.remaining() == 0 {
            Ok(Progress::Done(IoOutcome::Success))
        } else {
            Ok(Progress::Pending)
        }
    }

    /// Drive `request` chunk by chunk on the current thread
    pub fn run_to_completion(&self, request: &mut IoRequest) -> Result<IoOutcome> {
        loop {
            if let Progress::Done(outcome) = self.step(request)? {
                return Ok(outcome);
            }
        }
    }
}
