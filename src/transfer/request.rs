//! Pending I/O requests
//!
//! An `IoRequest` carries the host buffer and the engine-owned cursor that
//! records how many blocks have been transferred so far.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;

/// Data-moving operations the Transfer Engine understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Device → host
    Read,

    /// Host → device
    Write,

    /// Host bytes are verified against device contents, nothing is stored
    Compare,
}

/// Cancels a request before its next chunk
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// A block I/O request in flight
#[derive(Debug)]
pub struct IoRequest {
    op: Operation,
    lba: u64,
    blocks: u64,

    /// Host buffer: source for write/compare, destination for read
    data: BytesMut,

    /// Blocks transferred so far
    processed: u64,

    abort: AbortHandle,
}

impl IoRequest {
    /// Build a request around an existing host buffer
    pub fn new(op: Operation, lba: u64, blocks: u64, data: BytesMut) -> Self {
        Self {
            op,
            lba,
            blocks,
            data,
            processed: 0,
            abort: AbortHandle::default(),
        }
    }

    /// Read `blocks` blocks into a fresh zeroed buffer.
    ///
    /// A length that does not fit in memory yields an empty buffer, which
    /// submission rejects.
    pub fn read(lba: u64, blocks: u64, block_size: u32) -> Self {
        let len = blocks
            .checked_mul(u64::from(block_size))
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(0);
        Self::new(Operation::Read, lba, blocks, BytesMut::zeroed(len))
    }

    /// Write `data` starting at `lba`
    pub fn write(lba: u64, blocks: u64, data: &[u8]) -> Self {
        Self::new(Operation::Write, lba, blocks, BytesMut::from(data))
    }

    /// Compare `data` with the device starting at `lba`
    pub fn compare(lba: u64, blocks: u64, data: &[u8]) -> Self {
        Self::new(Operation::Compare, lba, blocks, BytesMut::from(data))
    }

    pub fn op(&self) -> Operation {
        self.op
    }

    pub fn lba(&self) -> u64 {
        self.lba
    }

    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Blocks transferred so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Blocks still to transfer
    pub fn remaining(&self) -> u64 {
        self.blocks - self.processed
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Give back the host buffer
    pub fn into_data(self) -> BytesMut {
        self.data
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub(crate) fn advance(&mut self, blocks: u64) {
        self.processed += blocks;
    }
}
