//! Write same: zero-fill and pattern-fill of a block range
//!
//! Every block in the range gets the same contents. A zero fill carrying the
//! unmap or anchor flag deallocates instead of writing, since deallocated
//! blocks read back as zeros anyway.

use bytes::Bytes;

use crate::error::{LunError, Result};
use crate::store::Admission;
use crate::unmap;

use super::Lun;

/// Contents written to each block
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fill {
    Zero,

    /// Exactly one block of data
    Pattern(Bytes),
}

/// A write-same request
#[derive(Debug, Clone)]
pub struct WriteSame {
    pub lba: u64,
    pub blocks: u64,
    pub fill: Fill,

    /// Stamp each block's LBA (big-endian u32) into its first four bytes
    pub lbdata: bool,

    /// Deallocate instead of writing, but only when the result would read as
    /// zeros (zero fill or all-zero pattern, no `lbdata`). Any other data is
    /// written and stays mapped.
    pub unmap: bool,

    /// Like `unmap`, but keep the range provisioned. Same all-zero condition.
    pub anchor: bool,
}

impl WriteSame {
    /// Zero `blocks` blocks at `lba`
    pub fn zero(lba: u64, blocks: u64) -> Self {
        Self {
            lba,
            blocks,
            fill: Fill::Zero,
            lbdata: false,
            unmap: false,
            anchor: false,
        }
    }

    /// Repeat `pattern` (one block) over `blocks` blocks at `lba`
    pub fn pattern(lba: u64, blocks: u64, pattern: impl Into<Bytes>) -> Self {
        Self {
            fill: Fill::Pattern(pattern.into()),
            ..Self::zero(lba, blocks)
        }
    }

    pub fn with_lbdata(mut self) -> Self {
        self.lbdata = true;
        self
    }

    /// Deallocate the range if the fill reads back as zeros; see [`WriteSame::unmap`]
    pub fn with_unmap(mut self) -> Self {
        self.unmap = true;
        self
    }

    pub fn with_anchor(mut self) -> Self {
        self.anchor = true;
        self
    }

    /// True when every written block would be all zeros
    fn writes_zeros(&self) -> bool {
        !self.lbdata
            && match &self.fill {
                Fill::Zero => true,
                Fill::Pattern(pattern) => pattern.iter().all(|&b| b == 0),
            }
    }
}

impl Lun {
    /// Fill a block range with zeros or a repeated one-block pattern
    pub fn write_same(&self, request: &WriteSame) -> Result<()> {
        let _guard = self.quiesce.enter().ok_or(LunError::ShuttingDown)?;
        let geometry = self.geometry();
        geometry.check_range(request.lba, request.blocks)?;

        let block_size = geometry.block_size as usize;
        if let Fill::Pattern(pattern) = &request.fill {
            if pattern.len() != block_size {
                return Err(LunError::BufferSize {
                    expected: block_size,
                    actual: pattern.len(),
                });
            }
        }
        if request.lbdata && block_size < 4 {
            return Err(LunError::InvalidRequest(format!(
                "LBDATA needs at least 4-byte blocks, block size is {}",
                block_size
            )));
        }

        if (request.unmap || request.anchor) && request.writes_zeros() {
            return unmap::delete_range(&self.store, &geometry, request.lba, request.blocks, request.anchor);
        }

        let mut block = match &request.fill {
            Fill::Zero => vec![0u8; block_size],
            Fill::Pattern(pattern) => pattern.to_vec(),
        };

        let end = request.lba + request.blocks;
        let mut lba = request.lba;
        while lba < end {
            let in_page = geometry.offset_in_page(lba);
            let count = (geometry.blocks_per_page - in_page).min(end - lba);
            let page = self.store.reserve(geometry.page_of(lba), Admission::Write)?;
            for index in 0..count {
                if request.lbdata {
                    block[..4].copy_from_slice(&((lba + index) as u32).to_be_bytes());
                }
                page.copy_in(geometry.bytes(in_page + index), &block);
            }
            lba += count;
        }

        tracing::trace!(lba = request.lba, blocks = request.blocks, "Write same done");
        Ok(())
    }
}
