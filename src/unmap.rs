//! Range Delete / Anchor Engine
//!
//! Implements unmap ("discard") over an arbitrary block range:
//!
//! ```text
//!   page:     |    p0    |    p1    |    p2    |    p3    |
//!   range:          [=========================]
//!                   ^ head        full         ^ tail
//!                   zero in place  release     zero in place
//!                   (if backed)    or anchor   (if backed)
//! ```
//!
//! Partially covered pages are zeroed in place only when they already have a
//! buffer; unmapped and anchored pages read as zero anyway, so they are never
//! allocated here. Only fully covered pages are released or anchored.

use crate::config::Geometry;
use crate::error::Result;
use crate::store::{Admission, PageStore};

/// One range of an unmap request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmapRange {
    pub lba: u64,
    pub blocks: u64,

    /// Keep the range provisioned (charged, reads zero) instead of freeing it
    pub anchor: bool,
}

impl UnmapRange {
    /// Fully deallocate `blocks` blocks at `lba`
    pub fn unmap(lba: u64, blocks: u64) -> Self {
        Self { lba, blocks, anchor: false }
    }

    /// Deallocate the data of `blocks` blocks at `lba` but keep them provisioned
    pub fn anchor(lba: u64, blocks: u64) -> Self {
        Self { lba, blocks, anchor: true }
    }
}

/// Unmap or anchor `blocks` blocks starting at `lba`.
///
/// Anchoring can fail with `NoSpace`; pages handled before the failure stay
/// anchored.
pub fn delete_range(store: &PageStore, geometry: &Geometry, lba: u64, blocks: u64, anchor: bool) -> Result<()> {
    if blocks == 0 {
        return Ok(());
    }

    let mut first = geometry.page_of(lba);
    let mut end = geometry.page_of(lba + blocks - 1) + 1;

    // Head: zero the covered part of a partially covered first page
    let head = geometry.offset_in_page(lba);
    if head != 0 {
        let count = blocks.min(geometry.blocks_per_page - head);
        if let Some(page) = store.peek(first) {
            let start = geometry.bytes(head);
            page.write()[start..start + geometry.bytes(count)].fill(0);
        }
        first += 1;
    }

    // Tail: zero the covered prefix of a partially covered last page
    let tail = geometry.offset_in_page(lba + blocks);
    if first < end && tail != 0 {
        if let Some(page) = store.peek(end - 1) {
            page.write()[..geometry.bytes(tail)].fill(0);
        }
        end -= 1;
    }

    for page in first..end {
        if anchor {
            store.reserve(page, Admission::Anchor)?;
        } else {
            store.release(page);
        }
    }

    tracing::trace!(lba, blocks, anchor, pages = end.saturating_sub(first), "Range deleted");
    Ok(())
}
