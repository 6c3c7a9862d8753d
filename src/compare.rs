//! Compare Engine
//!
//! Verifies host bytes against the current device contents, one block at a
//! time, and reports the offset of the first differing byte.
//!
//! Pages are fetched with read admission, so never-written and anchored
//! ranges compare against zeros and nothing is ever allocated.

use crate::config::Geometry;
use crate::store::PageStore;
use crate::transfer::Chunk;

/// Compare `expected` (whole blocks) with the device starting at `lba`.
///
/// Returns the first mismatching byte offset, counted from `base_offset`.
pub fn compare_blocks(
    store: &PageStore,
    geometry: &Geometry,
    lba: u64,
    expected: &[u8],
    base_offset: u64,
) -> Option<u64> {
    let block_size = geometry.block_size as usize;
    for (index, block) in expected.chunks(block_size).enumerate() {
        let current = lba + index as u64;
        let page = store.lookup(geometry.page_of(current));
        let offset = geometry.bytes(geometry.offset_in_page(current));

        let prefix = page.common_prefix(offset, block);
        if prefix < block.len() {
            return Some(base_offset + (index * block_size + prefix) as u64);
        }
    }
    None
}

/// Compare the staged host bytes of a compare chunk with the device
pub fn compare_chunk(store: &PageStore, geometry: &Geometry, chunk: &Chunk, base_offset: u64) -> Option<u64> {
    let mut lba = chunk.lba;
    let mut offset = base_offset;
    for segment in chunk.data.segments() {
        let staged = segment.staged()?;
        if let Some(mismatch) = compare_blocks(store, geometry, lba, staged, offset) {
            return Some(mismatch);
        }
        lba += (staged.len() / geometry.block_size as usize) as u64;
        offset += staged.len() as u64;
    }
    None
}
