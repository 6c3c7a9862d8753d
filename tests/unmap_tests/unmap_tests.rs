//! Tests for range delete and anchor
//!
//! These tests verify:
//! - Fully covered pages are released (or anchored) and capacity follows
//! - Partially covered head/tail pages are zeroed in place, never released
//! - Unmap is idempotent and never allocates
//! - Anchor failures surface as NoSpace

use ramlun::config::{Geometry, LunConfig};
use ramlun::store::{PageState, PageStore};
use ramlun::unmap;
use ramlun::{Lun, LunError, UnmapRange};

const BLOCK: usize = 512;
const PAGE: u64 = 4096;

// =============================================================================
// Helper Functions
// =============================================================================

fn create_lun(capacity_pages: u64) -> Lun {
    let config = LunConfig::builder()
        .ramdisk(capacity_pages * PAGE)
        .size_bytes(64 * PAGE)
        .worker_threads(1)
        .build();
    Lun::create(config).unwrap()
}

fn fill(lun: &Lun, lba: u64, blocks: u64, byte: u8) {
    lun.write(lba, &vec![byte; blocks as usize * BLOCK]).unwrap();
}

fn block_is(lun: &Lun, lba: u64, byte: u8) -> bool {
    lun.read(lba, 1).unwrap().iter().all(|&b| b == byte)
}

fn create_store(capacity_pages: u64) -> (Geometry, PageStore) {
    let (geometry, personality) = LunConfig::builder()
        .ramdisk(capacity_pages * PAGE)
        .size_bytes(64 * PAGE)
        .build()
        .validate()
        .unwrap();
    let store = PageStore::new(&geometry, personality);
    (geometry, store)
}

// =============================================================================
// Full Page Tests
// =============================================================================

#[test]
fn test_unmap_full_pages_releases_capacity() {
    let lun = create_lun(8);
    fill(&lun, 0, 24, 0xAA);
    assert_eq!(lun.capacity_used(), 3 * PAGE);

    lun.unmap(&[UnmapRange::unmap(8, 16)]).unwrap();

    assert_eq!(lun.capacity_used(), PAGE);
    assert!(block_is(&lun, 7, 0xAA));
    assert!(block_is(&lun, 8, 0));
    assert!(block_is(&lun, 23, 0));
    lun.shutdown();
}

#[test]
fn test_unmap_is_idempotent() {
    let lun = create_lun(8);
    fill(&lun, 0, 16, 0x11);

    lun.unmap(&[UnmapRange::unmap(0, 16)]).unwrap();
    lun.unmap(&[UnmapRange::unmap(0, 16)]).unwrap();

    assert_eq!(lun.capacity_used(), 0);
    assert_eq!(&lun.read(0, 16).unwrap()[..], &vec![0u8; 16 * BLOCK][..]);
    lun.shutdown();
}

#[test]
fn test_unmap_zero_blocks_is_noop() {
    let lun = create_lun(8);
    fill(&lun, 0, 8, 0x22);

    lun.unmap(&[UnmapRange::unmap(0, 0)]).unwrap();

    assert_eq!(lun.capacity_used(), PAGE);
    assert!(block_is(&lun, 0, 0x22));
    lun.shutdown();
}

// =============================================================================
// Partial Page Tests
// =============================================================================

#[test]
fn test_unmap_inside_one_page_zeroes_in_place() {
    let lun = create_lun(8);
    fill(&lun, 0, 8, 0xAA);

    lun.unmap(&[UnmapRange::unmap(2, 3)]).unwrap();

    assert_eq!(lun.capacity_used(), PAGE);
    for lba in 0..8 {
        let expected = if (2..5).contains(&lba) { 0 } else { 0xAA };
        assert!(block_is(&lun, lba, expected), "block {}", lba);
    }
    lun.shutdown();
}

#[test]
fn test_unmap_head_and_tail_pages() {
    let lun = create_lun(8);
    fill(&lun, 0, 32, 0xAA);

    lun.unmap(&[UnmapRange::unmap(4, 24)]).unwrap();

    // Pages 1 and 2 released, pages 0 and 3 partially zeroed
    assert_eq!(lun.capacity_used(), 2 * PAGE);
    for lba in 0..32 {
        let expected = if (4..28).contains(&lba) { 0 } else { 0xAA };
        assert!(block_is(&lun, lba, expected), "block {}", lba);
    }
    lun.shutdown();
}

#[test]
fn test_unmap_two_partial_pages() {
    let lun = create_lun(8);
    fill(&lun, 0, 16, 0x5C);

    lun.unmap(&[UnmapRange::unmap(4, 8)]).unwrap();

    assert_eq!(lun.capacity_used(), 2 * PAGE);
    assert!(block_is(&lun, 3, 0x5C));
    assert!(block_is(&lun, 4, 0));
    assert!(block_is(&lun, 11, 0));
    assert!(block_is(&lun, 12, 0x5C));
    lun.shutdown();
}

#[test]
fn test_partial_unmap_never_allocates() {
    let (geometry, store) = create_store(8);

    unmap::delete_range(&store, &geometry, 1, 2, false).unwrap();
    unmap::delete_range(&store, &geometry, 9, 2, true).unwrap();

    assert_eq!(store.capacity_used(), 0);
    assert_eq!(store.state(0), PageState::Unmapped);
    assert_eq!(store.state(1), PageState::Unmapped);
}

// =============================================================================
// Anchor Tests
// =============================================================================

#[test]
fn test_anchor_provisions_without_data() {
    let lun = create_lun(8);

    lun.unmap(&[UnmapRange::anchor(0, 16)]).unwrap();

    assert_eq!(lun.capacity_used(), 2 * PAGE);
    assert_eq!(&lun.read(0, 16).unwrap()[..], &vec![0u8; 16 * BLOCK][..]);

    // Writing into an anchored page does not charge again
    fill(&lun, 0, 1, 0x77);
    assert_eq!(lun.capacity_used(), 2 * PAGE);
    assert!(block_is(&lun, 0, 0x77));
    assert!(block_is(&lun, 1, 0));
    lun.shutdown();
}

#[test]
fn test_anchor_discards_allocated_data() {
    let lun = create_lun(8);
    fill(&lun, 0, 8, 0x33);

    lun.unmap(&[UnmapRange::anchor(0, 8)]).unwrap();

    assert_eq!(lun.capacity_used(), PAGE);
    assert!(block_is(&lun, 0, 0));
    assert!(block_is(&lun, 7, 0));
    lun.shutdown();
}

#[test]
fn test_anchor_without_capacity() {
    let (geometry, store) = create_store(1);

    let err = unmap::delete_range(&store, &geometry, 0, 16, true).unwrap_err();

    assert_eq!(err, LunError::NoSpace { used: PAGE, limit: PAGE });
    // The first page was anchored before capacity ran out
    assert_eq!(store.state(0), PageState::Anchored);
    assert_eq!(store.state(1), PageState::Unmapped);
}

#[test]
fn test_unmap_releases_anchored_pages() {
    let lun = create_lun(8);
    lun.unmap(&[UnmapRange::anchor(0, 24)]).unwrap();

    lun.unmap(&[UnmapRange::unmap(0, 24)]).unwrap();

    assert_eq!(lun.capacity_used(), 0);
    lun.shutdown();
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_unmap_validates_every_range_first() {
    let lun = create_lun(8);
    fill(&lun, 0, 8, 0x44);

    let err = lun
        .unmap(&[UnmapRange::unmap(0, 8), UnmapRange::unmap(510, 8)])
        .unwrap_err();

    assert!(matches!(err, LunError::LbaOutOfRange { lba: 510, .. }));
    assert_eq!(lun.capacity_used(), PAGE);
    assert!(block_is(&lun, 0, 0x44));
    lun.shutdown();
}

#[test]
fn test_unmap_black_hole() {
    let config = LunConfig::builder()
        .black_hole()
        .size_bytes(64 * PAGE)
        .worker_threads(1)
        .build();
    let lun = Lun::create(config).unwrap();

    lun.unmap(&[UnmapRange::unmap(0, 100), UnmapRange::anchor(100, 100)]).unwrap();

    assert_eq!(lun.capacity_used(), 0);
    lun.shutdown();
}
