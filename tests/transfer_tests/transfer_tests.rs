//! Tests for the Transfer Engine and Continuation Queue
//!
//! These tests verify:
//! - Chunk sizing and direct vs scatter/gather descriptions
//! - Data mover invocation counts and segment caps
//! - Continuations finishing large requests on worker threads
//! - Abort between chunks
//! - NoSpace mid-request without rollback

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver};
use ramlun::config::LunConfig;
use ramlun::store::{PageState, PageStore};
use ramlun::transfer::{
    Chunk, DataMover, Direction, IoOutcome, IoRequest, MemoryMover, Progress, TransferEngine,
};
use ramlun::{Lun, LunError};

const BLOCK: usize = 512;
const PAGE: usize = 4096;
const BLOCKS_PER_PAGE: u64 = 8;

// =============================================================================
// Helper Functions
// =============================================================================

fn engine(capacity_pages: u64, max_segments: usize) -> (Arc<PageStore>, TransferEngine) {
    let (geometry, personality) = LunConfig::builder()
        .ramdisk(capacity_pages * PAGE as u64)
        .size_bytes(256 * PAGE as u64)
        .build()
        .validate()
        .unwrap();
    let store = Arc::new(PageStore::new(&geometry, personality));
    let engine = TransferEngine::new(Arc::clone(&store), geometry, max_segments, Arc::new(MemoryMover));
    (store, engine)
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Counts calls and remembers the largest segment list it was handed
#[derive(Default)]
struct CountingMover {
    calls: AtomicUsize,
    max_segments_seen: AtomicUsize,
}

impl DataMover for CountingMover {
    fn move_data(&self, chunk: &mut Chunk, host: &mut [u8]) -> ramlun::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.max_segments_seen.fetch_max(chunk.segment_count(), Ordering::SeqCst);
        MemoryMover.move_data(chunk, host)
    }
}

/// Lets the first chunk through, then waits for a token per chunk
struct GatedMover {
    calls: AtomicUsize,
    gate: Receiver<()>,
}

impl DataMover for GatedMover {
    fn move_data(&self, chunk: &mut Chunk, host: &mut [u8]) -> ramlun::Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) > 0 {
            self.gate.recv().map_err(|e| LunError::DataMove(e.to_string()))?;
        }
        MemoryMover.move_data(chunk, host)
    }
}

/// Always fails
struct BrokenMover;

impl DataMover for BrokenMover {
    fn move_data(&self, _chunk: &mut Chunk, _host: &mut [u8]) -> ramlun::Result<()> {
        Err(LunError::DataMove("link down".into()))
    }
}

fn lun_with_mover(max_segments: usize, mover: Arc<dyn DataMover>) -> Lun {
    let config = LunConfig::builder()
        .ramdisk(256 * PAGE as u64)
        .max_segments(max_segments)
        .worker_threads(2)
        .build();
    Lun::with_mover(config, mover).unwrap()
}

// =============================================================================
// Chunk Description Tests
// =============================================================================

#[test]
fn test_single_page_chunk_is_direct() {
    let (_store, engine) = engine(16, 4);
    let request = IoRequest::write(2, 4, &pattern(4 * BLOCK, 1));

    let chunk = engine.next_chunk(&request).unwrap();

    assert!(chunk.data.is_direct());
    assert_eq!(chunk.segment_count(), 1);
    assert_eq!(chunk.blocks, 4);
    assert_eq!(chunk.len(), 4 * BLOCK);
    assert_eq!(chunk.direction, Direction::FromHost);
}

#[test]
fn test_page_crossing_chunk_is_scatter() {
    let (_store, engine) = engine(16, 4);
    let request = IoRequest::read(6, 4, BLOCK as u32);

    let chunk = engine.next_chunk(&request).unwrap();

    assert!(!chunk.data.is_direct());
    assert_eq!(chunk.segment_count(), 2);
    let lens: Vec<usize> = chunk.data.segments().iter().map(|s| s.len()).collect();
    assert_eq!(lens, vec![2 * BLOCK, 2 * BLOCK]);
    assert_eq!(chunk.direction, Direction::ToHost);
}

#[test]
fn test_chunk_capped_at_max_segments() {
    let (_store, engine) = engine(64, 4);
    let request = IoRequest::write(3, 100, &pattern(100 * BLOCK, 2));

    let chunk = engine.next_chunk(&request).unwrap();

    // Starts 3 blocks into a page: 5 + 8 + 8 + 8 blocks over 4 pages
    assert_eq!(chunk.segment_count(), 4);
    assert_eq!(chunk.blocks, 4 * BLOCKS_PER_PAGE - 3);
    assert_eq!(chunk.host_offset, 0);
}

#[test]
fn test_read_chunk_never_allocates() {
    let (store, engine) = engine(16, 4);
    let request = IoRequest::read(0, 32, BLOCK as u32);

    let chunk = engine.next_chunk(&request).unwrap();

    assert!(chunk
        .data
        .segments()
        .iter()
        .all(|s| s.page_ref().is_some_and(|p| p.is_zero())));
    assert_eq!(store.capacity_used(), 0);
}

#[test]
fn test_compare_chunk_uses_staging() {
    let (store, engine) = engine(16, 4);
    let request = IoRequest::compare(4, 8, &pattern(8 * BLOCK, 3));

    let chunk = engine.next_chunk(&request).unwrap();

    assert_eq!(chunk.segment_count(), 2);
    assert!(chunk.data.segments().iter().all(|s| s.staged().is_some()));
    assert_eq!(store.capacity_used(), 0);
}

// =============================================================================
// Step Tests
// =============================================================================

#[test]
fn test_step_advances_cursor() {
    let (_store, engine) = engine(64, 2);
    let mut request = IoRequest::write(0, 40, &pattern(40 * BLOCK, 4));

    assert_eq!(engine.step(&mut request).unwrap(), Progress::Pending);
    assert_eq!(request.processed(), 16);
    assert_eq!(engine.step(&mut request).unwrap(), Progress::Pending);
    assert_eq!(request.processed(), 32);
    assert_eq!(engine.step(&mut request).unwrap(), Progress::Done(IoOutcome::Success));
    assert_eq!(request.processed(), 40);
    assert_eq!(request.remaining(), 0);
}

#[test]
fn test_run_to_completion_round_trip() {
    let (store, engine) = engine(64, 3);
    let data = pattern(50 * BLOCK, 5);

    let mut write = IoRequest::write(5, 50, &data);
    assert_eq!(engine.run_to_completion(&mut write).unwrap(), IoOutcome::Success);

    let mut read = IoRequest::read(5, 50, BLOCK as u32);
    assert_eq!(engine.run_to_completion(&mut read).unwrap(), IoOutcome::Success);

    assert_eq!(read.data(), &data[..]);
    // Blocks 5..55 touch pages 0..=6
    assert_eq!(store.capacity_used(), 7 * PAGE as u64);
}

#[test]
fn test_zero_block_request_completes() {
    let (_store, engine) = engine(4, 4);
    let mut request = IoRequest::read(0, 0, BLOCK as u32);

    assert_eq!(engine.step(&mut request).unwrap(), Progress::Done(IoOutcome::Success));
}

#[test]
fn test_no_space_mid_chunk_keeps_reserved_pages() {
    let (store, engine) = engine(2, 8);
    let mut request = IoRequest::write(0, 24, &pattern(24 * BLOCK, 6));

    let err = engine.run_to_completion(&mut request).unwrap_err();

    assert!(err.is_no_space());
    assert_eq!(request.processed(), 0);
    assert_eq!(store.state(0), PageState::Allocated);
    assert_eq!(store.state(1), PageState::Allocated);
    assert_eq!(store.state(2), PageState::Unmapped);
    assert_eq!(store.capacity_used(), 2 * PAGE as u64);
}

#[test]
fn test_no_space_in_later_chunk_keeps_earlier_data() {
    let (store, engine) = engine(3, 2);
    let data = pattern(32 * BLOCK, 7);
    let mut request = IoRequest::write(0, 32, &data);

    let err = engine.run_to_completion(&mut request).unwrap_err();

    assert!(err.is_no_space());
    assert_eq!(request.processed(), 16);
    let mut read = IoRequest::read(0, 16, BLOCK as u32);
    engine.run_to_completion(&mut read).unwrap();
    assert_eq!(read.data(), &data[..16 * BLOCK]);
    assert_eq!(store.capacity_used(), 3 * PAGE as u64);
}

// =============================================================================
// Data Mover Tests
// =============================================================================

#[test]
fn test_mover_called_once_per_chunk() {
    let mover = Arc::new(CountingMover::default());
    let lun = lun_with_mover(2, Arc::clone(&mover) as Arc<dyn DataMover>);
    let data = pattern(80 * BLOCK, 8);

    lun.write(0, &data).unwrap();

    // 10 pages, 2 per chunk
    assert_eq!(mover.calls.load(Ordering::SeqCst), 5);
    assert_eq!(mover.max_segments_seen.load(Ordering::SeqCst), 2);
    assert_eq!(&lun.read(0, 80).unwrap()[..], &data[..]);
    lun.shutdown();
}

#[test]
fn test_mover_failure_fails_request() {
    let lun = lun_with_mover(4, Arc::new(BrokenMover));

    let err = lun.write(0, &pattern(BLOCK, 9)).unwrap_err();

    assert_eq!(err, LunError::DataMove("link down".into()));
    lun.shutdown();
}

// =============================================================================
// Continuation Tests
// =============================================================================

#[test]
fn test_small_request_completes_on_caller() {
    let lun = lun_with_mover(4, Arc::new(MemoryMover));
    let (sender, receiver) = channel::bounded(1);

    let request = IoRequest::write(0, 8, &pattern(8 * BLOCK, 10));
    lun.submit(request, move |_request, result| {
        sender.send((thread::current().id(), result)).unwrap();
    });

    let (completed_on, result) = receiver.recv().unwrap();
    assert_eq!(result.unwrap(), IoOutcome::Success);
    assert_eq!(completed_on, thread::current().id());
    lun.shutdown();
}

#[test]
fn test_large_request_completes_on_worker() {
    let lun = lun_with_mover(1, Arc::new(MemoryMover));
    let (sender, receiver) = channel::bounded(1);
    let data = pattern(64 * BLOCK, 11);

    lun.submit(IoRequest::write(0, 64, &data), move |request, result| {
        sender.send((thread::current().id(), request.processed(), result)).unwrap();
    });

    let (completed_on, processed, result) = receiver.recv().unwrap();
    assert_eq!(result.unwrap(), IoOutcome::Success);
    assert_eq!(processed, 64);
    assert_ne!(completed_on, thread::current().id());
    assert_eq!(&lun.read(0, 64).unwrap()[..], &data[..]);
    lun.shutdown();
}

#[test]
fn test_chunking_does_not_change_results() {
    let data = pattern(300 * BLOCK, 12);
    let narrow = lun_with_mover(1, Arc::new(MemoryMover));
    let wide = lun_with_mover(1024, Arc::new(MemoryMover));

    for lun in [&narrow, &wide] {
        lun.write(3, &data).unwrap();
    }

    assert_eq!(narrow.read(0, 310).unwrap(), wide.read(0, 310).unwrap());
    assert_eq!(narrow.capacity_used(), wide.capacity_used());
    narrow.shutdown();
    wide.shutdown();
}

#[test]
fn test_many_concurrent_continuations() {
    let lun = Arc::new(lun_with_mover(1, Arc::new(MemoryMover)));
    let mut handles = vec![];

    for i in 0..8u64 {
        let lun = Arc::clone(&lun);
        handles.push(thread::spawn(move || {
            let data = pattern(24 * BLOCK, i as u8);
            lun.write(i * 24, &data).unwrap();
            assert_eq!(&lun.read(i * 24, 24).unwrap()[..], &data[..]);
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(lun.pending_continuations(), 0);
    lun.shutdown();
}

// =============================================================================
// Abort Tests
// =============================================================================

#[test]
fn test_abort_before_submit() {
    let lun = lun_with_mover(4, Arc::new(MemoryMover));
    let request = IoRequest::write(0, 8, &pattern(8 * BLOCK, 13));
    request.abort_handle().abort();

    let err = lun.execute(request).unwrap_err();

    assert_eq!(err, LunError::Aborted { blocks_done: 0 });
    assert_eq!(lun.capacity_used(), 0);
    lun.shutdown();
}

#[test]
fn test_abort_between_chunks() {
    let (gate_tx, gate_rx) = channel::unbounded();
    let mover = Arc::new(GatedMover {
        calls: AtomicUsize::new(0),
        gate: gate_rx,
    });
    let lun = lun_with_mover(1, mover);
    let (sender, receiver) = channel::bounded(1);

    let request = IoRequest::write(0, 32, &pattern(32 * BLOCK, 14));
    let abort = request.abort_handle();
    lun.submit(request, move |_request, result| {
        sender.send(result).unwrap();
    });

    // First chunk ran on this thread; the worker is parked on the gate or
    // about to check the abort flag
    abort.abort();
    gate_tx.send(()).unwrap();

    match receiver.recv().unwrap() {
        Err(LunError::Aborted { blocks_done }) => {
            assert!(blocks_done >= BLOCKS_PER_PAGE);
            assert!(blocks_done < 32);
        }
        other => panic!("expected abort, got {:?}", other),
    }
    lun.shutdown();
}

// =============================================================================
// Resize Tests
// =============================================================================

#[test]
fn test_shrink_during_transfer_leaves_no_stranded_pages() {
    let (gate_tx, gate_rx) = channel::unbounded();
    let mover = Arc::new(GatedMover {
        calls: AtomicUsize::new(0),
        gate: gate_rx,
    });
    let config = LunConfig::builder()
        .ramdisk(8 * PAGE as u64)
        .max_segments(2)
        .worker_threads(1)
        .build();
    let lun = Lun::with_mover(config, mover).unwrap();
    let (sender, receiver) = channel::bounded(1);

    lun.submit(IoRequest::write(0, 64, &pattern(64 * BLOCK, 15)), move |_request, result| {
        sender.send(result).unwrap();
    });

    // Pages 0 and 1 are written; the worker is held before chunk 2 moves
    lun.resize(2 * PAGE as u64).unwrap();
    gate_tx.send(()).unwrap();

    let result = receiver.recv().unwrap();
    assert!(
        matches!(result, Err(LunError::PageOutOfRange { total_pages: 2, .. })),
        "{:?}",
        result
    );
    assert_eq!(lun.size_blocks(), 16);
    assert_eq!(lun.capacity_used(), 2 * PAGE as u64);

    lun.unmap(&[ramlun::UnmapRange::unmap(0, 16)]).unwrap();
    assert_eq!(lun.capacity_used(), 0);
    assert_eq!(lun.attribute("blocksused"), Some(0));
    assert_eq!(lun.attribute("blocksavail"), Some(8 * BLOCKS_PER_PAGE));
    lun.shutdown();
}

#[test]
fn test_unbounded_segments_engine() {
    let (geometry, personality) = LunConfig::builder()
        .ramdisk(16 * PAGE as u64)
        .build()
        .validate()
        .unwrap();
    let store = Arc::new(PageStore::new(&geometry, personality));
    let engine = TransferEngine::new(Arc::clone(&store), geometry, usize::MAX, Arc::new(MemoryMover));
    let data = pattern(20 * BLOCK, 16);

    assert_eq!(engine.max_chunk_blocks(), u64::MAX);
    let mut request = IoRequest::write(3, 20, &data);
    assert_eq!(engine.step(&mut request).unwrap(), Progress::Done(IoOutcome::Success));

    let mut read = IoRequest::read(3, 20, BLOCK as u32);
    engine.run_to_completion(&mut read).unwrap();
    assert_eq!(read.data(), &data[..]);
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_shutdown_drains_queued_requests() {
    let lun = lun_with_mover(1, Arc::new(MemoryMover));
    let completed = Arc::new(AtomicUsize::new(0));

    for i in 0..16u64 {
        let completed = Arc::clone(&completed);
        lun.submit(IoRequest::write(i * 16, 16, &pattern(16 * BLOCK, i as u8)), move |_, result| {
            assert!(result.is_ok());
            completed.fetch_add(1, Ordering::SeqCst);
        });
    }
    lun.shutdown();

    assert_eq!(completed.load(Ordering::SeqCst), 16);
    assert_eq!(lun.in_flight(), 0);
    assert_eq!(lun.pending_continuations(), 0);
}

#[test]
fn test_submit_after_shutdown() {
    let lun = lun_with_mover(4, Arc::new(MemoryMover));
    lun.shutdown();

    let err = lun.execute(IoRequest::read(0, 1, BLOCK as u32)).unwrap_err();

    assert_eq!(err, LunError::ShuttingDown);
}
