//! LUN Module
//!
//! The façade a target framework talks to: creation, resizing, removal and
//! request submission for one in-memory LUN.
//!
//! ## Components per LUN
//! ```text
//!   ┌──────────────────────────────────────────────────┐
//!   │ Lun                                              │
//!   │   quiesce gate ── in-flight count + Condvar      │
//!   │   TransferEngine ── chunking, data mover         │
//!   │   ContinuationQueue ── FIFO + worker threads     │
//!   │   PageStore ── RwLock<tree + ledger>             │
//!   └──────────────────────────────────────────────────┘
//! ```

mod quiesce;
mod status;
mod write_same;

pub use status::{LbaStatus, LunAttributes, ProvisioningStatus};
pub use write_same::{Fill, WriteSame};

use std::sync::Arc;

use bytes::BytesMut;
use crossbeam::channel;
use parking_lot::RwLock;

use crate::config::{Geometry, LunConfig, Personality};
use crate::error::{LunError, Result};
use crate::store::PageStore;
use crate::transfer::{
    Continuation, ContinuationQueue, DataMover, IoOutcome, IoRequest, MemoryMover, Progress,
    TransferEngine,
};
use crate::unmap::{self, UnmapRange};
use quiesce::Quiesce;

/// One in-memory logical unit
pub struct Lun {
    /// Configuration as supplied at creation
    config: LunConfig,

    /// Normalized personality (capacity rounded to pages)
    personality: Personality,

    /// Current geometry; only `size_blocks` changes after creation
    geometry: RwLock<Geometry>,

    store: Arc<PageStore>,
    engine: Arc<TransferEngine>,
    queue: ContinuationQueue,
    quiesce: Arc<Quiesce>,
}

impl Lun {
    /// Create a LUN whose data mover copies through process memory
    pub fn create(config: LunConfig) -> Result<Self> {
        Self::with_mover(config, Arc::new(MemoryMover))
    }

    /// Create a LUN driving transfers through `mover`
    pub fn with_mover(config: LunConfig, mover: Arc<dyn DataMover>) -> Result<Self> {
        let (geometry, personality) = config.validate()?;

        let store = Arc::new(PageStore::new(&geometry, personality));
        let engine = Arc::new(TransferEngine::new(
            Arc::clone(&store),
            geometry,
            config.max_segments,
            mover,
        ));
        let queue = ContinuationQueue::start(Arc::clone(&engine), config.worker_threads, &config.device_id)?;

        tracing::debug!(
            device_id = %config.device_id,
            block_size = geometry.block_size,
            page_size = geometry.page_size,
            size_blocks = geometry.size_blocks,
            tree_depth = store.tree_depth(),
            ?personality,
            "LUN created"
        );

        Ok(Self {
            config,
            personality,
            geometry: RwLock::new(geometry),
            store,
            engine,
            queue,
            quiesce: Arc::new(Quiesce::default()),
        })
    }

    // =========================================================================
    // Request Submission
    // =========================================================================

    /// Submit a read/write/compare request.
    ///
    /// The first chunk runs on the calling thread; any remainder is finished by
    /// a continuation worker. `done` is called exactly once, on whichever
    /// thread finishes the request.
    pub fn submit<F>(&self, mut request: IoRequest, done: F)
    where
        F: FnOnce(IoRequest, Result<IoOutcome>) + Send + 'static,
    {
        let Some(guard) = self.quiesce.enter() else {
            return done(request, Err(LunError::ShuttingDown));
        };
        if let Err(e) = self.check_request(&request) {
            return done(request, Err(e));
        }

        match self.engine.step(&mut request) {
            Ok(Progress::Done(outcome)) => done(request, Ok(outcome)),
            Err(e) => done(request, Err(e)),
            Ok(Progress::Pending) => {
                let continuation = Continuation::new(
                    request,
                    Box::new(move |request, result| {
                        done(request, result);
                        drop(guard);
                    }),
                );
                if let Err(continuation) = self.queue.enqueue(continuation) {
                    continuation.fail(LunError::ShuttingDown);
                }
            }
        }
    }

    /// Submit `request` and block until it completes
    pub fn execute(&self, request: IoRequest) -> Result<(IoOutcome, IoRequest)> {
        let (sender, receiver) = channel::bounded(1);
        self.submit(request, move |request, result| {
            let _ = sender.send((request, result));
        });
        let (request, result) = receiver.recv().map_err(|_| LunError::Incomplete)?;
        result.map(|outcome| (outcome, request))
    }

    /// Read `blocks` blocks starting at `lba`
    pub fn read(&self, lba: u64, blocks: u64) -> Result<BytesMut> {
        // The host buffer is sized from `blocks`, so range-check before allocating
        self.geometry().check_range(lba, blocks)?;
        let request = IoRequest::read(lba, blocks, self.block_size());
        let (_, request) = self.execute(request)?;
        Ok(request.into_data())
    }

    /// Write `data` (whole blocks) starting at `lba`
    pub fn write(&self, lba: u64, data: &[u8]) -> Result<()> {
        let blocks = self.blocks_in(data)?;
        self.execute(IoRequest::write(lba, blocks, data))?;
        Ok(())
    }

    /// Compare `data` (whole blocks) with the device starting at `lba`
    pub fn compare(&self, lba: u64, data: &[u8]) -> Result<IoOutcome> {
        let blocks = self.blocks_in(data)?;
        let (outcome, _) = self.execute(IoRequest::compare(lba, blocks, data))?;
        Ok(outcome)
    }

    /// Unmap or anchor each range. All ranges are validated before any is applied.
    pub fn unmap(&self, ranges: &[UnmapRange]) -> Result<()> {
        let _guard = self.quiesce.enter().ok_or(LunError::ShuttingDown)?;
        let geometry = self.geometry();
        for range in ranges {
            geometry.check_range(range.lba, range.blocks)?;
        }
        for range in ranges {
            unmap::delete_range(&self.store, &geometry, range.lba, range.blocks, range.anchor)?;
        }
        Ok(())
    }

    /// Flush volatile caches. Memory is the medium, so there is nothing to do.
    pub fn sync_cache(&self, lba: u64, blocks: u64) -> Result<()> {
        let _guard = self.quiesce.enter().ok_or(LunError::ShuttingDown)?;
        self.geometry().check_range(lba, blocks)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Change the logical size. Shrinking releases the pages past the new end;
    /// an in-flight transfer that reaches them fails with `PageOutOfRange`.
    pub fn resize(&self, size_bytes: u64) -> Result<u64> {
        let _guard = self.quiesce.enter().ok_or(LunError::ShuttingDown)?;
        let mut geometry = self.geometry.write();
        let size_blocks = size_bytes / u64::from(geometry.block_size);
        if size_blocks == 0 {
            return Err(LunError::InvalidConfig(format!(
                "LUN size {} is smaller than the block size {}",
                size_bytes, geometry.block_size
            )));
        }

        let old_blocks = geometry.size_blocks;
        geometry.size_blocks = size_blocks;
        self.store.resize(geometry.total_pages());

        tracing::debug!(device_id = %self.config.device_id, old_blocks, size_blocks, "LUN resized");
        Ok(size_blocks)
    }

    /// Stop accepting requests, wait for in-flight ones, drain the
    /// continuation queue and free all pages.
    ///
    /// Must not be called from a completion callback.
    pub fn shutdown(&self) {
        if self.quiesce.is_closed() {
            return;
        }
        tracing::info!(device_id = %self.config.device_id, "Shutting down LUN");

        self.quiesce.close_and_wait();
        self.queue.shutdown();
        self.store.teardown();

        tracing::info!(device_id = %self.config.device_id, "LUN removed");
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_request(&self, request: &IoRequest) -> Result<()> {
        let geometry = self.geometry();
        geometry.check_range(request.lba(), request.blocks())?;
        let expected = geometry.bytes(request.blocks());
        if request.data().len() != expected {
            return Err(LunError::BufferSize {
                expected,
                actual: request.data().len(),
            });
        }
        if request.processed() != 0 {
            return Err(LunError::InvalidRequest("request was already started".into()));
        }
        Ok(())
    }

    fn blocks_in(&self, data: &[u8]) -> Result<u64> {
        let block_size = self.block_size() as usize;
        if data.len() % block_size != 0 {
            return Err(LunError::BufferSize {
                expected: data.len().next_multiple_of(block_size),
                actual: data.len(),
            });
        }
        Ok((data.len() / block_size) as u64)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Snapshot of the current geometry
    pub fn geometry(&self) -> Geometry {
        *self.geometry.read()
    }

    pub fn block_size(&self) -> u32 {
        self.geometry.read().block_size
    }

    pub fn size_blocks(&self) -> u64 {
        self.geometry.read().size_blocks
    }

    pub fn personality(&self) -> Personality {
        self.personality
    }

    pub fn config(&self) -> &LunConfig {
        &self.config
    }

    /// Bytes provisioned from the capacity (0 for the black hole)
    pub fn capacity_used(&self) -> u64 {
        self.store.capacity_used()
    }

    pub fn tree_depth(&self) -> u32 {
        self.store.tree_depth()
    }

    /// Requests queued or running on continuation workers
    pub fn pending_continuations(&self) -> usize {
        self.queue.pending()
    }

    /// Operations currently holding the quiesce gate
    pub fn in_flight(&self) -> usize {
        self.quiesce.active()
    }

    pub fn is_black_hole(&self) -> bool {
        matches!(self.personality, Personality::BlackHole)
    }
}
