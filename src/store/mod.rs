//! Store Module
//!
//! Sparse, lazily-allocated page storage with a capacity ledger.
//!
//! ## Responsibilities
//! - Resolve page numbers to backing buffers (or the zero page)
//! - Admit pages for write/anchor, charging the capacity ledger
//! - Release pages on unmap, returning capacity
//! - Grow/shrink with the LUN, tear down on removal
//!
//! ## Concurrency
//! One `RwLock` per LUN guards the tree and the ledger together: lookups take
//! it shared, every mutation takes it exclusive. The black hole personality has
//! no tree and no lock at all.

mod ledger;
mod page;
mod tree;

pub use ledger::CapacityLedger;
pub use page::{Admission, PageBuf, PageRef, PageState};

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{Geometry, Personality};
use crate::error::{LunError, Result};
use tree::{PageTree, Slot};

/// Tree and ledger, always locked together
struct Provisioned {
    tree: PageTree,
    ledger: CapacityLedger,

    /// Pages addressable at the current LUN size; nothing at or past it is charged
    total_pages: u64,
}

enum Backing {
    Ramdisk(RwLock<Provisioned>),
    BlackHole,
}

/// Snapshot of the capacity ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Usage {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

/// Page storage for one LUN
pub struct PageStore {
    page_size: usize,
    backing: Backing,
}

impl PageStore {
    /// Create an empty store for the given geometry and personality
    pub fn new(geometry: &Geometry, personality: Personality) -> Self {
        let page_size = geometry.page_size as usize;
        let backing = match personality {
            Personality::Ramdisk { capacity_bytes } => Backing::Ramdisk(RwLock::new(Provisioned {
                tree: PageTree::new(page_size, geometry.total_pages()),
                ledger: CapacityLedger::new(capacity_bytes, page_size as u64),
                total_pages: geometry.total_pages(),
            })),
            Personality::BlackHole => Backing::BlackHole,
        };
        Self { page_size, backing }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn is_black_hole(&self) -> bool {
        matches!(self.backing, Backing::BlackHole)
    }

    // =========================================================================
    // Page Access
    // =========================================================================

    /// Resolve `page` for reading. Never allocates.
    pub fn lookup(&self, page: u64) -> PageRef {
        let Backing::Ramdisk(lock) = &self.backing else {
            return PageRef::Zero;
        };
        match lock.read().tree.get(page) {
            Some(Slot::Allocated(buf)) => PageRef::Backed(Arc::clone(buf)),
            _ => PageRef::Zero,
        }
    }

    /// Admit `page` for the given access.
    ///
    /// - `Read`: same as [`lookup`](Self::lookup)
    /// - `Write`: allocate (charging capacity unless already anchored) and
    ///   return the backing buffer
    /// - `Anchor`: charge capacity without backing bytes; an allocated page
    ///   loses its data. Returns the zero page.
    ///
    /// Fails with `NoSpace` when a charge would exceed capacity, and with
    /// `PageOutOfRange` for a write or anchor past the current end (a transfer
    /// that outlived a shrink). The slot is left untouched in both cases.
    pub fn reserve(&self, page: u64, admission: Admission) -> Result<PageRef> {
        let Backing::Ramdisk(lock) = &self.backing else {
            return Ok(PageRef::Zero);
        };
        if admission == Admission::Read {
            return Ok(self.lookup(page));
        }

        let mut guard = lock.write();
        let Provisioned { tree, ledger, total_pages } = &mut *guard;
        if page >= *total_pages {
            tracing::debug!(page, total_pages = *total_pages, "Page admission past the end");
            return Err(LunError::PageOutOfRange {
                page,
                total_pages: *total_pages,
            });
        }
        let slot = tree.get_or_insert(page);

        if admission == Admission::Anchor {
            if !slot.is_charged() {
                if let Err(e) = ledger.charge() {
                    tracing::warn!(page, "Page anchor failed: {}", e);
                    return Err(e);
                }
            }
            *slot = Slot::Anchored;
            return Ok(PageRef::Zero);
        }

        if let Slot::Allocated(buf) = slot {
            return Ok(PageRef::Backed(Arc::clone(buf)));
        }
        if !slot.is_charged() {
            if let Err(e) = ledger.charge() {
                tracing::warn!(page, "Page admission failed: {}", e);
                return Err(e);
            }
        }
        let buf = PageBuf::zeroed(self.page_size);
        *slot = Slot::Allocated(Arc::clone(&buf));
        Ok(PageRef::Backed(buf))
    }

    /// Backing buffer of `page` if it is allocated. Never allocates.
    pub fn peek(&self, page: u64) -> Option<Arc<PageBuf>> {
        match self.lookup(page) {
            PageRef::Backed(buf) => Some(buf),
            PageRef::Zero => None,
        }
    }

    /// Provisioning state of `page`. Every black hole page reports `Allocated`.
    pub fn state(&self, page: u64) -> PageState {
        let Backing::Ramdisk(lock) = &self.backing else {
            return PageState::Allocated;
        };
        lock.read()
            .tree
            .get(page)
            .map_or(PageState::Unmapped, Slot::state)
    }

    /// Unmap `page`, returning its capacity. No-op when already unmapped.
    pub fn release(&self, page: u64) {
        let Backing::Ramdisk(lock) = &self.backing else {
            return;
        };
        let mut guard = lock.write();
        let Provisioned { tree, ledger, .. } = &mut *guard;
        if let Some(slot) = tree.get_mut(page) {
            if slot.is_charged() {
                *slot = Slot::Unmapped;
                ledger.uncharge(1);
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Adapt to a new LUN size. Shrinking releases every page past the end
    /// and, in the same critical section, refuses further admissions there.
    pub fn resize(&self, total_pages: u64) {
        let Backing::Ramdisk(lock) = &self.backing else {
            return;
        };
        let mut guard = lock.write();
        let Provisioned { tree, ledger, total_pages: end } = &mut *guard;
        *end = total_pages;
        tree.grow(total_pages);
        let released = tree.release_from(total_pages);
        ledger.uncharge(released);
        tracing::debug!(total_pages, released, depth = tree.depth(), "Page store resized");
    }

    /// Free every page and node. Callers must have quiesced all I/O.
    pub fn teardown(&self) {
        if let Backing::Ramdisk(lock) = &self.backing {
            let mut guard = lock.write();
            guard.tree.clear();
            guard.ledger.reset();
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Ledger snapshot; `None` for the black hole, which has no capacity
    pub fn usage(&self) -> Option<Usage> {
        match &self.backing {
            Backing::Ramdisk(lock) => {
                let guard = lock.read();
                Some(Usage {
                    used_bytes: guard.ledger.used(),
                    limit_bytes: guard.ledger.limit(),
                })
            }
            Backing::BlackHole => None,
        }
    }

    /// Bytes currently charged (always 0 for the black hole)
    pub fn capacity_used(&self) -> u64 {
        self.usage().map_or(0, |u| u.used_bytes)
    }

    /// Levels every lookup descends (0 for the black hole)
    pub fn tree_depth(&self) -> u32 {
        match &self.backing {
            Backing::Ramdisk(lock) => lock.read().tree.depth(),
            Backing::BlackHole => 0,
        }
    }
}
