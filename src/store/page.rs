//! Page buffers and page references
//!
//! A backing page is an `Arc<PageBuf>`: the tree slot owns it, in-flight
//! scatter/gather segments borrow it by cloning the `Arc`. The bytes sit behind
//! their own lock so data movement never holds the tree lock.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// One page of backing memory
pub struct PageBuf {
    data: RwLock<Box<[u8]>>,
}

impl PageBuf {
    /// Allocate a zero-filled page
    pub(crate) fn zeroed(size: usize) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(vec![0u8; size].into_boxed_slice()),
        })
    }

    /// Shared access to the page bytes
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read()
    }

    /// Exclusive access to the page bytes
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.data.write()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for PageBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuf").field("len", &self.len()).finish()
    }
}

// =============================================================================
// Page References
// =============================================================================

/// What a page number resolves to for I/O purposes
#[derive(Debug, Clone)]
pub enum PageRef {
    /// The shared zero page. Reads yield zeros; writes are discarded.
    /// Never handed out mutably, so it cannot be corrupted.
    Zero,

    /// A real backing buffer
    Backed(Arc<PageBuf>),
}

impl PageRef {
    pub fn is_zero(&self) -> bool {
        matches!(self, PageRef::Zero)
    }

    /// Copy `dst.len()` bytes starting at `offset` into `dst`
    pub fn copy_out(&self, offset: usize, dst: &mut [u8]) {
        match self {
            PageRef::Zero => dst.fill(0),
            PageRef::Backed(page) => {
                let data = page.read();
                dst.copy_from_slice(&data[offset..offset + dst.len()]);
            }
        }
    }

    /// Copy `src` into the page at `offset`. A no-op for the zero page.
    pub fn copy_in(&self, offset: usize, src: &[u8]) {
        if let PageRef::Backed(page) = self {
            let mut data = page.write();
            data[offset..offset + src.len()].copy_from_slice(src);
        }
    }

    /// Length of the longest prefix of `expected` equal to the page bytes at `offset`
    pub fn common_prefix(&self, offset: usize, expected: &[u8]) -> usize {
        match self {
            PageRef::Zero => expected.iter().take_while(|&&b| b == 0).count(),
            PageRef::Backed(page) => {
                let data = page.read();
                data[offset..offset + expected.len()]
                    .iter()
                    .zip(expected)
                    .take_while(|(a, b)| a == b)
                    .count()
            }
        }
    }
}

/// Provisioning state of a single page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Never touched, or released
    Unmapped,

    /// Provisioned and charged, but without backing bytes; reads as zero
    Anchored,

    /// Owns a real buffer
    Allocated,
}

/// How a page is being admitted into the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Read-only lookup, never allocates
    Read,

    /// Allocate backing bytes if needed
    Write,

    /// Charge capacity without backing bytes
    Anchor,
}
