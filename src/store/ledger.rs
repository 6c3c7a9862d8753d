//! Capacity Ledger
//!
//! Counts bytes provisioned against the configured capacity. Always mutated
//! under the page tree's exclusive lock.

use crate::error::{LunError, Result};

/// Bytes charged against a fixed limit, one page at a time
#[derive(Debug, Clone)]
pub struct CapacityLedger {
    /// Configured capacity in bytes (a whole number of pages)
    limit: u64,

    /// Bytes currently charged
    used: u64,

    /// Charge granularity (page size)
    unit: u64,
}

impl CapacityLedger {
    pub fn new(limit: u64, unit: u64) -> Self {
        Self { limit, used: 0, unit }
    }

    /// Charge one page, failing without side effects when it would not fit
    pub fn charge(&mut self) -> Result<()> {
        if self.used + self.unit > self.limit {
            return Err(LunError::NoSpace {
                used: self.used,
                limit: self.limit,
            });
        }
        self.used += self.unit;
        Ok(())
    }

    /// Return `pages` pages to the pool
    pub fn uncharge(&mut self, pages: u64) {
        self.used = self.used.saturating_sub(pages * self.unit);
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn available(&self) -> u64 {
        self.limit - self.used
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }
}
