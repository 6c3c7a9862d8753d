//! Provisioning status and capacity attributes

use crate::error::{LunError, Result};
use crate::store::PageState;

use super::Lun;

/// Provisioning status of a run of blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStatus {
    /// Backed by memory
    Mapped,

    /// Not provisioned; reads as zero
    Deallocated,

    /// Provisioned without backing memory; reads as zero
    Anchored,
}

impl From<PageState> for ProvisioningStatus {
    fn from(state: PageState) -> Self {
        match state {
            PageState::Allocated => ProvisioningStatus::Mapped,
            PageState::Unmapped => ProvisioningStatus::Deallocated,
            PageState::Anchored => ProvisioningStatus::Anchored,
        }
    }
}

/// One LBA status descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LbaStatus {
    pub lba: u64,

    /// Consecutive blocks from `lba` sharing `status`
    pub blocks: u64,

    pub status: ProvisioningStatus,
}

/// Capacity counters exported to the target framework
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LunAttributes {
    /// Blocks charged against capacity; `None` for the black hole
    pub blocks_used: Option<u64>,

    /// Blocks still available; `None` for the black hole
    pub blocks_available: Option<u64>,
}

impl Lun {
    /// Status of `lba` and how many following blocks share it
    pub fn lba_status(&self, lba: u64) -> Result<LbaStatus> {
        let _guard = self.quiesce.enter().ok_or(LunError::ShuttingDown)?;
        let geometry = self.geometry();
        geometry.check_range(lba, 1)?;

        let first = geometry.page_of(lba);
        let status = ProvisioningStatus::from(self.store.state(first));

        let total_pages = geometry.total_pages();
        let mut page = first + 1;
        if self.store.is_black_hole() {
            page = total_pages;
        }
        while page < total_pages && ProvisioningStatus::from(self.store.state(page)) == status {
            page += 1;
        }

        let end = (page << geometry.page_shift).min(geometry.size_blocks);
        Ok(LbaStatus {
            lba,
            blocks: end - lba,
            status,
        })
    }

    /// `blocksused` / `blocksavail`, derived from the capacity ledger
    pub fn attributes(&self) -> LunAttributes {
        let block_size = u64::from(self.block_size());
        match self.store.usage() {
            Some(usage) => LunAttributes {
                blocks_used: Some(usage.used_bytes / block_size),
                blocks_available: Some((usage.limit_bytes - usage.used_bytes) / block_size),
            },
            None => LunAttributes {
                blocks_used: None,
                blocks_available: None,
            },
        }
    }

    /// Attribute lookup by name, as the target framework asks for them
    pub fn attribute(&self, name: &str) -> Option<u64> {
        let attributes = self.attributes();
        match name {
            "blocksused" => attributes.blocks_used,
            "blocksavail" => attributes.blocks_available,
            _ => None,
        }
    }
}
