//! Configuration for RamLUN
//!
//! Centralized LUN configuration with sensible defaults, plus the normalized
//! [`Geometry`] every other component works in.

use crate::error::{LunError, Result};

/// Smallest page that still yields a tree fan-out of two.
const MIN_PAGE_SIZE: u32 = 2 * std::mem::size_of::<usize>() as u32;

/// Main configuration for a RamLUN instance
#[derive(Debug, Clone)]
pub struct LunConfig {
    // -------------------------------------------------------------------------
    // Geometry
    // -------------------------------------------------------------------------
    /// Logical block size in bytes
    pub block_size: u32,

    /// Backing page size in bytes (power-of-two multiple of `block_size`)
    pub page_size: u32,

    /// Logical size of the LUN in bytes. Zero means "same as capacity" for a
    /// ramdisk; a black hole needs an explicit size.
    pub size_bytes: u64,

    // -------------------------------------------------------------------------
    // Provisioning
    // -------------------------------------------------------------------------
    /// Ramdisk (thin-provisioned) or black hole (discard sink)
    pub personality: Personality,

    // -------------------------------------------------------------------------
    // Transfer Engine
    // -------------------------------------------------------------------------
    /// Most scatter/gather segments described in one data-mover call
    pub max_segments: usize,

    /// Threads draining the continuation queue
    pub worker_threads: usize,

    // -------------------------------------------------------------------------
    // Identification
    // -------------------------------------------------------------------------
    pub serial_number: String,
    pub device_id: String,
}

/// What the LUN does with the bytes written to it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Personality {
    /// Lazily allocated memory, capped at `capacity_bytes`
    Ramdisk { capacity_bytes: u64 },

    /// Accepts every write, retains nothing, reads back zeros
    BlackHole,
}

impl Default for LunConfig {
    fn default() -> Self {
        Self {
            block_size: 512,
            page_size: 4096,
            size_bytes: 0,
            personality: Personality::Ramdisk {
                capacity_bytes: 64 * 1024 * 1024, // 64 MB
            },
            max_segments: 32,
            worker_threads: 4,
            serial_number: "RAMLUN0000".to_string(),
            device_id: "ramlun0".to_string(),
        }
    }
}

impl LunConfig {
    /// Create a new config builder
    pub fn builder() -> LunConfigBuilder {
        LunConfigBuilder::default()
    }

    /// Check the configuration and derive the normalized geometry.
    ///
    /// Capacity is rounded up to whole pages, size down to whole blocks.
    pub fn validate(&self) -> Result<(Geometry, Personality)> {
        if self.block_size == 0 {
            return Err(LunError::InvalidConfig("block size must be non-zero".into()));
        }
        if self.page_size < MIN_PAGE_SIZE || self.page_size < self.block_size {
            return Err(LunError::InvalidConfig(format!(
                "page size {} must be at least {} and at least the block size {}",
                self.page_size, MIN_PAGE_SIZE, self.block_size
            )));
        }
        if self.page_size % self.block_size != 0
            || !(self.page_size / self.block_size).is_power_of_two()
        {
            return Err(LunError::InvalidConfig(format!(
                "page size {} is not a power-of-two multiple of block size {}",
                self.page_size, self.block_size
            )));
        }
        if self.max_segments == 0 {
            return Err(LunError::InvalidConfig("max_segments must be non-zero".into()));
        }
        let blocks_per_page = u64::from(self.page_size / self.block_size);
        if u64::try_from(self.max_segments)
            .ok()
            .and_then(|segments| segments.checked_mul(blocks_per_page))
            .is_none()
        {
            return Err(LunError::InvalidConfig(format!(
                "max_segments {} overflows the chunk size",
                self.max_segments
            )));
        }
        if self.worker_threads == 0 {
            return Err(LunError::InvalidConfig("worker_threads must be non-zero".into()));
        }

        let page_size = u64::from(self.page_size);
        let personality = match self.personality {
            Personality::Ramdisk { capacity_bytes } => {
                if capacity_bytes == 0 {
                    return Err(LunError::InvalidConfig(
                        "ramdisk capacity must be non-zero; use Personality::BlackHole for a discard sink"
                            .into(),
                    ));
                }
                Personality::Ramdisk {
                    capacity_bytes: capacity_bytes.div_ceil(page_size) * page_size,
                }
            }
            Personality::BlackHole => Personality::BlackHole,
        };

        let size_bytes = match (self.size_bytes, personality) {
            (0, Personality::Ramdisk { capacity_bytes }) => capacity_bytes,
            (0, Personality::BlackHole) => {
                return Err(LunError::InvalidConfig("black hole LUN needs an explicit size".into()));
            }
            (size, _) => size,
        };
        let size_blocks = size_bytes / u64::from(self.block_size);
        if size_blocks == 0 {
            return Err(LunError::InvalidConfig(format!(
                "LUN size {} is smaller than the block size {}",
                size_bytes, self.block_size
            )));
        }

        Ok((Geometry::new(self.block_size, self.page_size, size_blocks), personality))
    }
}

/// Builder for LunConfig
#[derive(Default)]
pub struct LunConfigBuilder {
    config: LunConfig,
}

impl LunConfigBuilder {
    /// Set the logical block size (in bytes)
    pub fn block_size(mut self, size: u32) -> Self {
        self.config.block_size = size;
        self
    }

    /// Set the backing page size (in bytes)
    pub fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the logical LUN size (in bytes)
    pub fn size_bytes(mut self, size: u64) -> Self {
        self.config.size_bytes = size;
        self
    }

    /// Thin-provisioned ramdisk capped at `capacity_bytes`
    pub fn ramdisk(mut self, capacity_bytes: u64) -> Self {
        self.config.personality = Personality::Ramdisk { capacity_bytes };
        self
    }

    /// Discard sink
    pub fn black_hole(mut self) -> Self {
        self.config.personality = Personality::BlackHole;
        self
    }

    /// Set the maximum number of segments per data-mover call
    pub fn max_segments(mut self, count: usize) -> Self {
        self.config.max_segments = count;
        self
    }

    /// Set the number of continuation worker threads
    pub fn worker_threads(mut self, count: usize) -> Self {
        self.config.worker_threads = count;
        self
    }

    pub fn serial_number(mut self, serial: impl Into<String>) -> Self {
        self.config.serial_number = serial.into();
        self
    }

    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.config.device_id = id.into();
        self
    }

    pub fn build(self) -> LunConfig {
        self.config
    }
}

// =============================================================================
// Geometry
// =============================================================================

/// Normalized block/page layout of a LUN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Logical block size in bytes
    pub block_size: u32,

    /// Backing page size in bytes
    pub page_size: u32,

    /// Blocks per page (power of two)
    pub blocks_per_page: u64,

    /// log2(blocks_per_page)
    pub page_shift: u32,

    /// Logical size in blocks
    pub size_blocks: u64,
}

impl Geometry {
    pub(crate) fn new(block_size: u32, page_size: u32, size_blocks: u64) -> Self {
        let blocks_per_page = u64::from(page_size / block_size);
        Self {
            block_size,
            page_size,
            blocks_per_page,
            page_shift: blocks_per_page.trailing_zeros(),
            size_blocks,
        }
    }

    /// Page holding `lba`
    pub fn page_of(&self, lba: u64) -> u64 {
        lba >> self.page_shift
    }

    /// Block index of `lba` inside its page
    pub fn offset_in_page(&self, lba: u64) -> u64 {
        lba & (self.blocks_per_page - 1)
    }

    /// Number of pages needed to back `size_blocks`
    pub fn total_pages(&self) -> u64 {
        self.size_blocks.div_ceil(self.blocks_per_page)
    }

    /// Size of `blocks` blocks in bytes
    pub fn bytes(&self, blocks: u64) -> usize {
        (blocks * u64::from(self.block_size)) as usize
    }

    /// Reject ranges that run past the end of the LUN
    pub fn check_range(&self, lba: u64, blocks: u64) -> Result<()> {
        match lba.checked_add(blocks) {
            Some(end) if end <= self.size_blocks => Ok(()),
            _ => Err(LunError::LbaOutOfRange {
                lba,
                blocks,
                size_blocks: self.size_blocks,
            }),
        }
    }
}
