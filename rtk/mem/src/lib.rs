#![no_std]
#![allow(unsafe_code)] // Memory pools hand out raw blocks

//! # RTK Memory Management
//!
//! Fixed-block static memory pools. Every pool owns its backing array, so
//! allocation never touches a heap and runs in constant time.

pub mod boxed;
pub mod pool;

pub use boxed::PoolBox;
pub use pool::StaticPool;

/// Memory pool statistics for debugging and monitoring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of blocks in the pool
    pub total_blocks: usize,
    /// Number of free blocks currently available
    pub free_blocks: usize,
    /// Number of blocks currently in use
    pub used_blocks: usize,
    /// Minimum number of free blocks ever reached
    pub min_free_blocks: usize,
}

impl PoolStats {
    /// Get utilization as a percentage (0-100)
    pub fn utilization(&self) -> u8 {
        if self.total_blocks == 0 {
            0
        } else {
            ((self.used_blocks * 100) / self.total_blocks) as u8
        }
    }

    /// Peak utilization as a percentage (0-100)
    pub fn peak_utilization(&self) -> u8 {
        if self.total_blocks == 0 {
            0
        } else {
            (((self.total_blocks - self.min_free_blocks) * 100) / self.total_blocks) as u8
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for PoolStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "PoolStats{{ total: {}, free: {}, used: {}, min_free: {} }}",
            self.total_blocks,
            self.free_blocks,
            self.used_blocks,
            self.min_free_blocks
        );
    }
}
