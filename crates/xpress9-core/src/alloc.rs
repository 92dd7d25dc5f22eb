//! Allocation capability for window and staging buffers
//!
//! The decoder never allocates its large buffers directly. It asks the
//! [`BlockAllocator`] it was created with, and hands every buffer back to the
//! same allocator on release, so arena or pool strategies can be plugged in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::{Error, Result};

/// Allocate/release pair used for all decoder-owned byte buffers
pub trait BlockAllocator {
    /// Allocate a zero-filled buffer of exactly `len` bytes
    fn allocate(&self, len: usize) -> Result<Vec<u8>>;

    /// Return a buffer previously obtained from [`allocate`](Self::allocate)
    fn release(&self, buf: Vec<u8>);
}

/// Global-heap allocator with fallible reservation
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl BlockAllocator for SystemAllocator {
    fn allocate(&self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| Error::AllocationFailed { requested: len })?;
        buf.resize(len, 0);
        Ok(buf)
    }

    fn release(&self, buf: Vec<u8>) {
        drop(buf);
    }
}

/// Allocator that refuses to hold more than `limit` bytes at once
///
/// Clones share the same accounting, so a caller can keep a handle and
/// observe what a decoder still holds.
#[derive(Debug, Clone)]
pub struct BudgetAllocator {
    limit: usize,
    in_use: Arc<AtomicUsize>,
}

impl BudgetAllocator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            in_use: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Bytes currently handed out
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    /// Configured byte budget
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl BlockAllocator for BudgetAllocator {
    fn allocate(&self, len: usize) -> Result<Vec<u8>> {
        let reserved = self
            .in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(len).filter(|&total| total <= self.limit)
            });
        if reserved.is_err() {
            return Err(Error::AllocationFailed { requested: len });
        }

        match SystemAllocator.allocate(len) {
            Ok(buf) => Ok(buf),
            Err(e) => {
                self.in_use.fetch_sub(len, Ordering::AcqRel);
                Err(e)
            }
        }
    }

    fn release(&self, buf: Vec<u8>) {
        self.in_use.fetch_sub(buf.len(), Ordering::AcqRel);
    }
}
