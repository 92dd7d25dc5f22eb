//! Sliding window and back-reference resolution
//!
//! The window is a power-of-two ring buffer holding the most recent output
//! of the session. Matches are copied forward one byte at a time through the
//! ring, so an offset shorter than the match length repeats the pattern.

use crate::{Corruption, Result};

/// Sliding window over decompressed output
#[derive(Debug)]
pub struct Window {
    buf: Vec<u8>,
    mask: usize,
    /// Next write position in `buf`
    pos: usize,
    /// Bytes written since the last reset
    total: u64,
}

impl Window {
    /// Wrap a buffer whose length is a power of two
    pub fn new(buf: Vec<u8>) -> Self {
        debug_assert!(buf.len().is_power_of_two());
        let mask = buf.len() - 1;
        Self {
            buf,
            mask,
            pos: 0,
            total: 0,
        }
    }

    /// Forget all history
    ///
    /// Stale bytes stay in the buffer; `check_offset` keeps them unreachable.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.total = 0;
    }

    pub fn size(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written since the last reset
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Current write offset into the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// How far back a reference may reach right now
    pub fn history(&self) -> u64 {
        self.total.min(self.buf.len() as u64)
    }

    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.buf[self.pos] = byte;
        self.pos = (self.pos + 1) & self.mask;
        self.total += 1;
    }

    /// Append literal bytes
    pub fn extend(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// Check that `offset` can be resolved within `limit` bytes of history
    pub fn check_offset(&self, offset: u64, limit: u64) -> Result<()> {
        let available = self.history().min(limit);
        if offset == 0 || offset > available {
            return Err(Corruption::OffsetOutOfRange { offset, available }.into());
        }
        Ok(())
    }

    /// Copy `out.len()` bytes starting `offset` bytes back, into both `out`
    /// and the window
    ///
    /// The offset must have passed [`check_offset`](Self::check_offset).
    #[inline]
    pub fn copy_match(&mut self, offset: usize, out: &mut [u8]) {
        let mut src = self.pos.wrapping_sub(offset) & self.mask;
        for slot in out.iter_mut() {
            let byte = self.buf[src];
            *slot = byte;
            self.buf[self.pos] = byte;
            self.pos = (self.pos + 1) & self.mask;
            src = (src + 1) & self.mask;
        }
        self.total += out.len() as u64;
    }

    /// Logical window content, oldest byte first
    pub fn contents(&self) -> Vec<u8> {
        let len = self.history() as usize;
        let start = self.pos.wrapping_sub(len) & self.mask;
        (0..len).map(|i| self.buf[(start + i) & self.mask]).collect()
    }

    /// Take the buffer out, for release to its allocator
    ///
    /// The window is unusable afterwards.
    pub fn take_buffer(&mut self) -> Vec<u8> {
        self.pos = 0;
        self.total = 0;
        std::mem::take(&mut self.buf)
    }
}

/// Back-reference still being copied when the destination filled up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCopy {
    pub offset: usize,
    pub remaining: usize,
}

/// Move-to-front list of recently used offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentOffsets {
    slots: [u32; 4],
}

impl Default for RecentOffsets {
    fn default() -> Self {
        Self { slots: [1, 2, 3, 4] }
    }
}

impl RecentOffsets {
    /// Use the offset at `index`, moving it to the front
    pub fn promote(&mut self, index: usize) -> u32 {
        let offset = self.slots[index];
        self.slots.copy_within(0..index, 1);
        self.slots[0] = offset;
        offset
    }

    /// Record a newly coded offset at the front
    pub fn push(&mut self, offset: u32) {
        self.slots.copy_within(0..3, 1);
        self.slots[0] = offset;
    }

    /// Index of `offset` among the first `limit` slots
    pub fn find(&self, offset: u32, limit: usize) -> Option<usize> {
        self.slots[..limit].iter().position(|&o| o == offset)
    }
}

/// Slot of an explicitly coded offset: the position of its top bit
#[inline]
pub fn offset_slot(offset: u32) -> u32 {
    31 - offset.leading_zeros()
}

/// Smallest offset coded by `slot`; `slot` extra bits follow
#[inline]
pub fn slot_base(slot: u32) -> u32 {
    1 << slot
}
