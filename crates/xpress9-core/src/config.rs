//! Decoder configuration

use bitflags::bitflags;

use crate::{Error, Result};

/// Smallest supported window exponent (64 KiB)
pub const WINDOW_LOG2_MIN: u8 = 16;

/// Largest supported window exponent (4 MiB)
pub const WINDOW_LOG2_MAX: u8 = 22;

bitflags! {
    /// Decoder behaviour flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DecoderFlags: u32 {
        /// Verify the content CRC-32C when a block carries one
        const VERIFY_CHECKSUM = 0b0000_0001;
        /// Reject payload bytes left over after the final token
        const STRICT_PAYLOAD = 0b0000_0010;
    }
}

impl Default for DecoderFlags {
    fn default() -> Self {
        DecoderFlags::VERIFY_CHECKSUM
    }
}

/// Decoder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Window exponent; the window holds `2^window_log2` bytes
    pub window_log2: u8,
    /// Behaviour flags
    pub flags: DecoderFlags,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            window_log2: WINDOW_LOG2_MAX,
            flags: DecoderFlags::default(),
        }
    }
}

impl DecoderConfig {
    /// Create a configuration for the given window exponent
    pub fn new(window_log2: u8, flags: DecoderFlags) -> Self {
        Self { window_log2, flags }
    }

    /// Check the window exponent against the supported range
    pub fn validate(&self) -> Result<()> {
        if !(WINDOW_LOG2_MIN..=WINDOW_LOG2_MAX).contains(&self.window_log2) {
            return Err(Error::ConfigInvalid(format!(
                "window log2 {} outside {}..={}",
                self.window_log2, WINDOW_LOG2_MIN, WINDOW_LOG2_MAX
            )));
        }
        Ok(())
    }

    /// Window size in bytes
    pub fn window_size(&self) -> usize {
        1usize << self.window_log2
    }
}
