//! Block header of the provisional container layout
//!
//! This layout is not the historical XPress9 bitstream and does not decode
//! data produced by other XPress9 implementations. It stands in until the
//! historical tables are available, and is confined to this module,
//! `entropy` and `decoder::block`.
//!
//! ```text
//! ┌───────┬─────┬───────┬────────┬────────┬──────────┬─────────┬──────────┬────────────┐
//! │ Magic │ Ver │ Flags │ Window │ Params │ Original │ Payload │ Content  │ Header     │
//! │ "XPR9"│     │       │ log2   │ mtf|mm │ size     │ size    │ CRC-32C  │ CRC-32C    │
//! │ 4     │ 1   │ 1     │ 1      │ 1      │ 4        │ 4       │ 4        │ 4          │
//! └───────┴─────┴───────┴────────┴────────┴──────────┴─────────┴──────────┴────────────┘
//! ```
//!
//! All integers are little-endian. `Params` keeps the number of recent-offset
//! slots in the low nibble and the minimum match length in the high nibble.
//! The header CRC covers the first 20 bytes.

use bitflags::bitflags;

use crate::config::{WINDOW_LOG2_MAX, WINDOW_LOG2_MIN};
use crate::{Corruption, Result};

/// Magic bytes of the provisional layout: "XPR9"
///
/// Not a historical XPress9 signature.
pub const MAGIC: [u8; 4] = *b"XPR9";

/// Current block format version
pub const VERSION: u8 = 1;

/// Encoded header length
pub const HEADER_SIZE: usize = 24;

/// Most recent-offset slots a block may use
pub const MAX_MTF_SLOTS: u8 = 4;

/// Accepted minimum match lengths
pub const MIN_MATCH_RANGE: std::ops::RangeInclusive<u8> = 2..=4;

bitflags! {
    /// Block flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u8 {
        /// CRC-32C of the decompressed content is present
        const CHECKSUM = 0b0000_0001;
        /// Payload holds the original bytes without entropy coding
        const STORED = 0b0000_0010;
    }
}

/// Parsed block header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub flags: BlockFlags,
    pub window_log2: u8,
    pub mtf_slots: u8,
    pub min_match: u8,
    pub original_size: u32,
    pub payload_size: u32,
    pub content_crc: u32,
}

impl BlockHeader {
    /// Parse and validate a header from the start of `buf`
    ///
    /// Only the header itself is checked here; the payload length is checked
    /// against the actual block by [`check_payload`](Self::check_payload).
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Corruption::HeaderTruncated(buf.len()).into());
        }

        let magic = [buf[0], buf[1], buf[2], buf[3]];
        if magic != MAGIC {
            return Err(Corruption::BadMagic(magic).into());
        }

        let stored = read_u32(buf, 20);
        let computed = crc32c::crc32c(&buf[..20]);
        if stored != computed {
            return Err(Corruption::HeaderChecksum { stored, computed }.into());
        }

        let version = buf[4];
        if version != VERSION {
            return Err(Corruption::UnsupportedVersion(version).into());
        }

        let flags = BlockFlags::from_bits(buf[5]).ok_or(Corruption::UnknownFlags(buf[5]))?;

        let window_log2 = buf[6];
        if !(WINDOW_LOG2_MIN..=WINDOW_LOG2_MAX).contains(&window_log2) {
            return Err(Corruption::BadParameters("window log2 out of range").into());
        }

        let mtf_slots = buf[7] & 0x0F;
        let min_match = buf[7] >> 4;
        if mtf_slots > MAX_MTF_SLOTS {
            return Err(Corruption::BadParameters("too many recent-offset slots").into());
        }
        if !MIN_MATCH_RANGE.contains(&min_match) {
            return Err(Corruption::BadParameters("minimum match length out of range").into());
        }

        let header = Self {
            flags,
            window_log2,
            mtf_slots,
            min_match,
            original_size: read_u32(buf, 8),
            payload_size: read_u32(buf, 12),
            content_crc: read_u32(buf, 16),
        };

        if header.is_stored() && header.payload_size != header.original_size {
            return Err(Corruption::BadParameters("stored block size mismatch").into());
        }

        Ok(header)
    }

    /// Check the declared payload size against a whole block
    pub fn check_payload(&self, block: &[u8]) -> Result<()> {
        let actual = block.len().saturating_sub(HEADER_SIZE);
        let declared = self.payload_size as usize;
        if declared != actual {
            return Err(Corruption::PayloadLength { declared, actual }.into());
        }
        Ok(())
    }

    /// Serialize header to bytes, header CRC included
    pub fn serialize(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.push(self.flags.bits());
        buf.push(self.window_log2);
        buf.push((self.min_match << 4) | (self.mtf_slots & 0x0F));
        buf.extend_from_slice(&self.original_size.to_le_bytes());
        buf.extend_from_slice(&self.payload_size.to_le_bytes());
        buf.extend_from_slice(&self.content_crc.to_le_bytes());

        let crc = crc32c::crc32c(&buf[start..]);
        buf.extend_from_slice(&crc.to_le_bytes());
    }

    pub fn is_stored(&self) -> bool {
        self.flags.contains(BlockFlags::STORED)
    }

    pub fn has_checksum(&self) -> bool {
        self.flags.contains(BlockFlags::CHECKSUM)
    }

    /// Block window size in bytes
    pub fn window_size(&self) -> u64 {
        1u64 << self.window_log2
    }
}

#[inline]
fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}
