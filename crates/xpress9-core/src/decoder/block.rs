//! Decode state of one attached block
//!
//! Everything needed to pause and resume lives here: the bit reader
//! position, the recent-offset list, a partially copied match and the
//! running content checksum. A fill call stops exactly when the destination
//! is full, so no byte is emitted twice or skipped.

use crate::bitstream::{BitReader, BitState};
use crate::config::DecoderFlags;
use crate::entropy::{BlockTables, LEN_HEADERS};
use crate::frame::{BlockHeader, HEADER_SIZE};
use crate::lz::{slot_base, PendingCopy, RecentOffsets, Window};
use crate::{Corruption, Error, Result};

/// Extended length symbol that escapes to 16 raw bits
const LENGTH_ESCAPE: u32 = 255;

/// Identity of the caller's buffer, checked again on detach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockId {
    addr: usize,
    len: usize,
}

impl BlockId {
    pub(crate) fn of(src: &[u8]) -> Self {
        Self {
            addr: src.as_ptr() as usize,
            len: src.len(),
        }
    }
}

/// One decoded token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(u8),
    Match { offset: u32, length: u32 },
}

/// A block bound to the decoder between attach and detach
#[derive(Debug)]
pub(crate) struct ActiveBlock {
    /// Allocator-owned copy of the whole block, header included
    staging: Vec<u8>,
    id: BlockId,
    header: BlockHeader,
    /// `None` for stored blocks
    tables: Option<BlockTables>,
    bits: BitState,
    recent: RecentOffsets,
    pending: Option<PendingCopy>,
    produced: u64,
    crc: u32,
    finished: bool,
    poisoned: Option<Corruption>,
}

impl ActiveBlock {
    /// Validate a block and read its tables, without copying it yet
    pub(crate) fn prepare(src: &[u8], decoder_window_log2: u8) -> Result<Prepared> {
        let header = BlockHeader::parse(src)?;
        header.check_payload(src)?;
        if header.window_log2 > decoder_window_log2 {
            return Err(Corruption::WindowTooLarge {
                block: header.window_log2,
                decoder: decoder_window_log2,
            }
            .into());
        }

        let mut bits = BitState::default();
        let tables = if header.is_stored() {
            None
        } else {
            let mut reader = BitReader::new(&src[HEADER_SIZE..], &mut bits);
            Some(BlockTables::read(&mut reader)?)
        };

        Ok(Prepared {
            header,
            tables,
            bits,
        })
    }

    /// Bind a prepared block to its staging copy
    pub(crate) fn new(prepared: Prepared, staging: Vec<u8>, id: BlockId) -> Self {
        Self {
            staging,
            id,
            header: prepared.header,
            tables: prepared.tables,
            bits: prepared.bits,
            recent: RecentOffsets::default(),
            pending: None,
            produced: 0,
            crc: 0,
            finished: false,
            poisoned: None,
        }
    }

    pub(crate) fn id(&self) -> BlockId {
        self.id
    }

    pub(crate) fn header(&self) -> &BlockHeader {
        &self.header
    }

    /// Bytes of the block not yet emitted
    pub(crate) fn remaining(&self) -> u64 {
        self.header.original_size as u64 - self.produced
    }

    /// All bytes emitted and the final checks passed
    pub(crate) fn is_complete(&self) -> bool {
        self.finished && self.poisoned.is_none()
    }

    pub(crate) fn poisoned(&self) -> Option<&Corruption> {
        self.poisoned.as_ref()
    }

    pub(crate) fn into_staging(self) -> Vec<u8> {
        self.staging
    }

    /// Decode into `dst` until it is full or the block ends
    ///
    /// A failure poisons the block: every later call reports the same
    /// corruption without touching the window again.
    pub(crate) fn fill(
        &mut self,
        window: &mut Window,
        dst: &mut [u8],
        flags: DecoderFlags,
    ) -> Result<usize> {
        if let Some(c) = &self.poisoned {
            return Err(c.clone().into());
        }

        let result = self.fill_inner(window, dst, flags);
        if let Err(Error::CorruptInput(c)) = &result {
            self.poisoned = Some(c.clone());
        }
        result
    }

    fn fill_inner(
        &mut self,
        window: &mut Window,
        dst: &mut [u8],
        flags: DecoderFlags,
    ) -> Result<usize> {
        let written = if self.header.is_stored() {
            self.fill_stored(window, dst)
        } else {
            self.fill_coded(window, dst)?
        };

        if self.header.has_checksum() && flags.contains(DecoderFlags::VERIFY_CHECKSUM) {
            self.crc = crc32c::crc32c_append(self.crc, &dst[..written]);
        }

        if !self.finished && self.remaining() == 0 && self.pending.is_none() {
            self.finished = true;
            self.finish(flags)?;
        }

        Ok(written)
    }

    fn fill_stored(&mut self, window: &mut Window, dst: &mut [u8]) -> usize {
        let start = HEADER_SIZE + self.produced as usize;
        let n = dst.len().min(self.remaining() as usize);
        let src = &self.staging[start..start + n];
        dst[..n].copy_from_slice(src);
        window.extend(src);
        self.produced += n as u64;
        n
    }

    fn fill_coded(&mut self, window: &mut Window, dst: &mut [u8]) -> Result<usize> {
        let ActiveBlock {
            staging,
            header,
            tables,
            bits,
            recent,
            pending,
            produced,
            ..
        } = self;
        let tables = match tables {
            Some(tables) => tables,
            None => return Ok(0),
        };
        let mut reader = BitReader::new(&staging[HEADER_SIZE..], bits);
        let original = header.original_size as u64;
        let mut written = 0;

        while written < dst.len() {
            if let Some(copy) = pending.as_mut() {
                let n = copy.remaining.min(dst.len() - written);
                window.copy_match(copy.offset, &mut dst[written..written + n]);
                written += n;
                *produced += n as u64;
                copy.remaining -= n;
                if copy.remaining == 0 {
                    *pending = None;
                }
                continue;
            }

            if *produced == original {
                break;
            }

            match next_token(&mut reader, tables, header, recent)? {
                Token::Literal(byte) => {
                    dst[written] = byte;
                    window.push(byte);
                    written += 1;
                    *produced += 1;
                }
                Token::Match { offset, length } => {
                    let left = original - *produced;
                    if length as u64 > left {
                        return Err(Corruption::MatchOverrun {
                            length: length as u64,
                            remaining: left,
                        }
                        .into());
                    }
                    window.check_offset(offset as u64, header.window_size())?;
                    *pending = Some(PendingCopy {
                        offset: offset as usize,
                        remaining: length as usize,
                    });
                }
            }
        }

        Ok(written)
    }

    /// Checks run once, right after the last byte is produced
    fn finish(&self, flags: DecoderFlags) -> Result<()> {
        if flags.contains(DecoderFlags::STRICT_PAYLOAD) && !self.header.is_stored() {
            let payload = self.staging.len() - HEADER_SIZE;
            let left = payload.saturating_sub(self.bits.bytes_consumed());
            if left > 0 {
                return Err(Corruption::TrailingPayload(left).into());
            }
        }

        if self.header.has_checksum() && flags.contains(DecoderFlags::VERIFY_CHECKSUM) {
            let expected = self.header.content_crc;
            if self.crc != expected {
                return Err(Corruption::ChecksumMismatch {
                    expected,
                    actual: self.crc,
                }
                .into());
            }
        }

        Ok(())
    }
}

/// A validated block whose tables have been read
#[derive(Debug)]
pub(crate) struct Prepared {
    pub(crate) header: BlockHeader,
    tables: Option<BlockTables>,
    bits: BitState,
}

/// Decode the next literal or match from the bitstream
fn next_token(
    reader: &mut BitReader<'_>,
    tables: &BlockTables,
    header: &BlockHeader,
    recent: &mut RecentOffsets,
) -> Result<Token> {
    let symbol = tables.main.decode(reader)? as usize;
    if symbol < 256 {
        return Ok(Token::Literal(symbol as u8));
    }

    let code = symbol - 256;
    let len_header = code % LEN_HEADERS;
    let category = code / LEN_HEADERS;

    let mut length = header.min_match as u32 + len_header as u32;
    if len_header == LEN_HEADERS - 1 {
        let extra = tables.length.decode(reader)? as u32;
        length += if extra == LENGTH_ESCAPE {
            LENGTH_ESCAPE + reader.read_bits(16)?
        } else {
            extra
        };
    }

    let mtf_slots = header.mtf_slots as usize;
    let offset = if category < mtf_slots {
        recent.promote(category)
    } else {
        let slot = (category - mtf_slots) as u32;
        if slot > header.window_log2 as u32 {
            return Err(Corruption::OffsetSlot {
                slot,
                window_log2: header.window_log2,
            }
            .into());
        }
        let offset = slot_base(slot) + reader.read_bits(slot)?;
        recent.push(offset);
        offset
    };

    Ok(Token::Match { offset, length })
}
