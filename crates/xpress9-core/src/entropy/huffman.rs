//! Canonical Huffman decoding table
//!
//! Codes are assigned canonically (shorter codes first, ties by symbol
//! order) and appear in the bitstream most significant code bit first. A
//! direct lookup table resolves codes up to [`LOOKUP_BITS`] long; longer
//! codes fall back to a canonical walk over the per-length counts.

use crate::bitstream::BitReader;
use crate::{Corruption, Result};

/// Longest code length the format allows
pub const MAX_CODE_LEN: usize = 15;

/// Width of the direct lookup table
pub const LOOKUP_BITS: u32 = 10;

/// Huffman decoding table
#[derive(Debug, Clone)]
pub struct HuffmanTable {
    /// Indexed by the next `LOOKUP_BITS` stream bits: `symbol << 4 | length`,
    /// zero when the code is longer than the table or unassigned
    lookup: Vec<u32>,
    /// Number of codes of each length
    counts: [u16; MAX_CODE_LEN + 1],
    /// Symbols ordered by canonical code
    symbols: Vec<u16>,
    max_len: u32,
}

impl HuffmanTable {
    /// Build a table from per-symbol code lengths (0 = symbol unused)
    ///
    /// Over-subscribed length sets are rejected. Incomplete sets are
    /// accepted; reading an unassigned code fails at decode time.
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let mut counts = [0u16; MAX_CODE_LEN + 1];
        for &len in lengths {
            if len as usize > MAX_CODE_LEN {
                return Err(Corruption::BadCodeLengths("code length above 15").into());
            }
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        let mut left: i32 = 1;
        for len in 1..=MAX_CODE_LEN {
            left <<= 1;
            left -= counts[len] as i32;
            if left < 0 {
                return Err(Corruption::BadCodeLengths("over-subscribed code").into());
            }
        }

        let mut offsets = [0u16; MAX_CODE_LEN + 2];
        for len in 1..=MAX_CODE_LEN {
            offsets[len + 1] = offsets[len] + counts[len];
        }

        let mut symbols = vec![0u16; offsets[MAX_CODE_LEN + 1] as usize];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let slot = &mut offsets[len as usize];
                symbols[*slot as usize] = symbol as u16;
                *slot += 1;
            }
        }

        let max_len = (1..=MAX_CODE_LEN)
            .rev()
            .find(|&len| counts[len] != 0)
            .unwrap_or(0) as u32;

        let mut lookup = vec![0u32; 1 << LOOKUP_BITS];
        let mut next_code = [0u32; MAX_CODE_LEN + 1];
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LEN {
            code = (code + counts[len - 1] as u32) << 1;
            next_code[len] = code;
        }
        for (symbol, &len) in lengths.iter().enumerate() {
            let len = len as u32;
            if len == 0 {
                continue;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            if len > LOOKUP_BITS {
                continue;
            }
            let entry = ((symbol as u32) << 4) | len;
            let mut index = reverse_bits(code, len) as usize;
            while index < lookup.len() {
                lookup[index] = entry;
                index += 1 << len;
            }
        }

        Ok(Self {
            lookup,
            counts,
            symbols,
            max_len,
        })
    }

    /// Decode one symbol
    pub fn decode(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        let entry = self.lookup[reader.peek(LOOKUP_BITS) as usize];
        if entry != 0 {
            reader.consume(entry & 0xF)?;
            return Ok((entry >> 4) as u16);
        }
        self.decode_slow(reader)
    }

    fn decode_slow(&self, reader: &mut BitReader<'_>) -> Result<u16> {
        let bits = reader.peek(MAX_CODE_LEN as u32);
        let mut code = 0u32;
        let mut first = 0u32;
        let mut index = 0u32;

        for len in 1..=self.max_len {
            code |= (bits >> (len - 1)) & 1;
            let count = self.counts[len as usize] as u32;
            if code < first + count {
                reader.consume(len)?;
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }

        // An unassigned pattern that runs off the end of the payload is
        // reported as truncation rather than a bad code.
        if reader.remaining_bits() < self.max_len as u64 {
            return Err(Corruption::Truncated.into());
        }
        Err(Corruption::InvalidCode.into())
    }

    /// True when no symbol has a code
    pub fn is_empty(&self) -> bool {
        self.max_len == 0
    }
}

/// Reverse the low `len` bits of `code`
#[inline]
pub fn reverse_bits(code: u32, len: u32) -> u32 {
    if len == 0 {
        return 0;
    }
    code.reverse_bits() >> (32 - len)
}
