//! Entropy stage: Huffman tables and their transmitted code lengths
//!
//! A compressed block starts with a pre-tree (19 three-bit code lengths)
//! that codes the lengths of the main and length alphabets as one run:
//!
//! | symbol | meaning                                   |
//! |--------|-------------------------------------------|
//! | 0..=15 | literal code length                       |
//! | 16     | repeat previous length 3..=6 (2 bits)     |
//! | 17     | 3..=10 zero lengths (3 bits)              |
//! | 18     | 11..=138 zero lengths (7 bits)            |

pub mod huffman;

pub use huffman::{reverse_bits, HuffmanTable, MAX_CODE_LEN};

use crate::bitstream::BitReader;
use crate::config::WINDOW_LOG2_MAX;
use crate::frame::MAX_MTF_SLOTS;
use crate::{Corruption, Result};

/// Pre-tree alphabet size
pub const PRETREE_SYMBOLS: usize = 19;

/// Bits per transmitted pre-tree code length
pub const PRETREE_LEN_BITS: u32 = 3;

/// Length headers per offset category in the main alphabet
pub const LEN_HEADERS: usize = 16;

/// Offset categories: recent-offset slots followed by one slot per window bit
pub const OFFSET_CATEGORIES: usize = MAX_MTF_SLOTS as usize + WINDOW_LOG2_MAX as usize + 1;

/// Main alphabet: 256 literals, then match symbols
pub const MAIN_SYMBOLS: usize = 256 + LEN_HEADERS * OFFSET_CATEGORIES;

/// Extended match length alphabet
pub const LENGTH_SYMBOLS: usize = 256;

/// Huffman tables of one block
#[derive(Debug, Clone)]
pub struct BlockTables {
    pub main: HuffmanTable,
    pub length: HuffmanTable,
}

impl BlockTables {
    /// Read pre-tree and both alphabets from the start of a payload
    pub fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let mut pre_lengths = [0u8; PRETREE_SYMBOLS];
        for len in pre_lengths.iter_mut() {
            *len = reader.read_bits(PRETREE_LEN_BITS)? as u8;
        }
        let pretree = HuffmanTable::from_lengths(&pre_lengths)?;

        let lengths = read_code_lengths(reader, &pretree, MAIN_SYMBOLS + LENGTH_SYMBOLS)?;
        let (main, length) = lengths.split_at(MAIN_SYMBOLS);

        Ok(Self {
            main: HuffmanTable::from_lengths(main)?,
            length: HuffmanTable::from_lengths(length)?,
        })
    }
}

/// Decode `total` code lengths using the pre-tree
pub fn read_code_lengths(
    reader: &mut BitReader<'_>,
    pretree: &HuffmanTable,
    total: usize,
) -> Result<Vec<u8>> {
    let mut lengths = Vec::with_capacity(total);

    while lengths.len() < total {
        let symbol = pretree.decode(reader)?;
        let (value, run) = match symbol {
            0..=15 => (symbol as u8, 1),
            16 => {
                let previous = *lengths
                    .last()
                    .ok_or(Corruption::BadCodeLengths("repeat with no previous length"))?;
                (previous, 3 + reader.read_bits(2)? as usize)
            }
            17 => (0, 3 + reader.read_bits(3)? as usize),
            18 => (0, 11 + reader.read_bits(7)? as usize),
            _ => return Err(Corruption::BadCodeLengths("pre-tree symbol out of range").into()),
        };

        if lengths.len() + run > total {
            return Err(Corruption::BadCodeLengths("run overflows alphabet").into());
        }
        lengths.extend(std::iter::repeat(value).take(run));
    }

    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitState;
    use crate::Error;

    /// Minimal LSB-first writer for hand-built streams
    struct Bits {
        out: Vec<u8>,
        acc: u64,
        n: u32,
    }

    impl Bits {
        fn new() -> Self {
            Self { out: Vec::new(), acc: 0, n: 0 }
        }

        fn put(&mut self, value: u32, len: u32) {
            self.acc |= (value as u64) << self.n;
            self.n += len;
            while self.n >= 8 {
                self.out.push(self.acc as u8);
                self.acc >>= 8;
                self.n -= 8;
            }
        }

        fn code(&mut self, code: u32, len: u32) {
            self.put(reverse_bits(code, len), len);
        }

        fn finish(mut self) -> Vec<u8> {
            if self.n > 0 {
                self.out.push(self.acc as u8);
            }
            self.out
        }
    }

    /// Pre-tree where every symbol has a 5-bit code: symbol s has code s
    fn flat_pretree(bits: &mut Bits) {
        for _ in 0..PRETREE_SYMBOLS {
            bits.put(5, PRETREE_LEN_BITS);
        }
    }

    #[test]
    fn test_alphabet_sizes() {
        assert_eq!(OFFSET_CATEGORIES, 27);
        assert_eq!(MAIN_SYMBOLS, 688);
    }

    #[test]
    fn test_code_length_runs() {
        let mut bits = Bits::new();
        flat_pretree(&mut bits);
        // 7, repeat x4, 11 zeros, 3 zeros, 2
        bits.code(7, 5);
        bits.code(16, 5);
        bits.put(1, 2);
        bits.code(18, 5);
        bits.put(0, 7);
        bits.code(17, 5);
        bits.put(0, 3);
        bits.code(2, 5);
        let data = bits.finish();

        let mut state = BitState::default();
        let mut reader = BitReader::new(&data, &mut state);
        let mut pre = [0u8; PRETREE_SYMBOLS];
        for len in pre.iter_mut() {
            *len = reader.read_bits(PRETREE_LEN_BITS).unwrap() as u8;
        }
        let pretree = HuffmanTable::from_lengths(&pre).unwrap();
        let lengths = read_code_lengths(&mut reader, &pretree, 20).unwrap();

        let mut expected = vec![7u8; 5];
        expected.extend(vec![0u8; 14]);
        expected.push(2);
        assert_eq!(lengths, expected);
    }

    #[test]
    fn test_repeat_without_previous() {
        let mut bits = Bits::new();
        flat_pretree(&mut bits);
        bits.code(16, 5);
        bits.put(0, 2);
        let data = bits.finish();

        let mut state = BitState::default();
        let mut reader = BitReader::new(&data, &mut state);
        let mut pre = [0u8; PRETREE_SYMBOLS];
        for len in pre.iter_mut() {
            *len = reader.read_bits(PRETREE_LEN_BITS).unwrap() as u8;
        }
        let pretree = HuffmanTable::from_lengths(&pre).unwrap();
        assert!(matches!(
            read_code_lengths(&mut reader, &pretree, 10),
            Err(Error::CorruptInput(Corruption::BadCodeLengths(_)))
        ));
    }

    #[test]
    fn test_run_overflow() {
        let mut bits = Bits::new();
        flat_pretree(&mut bits);
        bits.code(18, 5);
        bits.put(127, 7);
        let data = bits.finish();

        let mut state = BitState::default();
        let mut reader = BitReader::new(&data, &mut state);
        let mut pre = [0u8; PRETREE_SYMBOLS];
        for len in pre.iter_mut() {
            *len = reader.read_bits(PRETREE_LEN_BITS).unwrap() as u8;
        }
        let pretree = HuffmanTable::from_lengths(&pre).unwrap();
        assert!(read_code_lengths(&mut reader, &pretree, 100).is_err());
    }

    #[test]
    fn test_truncated_tables() {
        let data = [0xFFu8; 3];
        let mut state = BitState::default();
        let mut reader = BitReader::new(&data, &mut state);
        assert!(BlockTables::read(&mut reader).is_err());
    }
}
