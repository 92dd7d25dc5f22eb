//! LSB-first bit reader
//!
//! Bits are taken from the least significant end of each byte, bytes in
//! order. The reader position lives in a separate [`BitState`] so it can be
//! parked between `fetch` calls while the payload stays owned elsewhere.

use crate::{Corruption, Result};

/// Position of a paused bit reader
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitState {
    /// Next byte to load into `buf`
    pos: usize,
    /// Loaded bits, next bit in the least significant position
    buf: u64,
    /// Number of valid bits in `buf`
    count: u32,
}

impl BitState {
    /// Payload bytes not yet fully consumed, counting a partial byte as one
    pub fn bytes_consumed(&self) -> usize {
        self.pos - (self.count / 8) as usize
    }
}

/// Bit reader over a payload slice, resuming from a [`BitState`]
pub struct BitReader<'a> {
    data: &'a [u8],
    state: &'a mut BitState,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8], state: &'a mut BitState) -> Self {
        Self { data, state }
    }

    #[inline]
    fn refill(&mut self) {
        while self.state.count <= 56 && self.state.pos < self.data.len() {
            self.state.buf |= (self.data[self.state.pos] as u64) << self.state.count;
            self.state.pos += 1;
            self.state.count += 8;
        }
    }

    /// Look at the next `n` bits (n <= 32) without consuming them
    ///
    /// Bits past the end of the payload read as zero; consuming them fails.
    #[inline]
    pub fn peek(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 32);
        self.refill();
        (self.state.buf & mask(n)) as u32
    }

    /// Drop `n` bits that were previously peeked
    #[inline]
    pub fn consume(&mut self, n: u32) -> Result<()> {
        if n > self.state.count {
            return Err(Corruption::Truncated.into());
        }
        self.state.buf = if n == 64 { 0 } else { self.state.buf >> n };
        self.state.count -= n;
        Ok(())
    }

    /// Read `n` bits (n <= 32) as an integer, first bit least significant
    #[inline]
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        let value = self.peek(n);
        self.consume(n)?;
        Ok(value)
    }

    /// Bits still available, loaded or not
    pub fn remaining_bits(&self) -> u64 {
        self.state.count as u64 + 8 * (self.data.len() - self.state.pos) as u64
    }

    pub fn bytes_consumed(&self) -> usize {
        self.state.bytes_consumed()
    }
}

#[inline]
fn mask(n: u32) -> u64 {
    if n >= 64 {
        u64::MAX
    } else {
        (1u64 << n) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_lsb_first_order() {
        let data = [0b1010_1100u8, 0xFF];
        let mut state = BitState::default();
        let mut reader = BitReader::new(&data, &mut state);

        assert_eq!(reader.read_bits(2).unwrap(), 0b00);
        assert_eq!(reader.read_bits(3).unwrap(), 0b011);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0xFF);
        assert_eq!(reader.remaining_bits(), 0);
    }

    #[test]
    fn test_state_survives_reader() {
        let data = [0x12u8, 0x34, 0x56, 0x78];
        let mut state = BitState::default();
        {
            let mut reader = BitReader::new(&data, &mut state);
            assert_eq!(reader.read_bits(12).unwrap(), 0x412);
        }
        let mut reader = BitReader::new(&data, &mut state);
        assert_eq!(reader.read_bits(20).unwrap(), 0x78563);
    }

    #[test]
    fn test_truncated_read() {
        let data = [0xAAu8];
        let mut state = BitState::default();
        let mut reader = BitReader::new(&data, &mut state);
        assert_eq!(reader.read_bits(4).unwrap(), 0xA);
        assert!(matches!(
            reader.read_bits(5),
            Err(Error::CorruptInput(Corruption::Truncated))
        ));
    }

    #[test]
    fn test_peek_pads_with_zero() {
        let data = [0x01u8];
        let mut state = BitState::default();
        let mut reader = BitReader::new(&data, &mut state);
        assert_eq!(reader.peek(16), 0x0001);
        assert!(reader.consume(16).is_err());
        assert!(reader.consume(8).is_ok());
    }

    #[test]
    fn test_bytes_consumed() {
        let data = [0u8; 16];
        let mut state = BitState::default();
        let mut reader = BitReader::new(&data, &mut state);
        assert_eq!(reader.bytes_consumed(), 0);
        reader.read_bits(1).unwrap();
        assert_eq!(reader.bytes_consumed(), 1);
        reader.read_bits(7).unwrap();
        assert_eq!(reader.bytes_consumed(), 1);
        reader.read_bits(9).unwrap();
        assert_eq!(reader.bytes_consumed(), 3);
    }
}
