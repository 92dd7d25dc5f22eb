//! Block writer for fixtures and benchmarks
//!
//! Produces well-formed blocks either from an explicit token list or from
//! plain bytes through a greedy hash matcher. It favours predictable output
//! over ratio and is not a production encoder.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::entropy::{
    reverse_bits, LEN_HEADERS, LENGTH_SYMBOLS, MAIN_SYMBOLS, MAX_CODE_LEN, OFFSET_CATEGORIES,
    PRETREE_LEN_BITS, PRETREE_SYMBOLS,
};
use crate::frame::{BlockFlags, BlockHeader, MAX_MTF_SLOTS, MIN_MATCH_RANGE};
use crate::lz::{offset_slot, slot_base, RecentOffsets};

/// Largest length the length alphabet plus its raw escape can express
const MAX_EXTRA_LENGTH: u32 = 15 + 255 + 0xFFFF;

/// Pre-tree code lengths travel in three bits
const PRETREE_MAX_LEN: u8 = (1 << PRETREE_LEN_BITS) - 1;

/// Hash table size for the greedy matcher
const HASH_SIZE: usize = 1 << 15;

/// Input token for [`BlockWriter::encode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Match { offset: u32, length: u32 },
}

/// Literal tokens for every byte of `bytes`
pub fn literals(bytes: &[u8]) -> Vec<Token> {
    bytes.iter().map(|&b| Token::Literal(b)).collect()
}

/// Block writer parameters
#[derive(Debug, Clone)]
pub struct BlockWriter {
    window_log2: u8,
    mtf_slots: u8,
    min_match: u8,
    checksum: bool,
    stored: bool,
}

impl Default for BlockWriter {
    fn default() -> Self {
        Self {
            window_log2: 16,
            mtf_slots: MAX_MTF_SLOTS,
            min_match: 3,
            checksum: true,
            stored: false,
        }
    }
}

impl BlockWriter {
    pub fn new(window_log2: u8) -> Self {
        Self {
            window_log2,
            ..Self::default()
        }
    }

    pub fn mtf_slots(mut self, slots: u8) -> Self {
        assert!(slots <= MAX_MTF_SLOTS);
        self.mtf_slots = slots;
        self
    }

    pub fn min_match(mut self, len: u8) -> Self {
        assert!(MIN_MATCH_RANGE.contains(&len));
        self.min_match = len;
        self
    }

    pub fn checksum(mut self, on: bool) -> Self {
        self.checksum = on;
        self
    }

    pub fn stored(mut self, on: bool) -> Self {
        self.stored = on;
        self
    }

    /// Encode a token list as one block with no prior history
    pub fn encode(&self, tokens: &[Token]) -> Vec<u8> {
        self.encode_with_history(&[], tokens)
    }

    /// Encode a token list that may refer back into `history`
    ///
    /// `history` is only used to compute the block content for the header;
    /// it is not written.
    pub fn encode_with_history(&self, history: &[u8], tokens: &[Token]) -> Vec<u8> {
        let content = replay(history, tokens);
        if self.stored {
            return self.finish(&content, &content);
        }
        let payload = self.entropy_code(tokens);
        self.finish(&content, &payload)
    }

    /// Compress `data` with the greedy matcher
    pub fn compress(&self, data: &[u8]) -> Vec<u8> {
        self.compress_with_history(&[], data)
    }

    /// Compress `data` allowing matches into `history`
    pub fn compress_with_history(&self, history: &[u8], data: &[u8]) -> Vec<u8> {
        if self.stored {
            return self.finish(data, data);
        }
        let tokens = self.find_matches(history, data);
        let payload = self.entropy_code(&tokens);
        self.finish(data, &payload)
    }

    fn finish(&self, content: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut flags = BlockFlags::empty();
        if self.checksum {
            flags |= BlockFlags::CHECKSUM;
        }
        if self.stored {
            flags |= BlockFlags::STORED;
        }

        let header = BlockHeader {
            flags,
            window_log2: self.window_log2,
            mtf_slots: self.mtf_slots,
            min_match: self.min_match,
            original_size: content.len() as u32,
            payload_size: payload.len() as u32,
            content_crc: if self.checksum { crc32c::crc32c(content) } else { 0 },
        };

        let mut block = Vec::with_capacity(crate::frame::HEADER_SIZE + payload.len());
        header.serialize(&mut block);
        block.extend_from_slice(payload);
        block
    }

    fn find_matches(&self, history: &[u8], data: &[u8]) -> Vec<Token> {
        let input = [history, data].concat();
        let start = history.len();
        let max_offset = 1usize << self.window_log2;
        let min_match = (self.min_match as usize).max(4);
        let max_match = self.min_match as usize + MAX_EXTRA_LENGTH as usize;

        let mut table = vec![u32::MAX; HASH_SIZE];
        let mut tokens = Vec::with_capacity(data.len());

        let mut pos = 0;
        while pos + 4 <= start {
            table[hash4(&input[pos..])] = pos as u32;
            pos += 1;
        }

        let mut pos = start;
        while pos < input.len() {
            if pos + min_match > input.len() {
                tokens.push(Token::Literal(input[pos]));
                pos += 1;
                continue;
            }

            let hash = hash4(&input[pos..]);
            let candidate = table[hash];
            table[hash] = pos as u32;

            let found = (candidate != u32::MAX)
                .then_some(candidate as usize)
                .filter(|&m| pos - m <= max_offset)
                .map(|m| (m, common_prefix(&input, m, pos, max_match)))
                .filter(|&(_, len)| len >= min_match);

            match found {
                Some((m, len)) => {
                    tokens.push(Token::Match {
                        offset: (pos - m) as u32,
                        length: len as u32,
                    });
                    for p in pos + 1..(pos + len).min(input.len().saturating_sub(3)) {
                        table[hash4(&input[p..])] = p as u32;
                    }
                    pos += len;
                }
                None => {
                    tokens.push(Token::Literal(input[pos]));
                    pos += 1;
                }
            }
        }

        tokens
    }

    fn entropy_code(&self, tokens: &[Token]) -> Vec<u8> {
        let symbols = self.symbolize(tokens);

        let mut main_freq = vec![0u32; MAIN_SYMBOLS];
        let mut length_freq = vec![0u32; LENGTH_SYMBOLS];
        for sym in &symbols {
            main_freq[sym.main as usize] += 1;
            if let Some(extra) = sym.length {
                length_freq[extra as usize] += 1;
            }
        }

        let mut lengths = limited_lengths(&main_freq, MAX_CODE_LEN as u8);
        lengths.extend(limited_lengths(&length_freq, MAX_CODE_LEN as u8));
        let main_codes = canonical_codes(&lengths[..MAIN_SYMBOLS]);
        let length_codes = canonical_codes(&lengths[MAIN_SYMBOLS..]);

        let runs = rle_lengths(&lengths);
        let mut pre_freq = vec![0u32; PRETREE_SYMBOLS];
        for run in &runs {
            pre_freq[run.symbol as usize] += 1;
        }
        let pre_lengths = limited_lengths(&pre_freq, PRETREE_MAX_LEN);
        let pre_codes = canonical_codes(&pre_lengths);

        let mut out = BitWriter::default();
        for &len in &pre_lengths {
            out.put(len as u32, PRETREE_LEN_BITS);
        }
        for run in &runs {
            let s = run.symbol as usize;
            out.code(pre_codes[s], pre_lengths[s]);
            out.put(run.extra as u32, run.extra_bits);
        }

        let length_lengths = &lengths[MAIN_SYMBOLS..];
        for sym in &symbols {
            let m = sym.main as usize;
            out.code(main_codes[m], lengths[m]);
            if let Some(extra) = sym.length {
                let e = extra as usize;
                out.code(length_codes[e], length_lengths[e]);
            }
            if let Some(raw) = sym.raw_length {
                out.put(raw, 16);
            }
            if sym.offset_bits > 0 {
                out.put(sym.offset_extra, sym.offset_bits);
            }
        }

        out.finish()
    }

    /// Map tokens to alphabet symbols, tracking recent offsets the way the
    /// decoder does
    fn symbolize(&self, tokens: &[Token]) -> Vec<Symbol> {
        let mut recent = RecentOffsets::default();
        let mtf = self.mtf_slots as usize;

        tokens
            .iter()
            .map(|token| match *token {
                Token::Literal(byte) => Symbol {
                    main: byte as u16,
                    ..Symbol::default()
                },
                Token::Match { offset, length } => {
                    assert!(offset > 0, "zero offset");
                    assert!(length >= self.min_match as u32, "match shorter than minimum");
                    let extra = length - self.min_match as u32;
                    assert!(extra <= MAX_EXTRA_LENGTH, "match too long");

                    let mut sym = Symbol::default();
                    let len_header = if extra < 15 {
                        extra
                    } else if extra - 15 < 255 {
                        sym.length = Some((extra - 15) as u16);
                        15
                    } else {
                        sym.length = Some(255);
                        sym.raw_length = Some(extra - 15 - 255);
                        15
                    };

                    let category = match recent.find(offset, mtf) {
                        Some(index) => {
                            recent.promote(index);
                            index
                        }
                        None => {
                            let slot = offset_slot(offset);
                            sym.offset_bits = slot;
                            sym.offset_extra = offset - slot_base(slot);
                            recent.push(offset);
                            mtf + slot as usize
                        }
                    };
                    assert!(category < OFFSET_CATEGORIES, "offset too large");

                    sym.main = (256 + category * LEN_HEADERS + len_header as usize) as u16;
                    sym
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Symbol {
    main: u16,
    length: Option<u16>,
    raw_length: Option<u32>,
    offset_bits: u32,
    offset_extra: u32,
}

/// Block content produced by `tokens` after `history`
///
/// References past the start of history read as zero.
fn replay(history: &[u8], tokens: &[Token]) -> Vec<u8> {
    let mut out = history.to_vec();
    for token in tokens {
        match *token {
            Token::Literal(byte) => out.push(byte),
            Token::Match { offset, length } => {
                for _ in 0..length {
                    let byte = out
                        .len()
                        .checked_sub(offset as usize)
                        .map_or(0, |at| out[at]);
                    out.push(byte);
                }
            }
        }
    }
    out.split_off(history.len())
}

#[inline]
fn hash4(data: &[u8]) -> usize {
    let v = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
    (v.wrapping_mul(2654435761) >> 17) as usize & (HASH_SIZE - 1)
}

fn common_prefix(input: &[u8], from: usize, pos: usize, max: usize) -> usize {
    let mut len = 0;
    while pos + len < input.len() && len < max && input[from + len] == input[pos + len] {
        len += 1;
    }
    len
}

/// LSB-first bit writer
#[derive(Debug, Default)]
struct BitWriter {
    out: Vec<u8>,
    acc: u64,
    n: u32,
}

impl BitWriter {
    fn put(&mut self, value: u32, len: u32) {
        if len == 0 {
            return;
        }
        self.acc |= ((value as u64) & ((1u64 << len) - 1)) << self.n;
        self.n += len;
        while self.n >= 8 {
            self.out.push(self.acc as u8);
            self.acc >>= 8;
            self.n -= 8;
        }
    }

    /// Write a Huffman code most significant bit first
    fn code(&mut self, code: u32, len: u8) {
        self.put(reverse_bits(code, len as u32), len as u32);
    }

    fn finish(mut self) -> Vec<u8> {
        if self.n > 0 {
            self.out.push(self.acc as u8);
        }
        self.out
    }
}

/// Canonical code per symbol, deflate assignment
fn canonical_codes(lengths: &[u8]) -> Vec<u32> {
    let mut counts = [0u32; MAX_CODE_LEN + 1];
    for &len in lengths {
        counts[len as usize] += 1;
    }
    counts[0] = 0;

    let mut next = [0u32; MAX_CODE_LEN + 1];
    let mut code = 0;
    for len in 1..=MAX_CODE_LEN {
        code = (code + counts[len - 1]) << 1;
        next[len] = code;
    }

    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                return 0;
            }
            let code = next[len as usize];
            next[len as usize] += 1;
            code
        })
        .collect()
}

/// Huffman code lengths no longer than `max_len`
///
/// Frequencies are halved until the tree fits.
fn limited_lengths(freqs: &[u32], max_len: u8) -> Vec<u8> {
    for shift in 0..32 {
        let scaled: Vec<u32> = freqs
            .iter()
            .map(|&f| if f == 0 { 0 } else { (f >> shift).max(1) })
            .collect();
        let lengths = huffman_lengths(&scaled);
        if lengths.iter().all(|&len| len <= max_len) {
            return lengths;
        }
    }
    freqs.iter().map(|&f| if f == 0 { 0 } else { max_len }).collect()
}

fn huffman_lengths(freqs: &[u32]) -> Vec<u8> {
    let mut lengths = vec![0u8; freqs.len()];
    let used: Vec<usize> = (0..freqs.len()).filter(|&i| freqs[i] > 0).collect();
    match used.len() {
        0 => return lengths,
        1 => {
            lengths[used[0]] = 1;
            return lengths;
        }
        _ => {}
    }

    // Leaves first, then internal nodes; each entry holds its children
    let mut children: Vec<Option<(usize, usize)>> = vec![None; used.len()];
    let mut heap: BinaryHeap<(Reverse<u64>, Reverse<usize>)> = used
        .iter()
        .enumerate()
        .map(|(node, &sym)| (Reverse(freqs[sym] as u64), Reverse(node)))
        .collect();

    while let (Some((Reverse(fa), Reverse(a))), Some((Reverse(fb), Reverse(b)))) =
        (heap.pop(), heap.pop())
    {
        let parent = children.len();
        children.push(Some((a, b)));
        heap.push((Reverse(fa + fb), Reverse(parent)));
    }

    let root = children.len() - 1;
    let mut stack = vec![(root, 0u8)];
    while let Some((node, depth)) = stack.pop() {
        match children[node] {
            Some((left, right)) => {
                stack.push((left, depth + 1));
                stack.push((right, depth + 1));
            }
            None => lengths[used[node]] = depth,
        }
    }
    lengths
}

/// One pre-tree symbol with its extra bits
#[derive(Debug, Clone, Copy)]
struct LengthRun {
    symbol: u8,
    extra: u8,
    extra_bits: u32,
}

impl LengthRun {
    fn literal(len: u8) -> Self {
        Self {
            symbol: len,
            extra: 0,
            extra_bits: 0,
        }
    }
}

fn rle_lengths(lengths: &[u8]) -> Vec<LengthRun> {
    let mut out = Vec::new();
    let mut i = 0;

    while i < lengths.len() {
        let value = lengths[i];
        let mut run = 1;
        while i + run < lengths.len() && lengths[i + run] == value {
            run += 1;
        }
        i += run;

        if value == 0 {
            let mut left = run;
            while left > 0 {
                if left >= 11 {
                    let n = left.min(138);
                    out.push(LengthRun { symbol: 18, extra: (n - 11) as u8, extra_bits: 7 });
                    left -= n;
                } else if left >= 3 {
                    let n = left.min(10);
                    out.push(LengthRun { symbol: 17, extra: (n - 3) as u8, extra_bits: 3 });
                    left -= n;
                } else {
                    out.push(LengthRun::literal(0));
                    left -= 1;
                }
            }
        } else {
            out.push(LengthRun::literal(value));
            let mut left = run - 1;
            while left > 0 {
                if left >= 3 {
                    let n = left.min(6);
                    out.push(LengthRun { symbol: 16, extra: (n - 3) as u8, extra_bits: 2 });
                    left -= n;
                } else {
                    out.push(LengthRun::literal(value));
                    left -= 1;
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::HEADER_SIZE;

    #[test]
    fn test_limited_lengths_respect_cap() {
        // Fibonacci frequencies grow a deep tree
        let mut freqs = vec![1u32, 1];
        while freqs.len() < 30 {
            let n = freqs.len();
            freqs.push(freqs[n - 1] + freqs[n - 2]);
        }
        assert!(huffman_lengths(&freqs).iter().any(|&l| l > 15));

        let lengths = limited_lengths(&freqs, 15);
        assert!(lengths.iter().all(|&l| (1..=15).contains(&l)));
        let kraft: f64 = lengths.iter().map(|&l| 0.5f64.powi(l as i32)).sum();
        assert!(kraft <= 1.0);
    }

    #[test]
    fn test_rle_lengths_expand_back() {
        let mut lengths = vec![0u8; 200];
        lengths.extend([5, 5, 5, 5, 5, 5, 5, 5, 2, 0, 0, 3]);
        let mut expanded = Vec::new();
        for run in rle_lengths(&lengths) {
            match run.symbol {
                16 => {
                    let prev = *expanded.last().unwrap();
                    expanded.extend(std::iter::repeat(prev).take(3 + run.extra as usize));
                }
                17 => expanded.extend(std::iter::repeat(0).take(3 + run.extra as usize)),
                18 => expanded.extend(std::iter::repeat(0).take(11 + run.extra as usize)),
                len => expanded.push(len),
            }
        }
        assert_eq!(expanded, lengths);
    }

    #[test]
    fn test_replay_overlapping_match() {
        let content = replay(b"", &[Token::Literal(b'a'), Token::Match { offset: 1, length: 4 }]);
        assert_eq!(content, b"aaaaa");
    }

    #[test]
    fn test_stored_block_layout() {
        let block = BlockWriter::default().stored(true).compress(b"hello");
        assert_eq!(block.len(), HEADER_SIZE + 5);
        assert_eq!(&block[HEADER_SIZE..], b"hello");
        let header = BlockHeader::parse(&block).unwrap();
        assert!(header.is_stored());
        assert_eq!(header.original_size, 5);
    }

    #[test]
    fn test_matcher_finds_repeats() {
        let data = b"abcdefgh".repeat(32);
        let tokens = BlockWriter::default().find_matches(&[], &data);
        assert!(tokens.len() < 20);
        assert!(tokens.iter().any(|t| matches!(t, Token::Match { offset: 8, .. })));
        assert_eq!(replay(&[], &tokens), data);
    }
}
