//! XPress9 block decoder
//!
//! Session-based engine for XPress9-style blocks: an LZ77 token stream over a
//! sliding window of up to 4 MiB, entropy coded with canonical Huffman tables.
//!
//! The block layout (see [`frame`]) is provisional. The historical XPress9
//! code tables and token framing are not reproduced yet, so blocks written by
//! other XPress9 encoders do not decode.
//!
//! # Key Features
//!
//! - **Resumable fetch**: drain a block through destinations of any size;
//!   decoding pauses mid-match and picks up where it stopped
//! - **Sessions**: independent blocks, or blocks that refer back into
//!   earlier output of the same session
//! - **Pluggable allocation**: window and staging buffers come from a
//!   [`BlockAllocator`]
//! - **Checked input**: header and content CRC-32C, bounded offsets, no
//!   `unsafe`
//!
//! # Example
//!
//! ```rust,ignore
//! use xpress9_core::{Decoder, DecoderFlags};
//!
//! let mut decoder = Decoder::create(22, DecoderFlags::default())?;
//! decoder.start_session(true)?;
//!
//! decoder.attach(&block)?;
//! let mut buf = [0u8; 4096];
//! loop {
//!     let fetch = decoder.fetch(&mut buf)?;
//!     if fetch.is_drained() {
//!         break;
//!     }
//!     out.extend_from_slice(&buf[..fetch.written]);
//! }
//! decoder.detach(&block)?;
//! decoder.destroy();
//! ```

pub mod alloc;
pub mod bitstream;
pub mod boundary;
pub mod config;
pub mod decoder;
pub mod entropy;
pub mod error;
pub mod frame;
pub mod lz;
#[cfg(any(test, feature = "fixture"))]
pub mod writer;

// Re-exports
pub use alloc::{BlockAllocator, BudgetAllocator, SystemAllocator};
pub use config::{DecoderConfig, DecoderFlags, WINDOW_LOG2_MAX, WINDOW_LOG2_MIN};
pub use decoder::{Decoder, DecoderStats, Fetch, Status};
pub use error::{Corruption, Error, ErrorKind, Result};
pub use frame::{BlockFlags, BlockHeader};

/// Parse the header of a block without decoding it
///
/// Useful for sizing the destination before [`Decoder::attach`].
pub fn peek_header(block: &[u8]) -> Result<BlockHeader> {
    let header = BlockHeader::parse(block)?;
    header.check_payload(block)?;
    Ok(header)
}

/// Scratch size for [`decompress`]; output grows by at most this much per
/// fetch, never by the size the header claims
const ONE_SHOT_CHUNK: usize = 1 << 16;

/// Decompress a single independent block
///
/// Uses a temporary decoder whose window matches the block.
pub fn decompress(block: &[u8]) -> Result<Vec<u8>> {
    let header = peek_header(block)?;
    let config = DecoderConfig::new(header.window_log2, DecoderFlags::default());
    let mut decoder = Decoder::create_in(config, SystemAllocator)?;
    decoder.start_session(true)?;

    let mut chunk = SystemAllocator.allocate(ONE_SHOT_CHUNK)?;
    let mut out = Vec::new();
    decoder.attach(block)?;
    loop {
        let fetch = decoder.fetch(&mut chunk)?;
        if fetch.written == 0 {
            break;
        }
        out.try_reserve(fetch.written)
            .map_err(|_| Error::AllocationFailed { requested: fetch.written })?;
        out.extend_from_slice(&chunk[..fetch.written]);
    }
    decoder.detach(block)?;
    Ok(out)
}
