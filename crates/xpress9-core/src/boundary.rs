//! Three-call boundary surface: `init`, `decompress`, `free`
//!
//! Errors collapse to `false` / `0` here; callers that need the reason use
//! [`Decoder`] directly. The process-wide functions operate on one shared
//! [`Boundary`] behind a mutex.

use std::sync::{Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::{DecoderFlags, WINDOW_LOG2_MAX};
use crate::decoder::Decoder;

// ============================================================================
// Instance
// ============================================================================

/// One lazily created decoder, driven through the boundary calls
#[derive(Debug, Default)]
pub struct Boundary {
    decoder: Option<Decoder>,
}

impl Boundary {
    pub const fn new() -> Self {
        Self { decoder: None }
    }

    /// Create the decoder and start an independent session
    ///
    /// A second call on an initialized instance succeeds without touching
    /// the running session.
    pub fn init(&mut self) -> bool {
        if self.decoder.is_some() {
            return true;
        }

        let mut decoder = match Decoder::create(WINDOW_LOG2_MAX, DecoderFlags::default()) {
            Ok(decoder) => decoder,
            Err(e) => {
                warn!(error = %e, "boundary init failed");
                return false;
            }
        };
        if let Err(e) = decoder.start_session(true) {
            warn!(error = %e, "boundary session start failed");
            return false;
        }

        self.decoder = Some(decoder);
        true
    }

    /// Decode one block into `dst`
    ///
    /// Returns the number of bytes written. A destination too small for the
    /// block yields the bytes that fit; the rest of the block is dropped.
    /// Returns 0 when the block is rejected or fails to decode.
    pub fn decompress(&mut self, src: &[u8], dst: &mut [u8]) -> usize {
        let decoder = match self.decoder.as_mut() {
            Some(decoder) => decoder,
            None => {
                warn!("decompress called before init");
                return 0;
            }
        };

        if let Err(e) = decoder.attach(src) {
            debug!(error = %e, "boundary attach failed");
            return 0;
        }

        let mut total = 0;
        loop {
            match decoder.fetch(&mut dst[total..]) {
                Ok(fetch) if fetch.written == 0 => break,
                Ok(fetch) => total += fetch.written,
                Err(e) => {
                    debug!(error = %e, "boundary fetch failed");
                    total = 0;
                    break;
                }
            }
        }

        if let Err(e) = decoder.detach(src) {
            debug!(error = %e, total, "boundary detach reported");
        }
        total
    }

    /// Destroy the decoder, if any
    pub fn free(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            decoder.destroy();
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.decoder.is_some()
    }
}

// ============================================================================
// Process-wide instance
// ============================================================================

static GLOBAL: Mutex<Boundary> = Mutex::new(Boundary::new());

fn global() -> MutexGuard<'static, Boundary> {
    GLOBAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`Boundary::init`] on the shared instance
pub fn init() -> bool {
    global().init()
}

/// [`Boundary::decompress`] on the shared instance
pub fn decompress(src: &[u8], dst: &mut [u8]) -> usize {
    global().decompress(src, dst)
}

/// [`Boundary::free`] on the shared instance
pub fn free() {
    global().free()
}

/// Whether the shared instance currently holds a decoder
pub fn is_initialized() -> bool {
    global().is_initialized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::BlockWriter;

    // Tests touching the shared instance must not interleave.
    static SERIAL: Mutex<()> = Mutex::new(());

    #[test]
    fn test_instance_lifecycle() {
        let mut boundary = Boundary::new();
        let block = BlockWriter::default().compress(b"boundary boundary boundary");
        let mut dst = [0u8; 64];

        assert_eq!(boundary.decompress(&block, &mut dst), 0);
        assert!(boundary.init());
        assert!(boundary.is_initialized());

        let n = boundary.decompress(&block, &mut dst);
        assert_eq!(&dst[..n], b"boundary boundary boundary");

        // init again reuses the instance
        assert!(boundary.init());
        assert_eq!(boundary.decompress(&block, &mut dst), n);

        boundary.free();
        assert!(!boundary.is_initialized());
        boundary.free();
    }

    #[test]
    fn test_failures_collapse_to_zero() {
        let mut boundary = Boundary::new();
        assert!(boundary.init());

        let block = BlockWriter::default().compress(&[7u8; 100]);
        let mut corrupt = block.clone();
        corrupt[0] = b'Q';
        let mut dst = [0u8; 100];
        assert_eq!(boundary.decompress(&corrupt, &mut dst), 0);

        // Still usable after failures
        assert_eq!(boundary.decompress(&block, &mut dst), 100);
        assert!(dst.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_small_destination_keeps_prefix() {
        let mut boundary = Boundary::new();
        assert!(boundary.init());

        let block = BlockWriter::default().compress(&[7u8; 100]);
        let mut small = [0u8; 10];
        assert_eq!(boundary.decompress(&block, &mut small), 10);
        assert_eq!(small, [7u8; 10]);

        // The truncated block is released; the next one decodes in full
        let mut dst = [0u8; 100];
        assert_eq!(boundary.decompress(&block, &mut dst), 100);
        assert!(dst.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_checksum_failure_returns_zero() {
        let mut boundary = Boundary::new();
        assert!(boundary.init());

        let mut block = BlockWriter::default().compress(b"checked content");
        block[16] ^= 0x01;
        let crc = crc32c::crc32c(&block[..20]);
        block[20..24].copy_from_slice(&crc.to_le_bytes());

        let mut dst = [0u8; 32];
        assert_eq!(boundary.decompress(&block, &mut dst), 0);
    }

    #[test]
    fn test_init_keeps_running_session() {
        let mut boundary = Boundary::new();
        assert!(boundary.init());
        let block = BlockWriter::default().compress(b"counted once");
        let mut dst = [0u8; 32];
        assert_eq!(boundary.decompress(&block, &mut dst), 12);

        assert!(boundary.init());
        let stats = boundary.decoder.as_ref().map(|d| d.stats().clone());
        assert_eq!(stats.map(|s| s.blocks_decoded), Some(1));
    }

    #[test]
    fn test_global_instance() {
        let _guard = SERIAL.lock().unwrap_or_else(|p| p.into_inner());
        free();
        assert!(!is_initialized());

        let block = BlockWriter::default().compress(b"shared");
        let mut dst = [0u8; 16];
        assert_eq!(decompress(&block, &mut dst), 0);

        assert!(init());
        assert_eq!(decompress(&block, &mut dst), 6);
        assert_eq!(&dst[..6], b"shared");

        free();
        assert!(!is_initialized());
    }
}
