//! Decoder instance: lifecycle, sessions and the attach/fetch/detach cycle
//!
//! ```text
//!  create ──► start_session ──► attach ──► fetch … fetch ──► detach ──┐
//!                  ▲               ▲                                 │
//!                  └───────────────┴─────────────────────────────────┘
//! ```
//!
//! A decoder serves one session at a time. Starting a session again forgets
//! the window history. In an independent session every block starts from empty
//! history; otherwise back-references may reach into earlier blocks of the
//! same session.

mod block;

use tracing::{debug, trace, warn};

use crate::alloc::{BlockAllocator, SystemAllocator};
use crate::config::{DecoderConfig, DecoderFlags};
use crate::lz::Window;
use crate::{Error, ErrorKind, Result};

use block::{ActiveBlock, BlockId};

/// Outcome of the most recent decoder call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed(ErrorKind),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }
}

/// Result of one fetch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetch {
    /// Bytes written to the destination
    pub written: usize,
    /// Bytes of the attached block still to come
    pub pending: usize,
}

impl Fetch {
    /// Nothing written and nothing left: the block is drained
    pub fn is_drained(&self) -> bool {
        self.written == 0 && self.pending == 0
    }
}

/// Counters for the current session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub blocks_decoded: u64,
    pub blocks_abandoned: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Session {
    independent: bool,
}

/// XPress9 block decoder
///
/// Window and staging buffers come from the allocator `A` and go back to it
/// on [`destroy`](Decoder::destroy) or drop.
#[derive(Debug)]
pub struct Decoder<A: BlockAllocator = SystemAllocator> {
    config: DecoderConfig,
    allocator: A,
    window: Window,
    session: Option<Session>,
    block: Option<ActiveBlock>,
    status: Status,
    stats: DecoderStats,
}

impl Decoder<SystemAllocator> {
    /// Create a decoder with a `2^window_log2` byte window on the global heap
    pub fn create(window_log2: u8, flags: DecoderFlags) -> Result<Self> {
        Self::create_in(DecoderConfig::new(window_log2, flags), SystemAllocator)
    }
}

impl<A: BlockAllocator> Decoder<A> {
    /// Create a decoder whose buffers come from `allocator`
    pub fn create_in(config: DecoderConfig, allocator: A) -> Result<Self> {
        config.validate()?;
        let buf = allocator.allocate(config.window_size())?;
        debug!(
            window_log2 = config.window_log2,
            flags = ?config.flags,
            "decoder created"
        );

        Ok(Self {
            config,
            allocator,
            window: Window::new(buf),
            session: None,
            block: None,
            status: Status::Ok,
            stats: DecoderStats::default(),
        })
    }

    /// Begin a fresh decode history
    ///
    /// Fails with `AlreadyAttached` while a block is bound.
    pub fn start_session(&mut self, independent: bool) -> Result<()> {
        let result = self.start_session_inner(independent);
        self.record(result)
    }

    fn start_session_inner(&mut self, independent: bool) -> Result<()> {
        if self.block.is_some() {
            return Err(Error::AlreadyAttached);
        }
        self.window.reset();
        self.session = Some(Session { independent });
        self.stats = DecoderStats::default();
        debug!(independent, "session started");
        Ok(())
    }

    /// Bind a compressed block
    ///
    /// Header and entropy tables are validated here; a malformed block is
    /// rejected without changing decoder state.
    pub fn attach(&mut self, src: &[u8]) -> Result<()> {
        let result = self.attach_inner(src);
        self.record(result)
    }

    fn attach_inner(&mut self, src: &[u8]) -> Result<()> {
        let session = self
            .session
            .ok_or(Error::NotInitialized("no session started"))?;
        if self.block.is_some() {
            return Err(Error::AlreadyAttached);
        }

        let prepared = ActiveBlock::prepare(src, self.config.window_log2).map_err(|e| {
            warn!(len = src.len(), error = %e, "block rejected");
            e
        })?;

        let mut staging = self.allocator.allocate(src.len())?;
        staging.copy_from_slice(src);

        if session.independent {
            self.window.reset();
        }

        let header = &prepared.header;
        debug!(
            original_size = header.original_size,
            payload_size = header.payload_size,
            window_log2 = header.window_log2,
            stored = header.is_stored(),
            "block attached"
        );

        self.stats.bytes_in += src.len() as u64;
        self.block = Some(ActiveBlock::new(prepared, staging, BlockId::of(src)));
        Ok(())
    }

    /// Decode as much of the attached block as fits in `dst`
    ///
    /// Call repeatedly until [`Fetch::is_drained`]. A full destination is not
    /// an error; decoding resumes on the next call.
    pub fn fetch(&mut self, dst: &mut [u8]) -> Result<Fetch> {
        let result = self.fetch_inner(dst);
        self.record(result)
    }

    fn fetch_inner(&mut self, dst: &mut [u8]) -> Result<Fetch> {
        let block = self
            .block
            .as_mut()
            .ok_or(Error::NotInitialized("no block attached"))?;

        let written = block.fill(&mut self.window, dst, self.config.flags)?;
        let pending = block.remaining() as usize;
        self.stats.bytes_out += written as u64;
        trace!(written, pending, capacity = dst.len(), "fetch");

        Ok(Fetch { written, pending })
    }

    /// Release the attached block
    ///
    /// `src` must be the very buffer given to [`attach`](Self::attach). A
    /// block that was not fully decoded is released anyway and reported.
    pub fn detach(&mut self, src: &[u8]) -> Result<()> {
        let result = self.detach_inner(src);
        self.record(result)
    }

    fn detach_inner(&mut self, src: &[u8]) -> Result<()> {
        let block = self
            .block
            .as_ref()
            .ok_or(Error::NotInitialized("no block attached"))?;
        if block.id() != BlockId::of(src) {
            return Err(Error::DetachMismatch);
        }

        let block = match self.block.take() {
            Some(block) => block,
            None => return Err(Error::NotInitialized("no block attached")),
        };
        let complete = block.is_complete();
        let remaining = block.remaining();
        let poisoned = block.poisoned().cloned();
        self.allocator.release(block.into_staging());

        if complete {
            self.stats.blocks_decoded += 1;
            debug!("block detached");
            return Ok(());
        }

        self.stats.blocks_abandoned += 1;
        if let Some(c) = poisoned {
            warn!(error = %c, "corrupt block detached");
            return Err(c.into());
        }
        warn!(remaining, "block detached before it was drained");
        Err(Error::Abandoned { remaining })
    }

    /// Attach, drain into `dst`, detach
    ///
    /// Returns the number of bytes written. A destination too small for the
    /// block yields `Abandoned`. The block is always detached.
    pub fn decompress_block(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        self.attach(src)?;

        let mut total = 0;
        let drained = loop {
            match self.fetch(&mut dst[total..]) {
                Ok(fetch) if fetch.written == 0 => break Ok(()),
                Ok(fetch) => total += fetch.written,
                Err(e) => break Err(e),
            }
        };
        let detached = self.detach(src);

        let result = drained.and(detached).map(|()| total);
        self.record(result)
    }

    /// Release the window and any attached block through the allocator
    pub fn destroy(self) {
        debug!(attached = self.block.is_some(), "decoder destroyed");
        drop(self);
    }

    /// Outcome of the most recent call
    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_attached(&self) -> bool {
        self.block.is_some()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn stats(&self) -> &DecoderStats {
        &self.stats
    }

    /// Decode window (history of the current session)
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Original size of the attached block
    pub fn attached_size(&self) -> Option<usize> {
        self.block
            .as_ref()
            .map(|block| block.header().original_size as usize)
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        self.status = match &result {
            Ok(_) => Status::Ok,
            Err(e) => Status::Failed(e.kind()),
        };
        result
    }
}

impl<A: BlockAllocator> Drop for Decoder<A> {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.allocator.release(block.into_staging());
        }
        let window = self.window.take_buffer();
        if !window.is_empty() {
            self.allocator.release(window);
        }
    }
}
