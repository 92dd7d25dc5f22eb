//! XPress9 decoder error types

use thiserror::Error;

/// Decoder error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("Allocation of {requested} bytes failed")]
    AllocationFailed { requested: usize },

    #[error("Not initialized: {0}")]
    NotInitialized(&'static str),

    #[error("A block is already attached")]
    AlreadyAttached,

    #[error("Corrupt input: {0}")]
    CorruptInput(#[from] Corruption),

    /// Never returned by `fetch`; a full destination pauses decoding instead.
    #[error("Destination capacity exceeded")]
    CapacityExceeded,

    #[error("Detach does not match the attached buffer")]
    DetachMismatch,

    #[error("Block detached with {remaining} bytes still undecoded")]
    Abandoned { remaining: u64 },
}

/// What exactly was wrong with a compressed block
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    #[error("block shorter than its header ({0} bytes)")]
    HeaderTruncated(usize),

    #[error("bad magic {}", hex::encode(.0))]
    BadMagic([u8; 4]),

    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown flag bits {0:#04x}")]
    UnknownFlags(u8),

    #[error("header checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    HeaderChecksum { stored: u32, computed: u32 },

    #[error("window log2 {block} not supported by a decoder with window log2 {decoder}")]
    WindowTooLarge { block: u8, decoder: u8 },

    #[error("invalid block parameters: {0}")]
    BadParameters(&'static str),

    #[error("payload length mismatch: header says {declared}, block carries {actual}")]
    PayloadLength { declared: usize, actual: usize },

    #[error("malformed code lengths: {0}")]
    BadCodeLengths(&'static str),

    #[error("unassigned Huffman code")]
    InvalidCode,

    #[error("offset slot {slot} exceeds window log2 {window_log2}")]
    OffsetSlot { slot: u32, window_log2: u8 },

    #[error("offset {offset} out of range ({available} bytes addressable)")]
    OffsetOutOfRange { offset: u64, available: u64 },

    #[error("match of {length} bytes runs past the block end ({remaining} bytes left)")]
    MatchOverrun { length: u64, remaining: u64 },

    #[error("payload truncated")]
    Truncated,

    #[error("{0} payload bytes left after the last token")]
    TrailingPayload(usize),

    #[error("content checksum mismatch: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch { expected: u32, actual: u32 },
}

/// Closed set of outcome kinds, as kept in the decoder status register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigInvalid,
    AllocationFailed,
    NotInitialized,
    AlreadyAttached,
    CorruptInput,
    CapacityExceeded,
    DetachMismatch,
    Abandoned,
}

impl Error {
    /// Kind of this error, without its payload
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            Error::AllocationFailed { .. } => ErrorKind::AllocationFailed,
            Error::NotInitialized(_) => ErrorKind::NotInitialized,
            Error::AlreadyAttached => ErrorKind::AlreadyAttached,
            Error::CorruptInput(_) => ErrorKind::CorruptInput,
            Error::CapacityExceeded => ErrorKind::CapacityExceeded,
            Error::DetachMismatch => ErrorKind::DetachMismatch,
            Error::Abandoned { .. } => ErrorKind::Abandoned,
        }
    }

    /// The corruption detail, if this is a `CorruptInput` error
    pub fn corruption(&self) -> Option<&Corruption> {
        match self {
            Error::CorruptInput(c) => Some(c),
            _ => None,
        }
    }
}

/// Decoder result type
pub type Result<T> = std::result::Result<T, Error>;
