//! Error types for gavf.

use std::io;
use thiserror::Error;

/// Result type for gavf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gavf operations.
///
/// End of data and transient unavailability are ordinary outcomes the host
/// branches on, not failures; use [`Error::is_eof`] and
/// [`Error::is_try_again`] to tell them apart from real errors.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed structural data (bad tag, truncated block, codec mismatch).
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Short read: the channel ended inside a structure.
    #[error("Short read: need {need} bytes, got {got}")]
    ShortRead { need: usize, got: usize },

    /// Short write: the channel accepted fewer bytes than required.
    #[error("Short write: wrote {wrote} of {len} bytes")]
    ShortWrite { wrote: usize, len: usize },

    /// Seek on a channel whose backing store is forward-only.
    #[error("Channel is not seekable")]
    NotSeekable,

    /// TLS handshake or record-layer failure.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Packet tagged for a stream id the program header never declared.
    #[error("Packet for unknown stream id {stream_id}")]
    Desync { stream_id: u32 },

    /// End of data. A normal terminal condition, not a failure.
    #[error("End of stream")]
    Eof,

    /// Nothing available right now; retry after other streams have been
    /// pulled or more bytes have arrived.
    #[error("Try again")]
    TryAgain,
}

impl Error {
    /// Create an invalid-data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Whether this is the end-of-data outcome.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }

    /// Whether this is the retryable outcome.
    pub fn is_try_again(&self) -> bool {
        matches!(self, Self::TryAgain)
    }
}
