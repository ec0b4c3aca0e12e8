//! Byte-channel abstraction.
//!
//! Every reader and writer in this crate runs over a [`Channel`]: a
//! byte-oriented endpoint abstracting over memory buffers, files, and
//! TLS-secured sockets. A channel tracks its own absolute position, so
//! structures that must be locatable later (sync markers, the footer
//! back-pointer) record `position()` at emission time.

mod buffer;
mod file;
mod tls;
pub mod varint;

pub use buffer::BufferChannel;
pub use file::FileChannel;
pub use tls::{ensure_crypto_initialized, TlsChannel};

pub use std::io::SeekFrom;

use crate::{Error, Result};

/// A byte sink/source with position accounting.
///
/// `read` returning 0 means end of data. `seek` is only valid on channels
/// whose backing store supports random access; forward-only channels fail
/// with [`Error::NotSeekable`].
pub trait Channel: Send {
    /// Read up to `buf.len()` bytes. Returns the number read; 0 = EOF.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write up to `buf.len()` bytes. Returns the number accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Reposition the channel. Returns the new absolute position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Push any buffered writes to the backing store.
    fn flush(&mut self) -> Result<()>;

    /// Bytes consumed/produced since channel creation (or last seek target).
    fn position(&self) -> u64;

    /// Whether the backing store supports random access.
    fn is_seekable(&self) -> bool;

    /// Release the channel. Flushes pending writes; safe to call once.
    fn close(&mut self) -> Result<()> {
        self.flush()
    }

    /// Read exactly `buf.len()` bytes.
    ///
    /// Returns [`Error::Eof`] when the channel ends on a structure boundary
    /// (no bytes read at all) and [`Error::ShortRead`] when it ends inside
    /// one.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut got = 0;
        while got < buf.len() {
            let n = self.read(&mut buf[got..])?;
            if n == 0 {
                if got == 0 {
                    return Err(Error::Eof);
                }
                return Err(Error::ShortRead {
                    need: buf.len(),
                    got,
                });
            }
            got += n;
        }
        Ok(())
    }

    /// Write all of `buf`.
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut wrote = 0;
        while wrote < buf.len() {
            let n = self.write(&buf[wrote..])?;
            if n == 0 {
                return Err(Error::ShortWrite {
                    wrote,
                    len: buf.len(),
                });
            }
            wrote += n;
        }
        Ok(())
    }
}

impl<C: Channel + ?Sized> Channel for &mut C {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        (**self).seek(pos)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }
}
