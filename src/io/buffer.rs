//! Growable in-memory channel.

use super::{Channel, SeekFrom};
use crate::{Error, Result};

/// Channel backed by a growable byte array.
///
/// Reads copy from the backing array and advance a cursor; writes overwrite
/// at the cursor and extend the array as needed. Always seekable.
#[derive(Debug, Default)]
pub struct BufferChannel {
    data: Vec<u8>,
    pos: usize,
}

impl BufferChannel {
    /// Create an empty buffer channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer channel over existing bytes, positioned at the start.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Total bytes in the backing array.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the backing array is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the backing bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the channel, returning the backing bytes.
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Channel for BufferChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let avail = self.data.len().saturating_sub(self.pos);
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let overlap = self.data.len().saturating_sub(self.pos).min(buf.len());
        self.data[self.pos..self.pos + overlap].copy_from_slice(&buf[..overlap]);
        self.data.extend_from_slice(&buf[overlap..]);
        self.pos += buf.len();
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(n) => self.data.len() as i64 + n,
            SeekFrom::Current(n) => self.pos as i64 + n,
        };
        if target < 0 || target > self.data.len() as i64 {
            return Err(Error::invalid_data(format!(
                "seek target {target} outside buffer of {} bytes",
                self.data.len()
            )));
        }
        self.pos = target as usize;
        Ok(self.pos as u64)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos as u64
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write_roundtrip() {
        let mut ch = BufferChannel::new();
        ch.write_all(b"hello world").unwrap();
        assert_eq!(ch.position(), 11);

        ch.seek(SeekFrom::Start(0)).unwrap();
        let mut buf = [0u8; 5];
        ch.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        assert_eq!(ch.position(), 5);
    }

    #[test]
    fn test_read_past_end_is_eof() {
        let mut ch = BufferChannel::from_vec(vec![1, 2, 3]);
        let mut buf = [0u8; 8];
        assert_eq!(ch.read(&mut buf).unwrap(), 3);
        assert_eq!(ch.read(&mut buf).unwrap(), 0);

        let err = ch.read_exact(&mut buf).unwrap_err();
        assert!(err.is_eof());
    }

    #[test]
    fn test_overwrite_then_extend() {
        let mut ch = BufferChannel::from_vec(vec![0; 4]);
        ch.seek(SeekFrom::Start(2)).unwrap();
        ch.write_all(&[9, 9, 9, 9]).unwrap();
        assert_eq!(ch.data(), &[0, 0, 9, 9, 9, 9]);
        assert_eq!(ch.position(), 6);
    }

    #[test]
    fn test_seek_outside_fails() {
        let mut ch = BufferChannel::from_vec(vec![0; 4]);
        assert!(ch.seek(SeekFrom::Start(5)).is_err());
        assert!(ch.seek(SeekFrom::End(-5)).is_err());
        assert_eq!(ch.seek(SeekFrom::End(0)).unwrap(), 4);
    }
}
