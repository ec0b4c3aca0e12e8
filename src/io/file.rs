//! File-backed channel.

use super::{Channel, SeekFrom};
use crate::Result;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

/// Channel backed by a regular file. Seekable.
#[derive(Debug)]
pub struct FileChannel {
    file: File,
    path: PathBuf,
    pos: u64,
}

impl FileChannel {
    /// Open an existing file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            pos: 0,
        })
    }

    /// Create (or truncate) a file for writing and reading back.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        Ok(Self {
            file,
            path: path.as_ref().to_path_buf(),
            pos: 0,
        })
    }

    /// Path this channel was opened with. Diagnostic only.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Channel for FileChannel {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.file.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let n = self.file.write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.pos = self.file.seek(pos)?;
        Ok(self.pos)
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_write_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ch.bin");

        let mut ch = FileChannel::create(&path).unwrap();
        ch.write_all(b"abcdef").unwrap();
        assert_eq!(ch.position(), 6);
        ch.close().unwrap();

        let mut ch = FileChannel::open(&path).unwrap();
        ch.seek(SeekFrom::End(-2)).unwrap();
        let mut buf = [0u8; 2];
        ch.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ef");
    }
}
