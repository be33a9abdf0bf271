//! The device boundary.
//!
//! A [`Device`] is the byte store an archive is read from or written to.
//! Random-access devices (files, in-memory cursors) support every archive
//! mode. Sequential devices can only be written front to back, which rules
//! out everything except creating a fresh archive.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// A byte store an archive can be bound to.
pub trait Device: Read + Write + Seek {
    /// Whether the device is forward-only.
    ///
    /// Sequential devices cannot seek and cannot report their position
    /// reliably; archives over them may only be created, never read.
    fn is_sequential(&self) -> bool {
        false
    }

    /// Release the device at the end of an archive session.
    ///
    /// Called when an archive with auto-close enabled gives the device back.
    fn close(&mut self) -> io::Result<()> {
        self.flush()
    }
}

impl Device for File {
    fn close(&mut self) -> io::Result<()> {
        self.flush()?;
        self.sync_data()
    }
}

impl Device for Cursor<Vec<u8>> {}

impl Device for Cursor<&mut Vec<u8>> {}

impl<D: Device + ?Sized> Device for &mut D {
    fn is_sequential(&self) -> bool {
        (**self).is_sequential()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn is_sequential(&self) -> bool {
        (**self).is_sequential()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// A forward-only device over any writer.
///
/// Reading is unsupported, and seeking is only allowed as a position query
/// (`SeekFrom::Current(0)`), answered from an internal byte counter.
#[derive(Debug)]
pub struct Sequential<W> {
    inner: W,
    written: u64,
}

impl<W: Write> Sequential<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Number of bytes written through this device.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Get a reference to the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Consume the device and return the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Read for Sequential<W> {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "sequential device is write-only",
        ))
    }
}

impl<W: Write> Write for Sequential<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Seek for Sequential<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) => Ok(self.written),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "sequential device cannot seek",
            )),
        }
    }
}

impl<W: Write> Device for Sequential<W> {
    fn is_sequential(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_is_random_access() {
        let cursor = Cursor::new(Vec::new());
        assert!(!cursor.is_sequential());
    }

    #[test]
    fn test_sequential_counts_and_refuses_seek() {
        let mut device = Sequential::new(Vec::new());
        assert!(device.is_sequential());

        device.write_all(b"hello").unwrap();
        assert_eq!(device.bytes_written(), 5);
        assert_eq!(device.stream_position().unwrap(), 5);
        assert!(device.seek(SeekFrom::Start(0)).is_err());

        let mut buf = [0u8; 4];
        assert!(device.read(&mut buf).is_err());
        assert_eq!(device.into_inner(), b"hello");
    }

    #[test]
    fn test_borrowed_device_forwards_capability() {
        let mut inner = Sequential::new(Vec::new());
        let borrowed: &mut dyn Device = &mut inner;
        assert!(borrowed.is_sequential());
    }
}
