//! GZIP stream wrapper (RFC 1952).
//!
//! [`GzipStream`] reads or writes one gzip file as a plain byte stream. It
//! is independent of the ZIP side of the crate; the codec is `flate2`.
//!
//! ## Example
//!
//! ```rust
//! use std::io::{Read, Write};
//! use zipnav_archive::gzip::{GzipMode, GzipStream};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let path = dir.path().join("hello.gz");
//!
//! let mut gz = GzipStream::with_path(&path);
//! gz.open(GzipMode::Write).unwrap();
//! gz.write_all(b"Hello, gzip!").unwrap();
//! gz.close().unwrap();
//!
//! gz.open(GzipMode::Read).unwrap();
//! let mut text = String::new();
//! gz.read_to_string(&mut text).unwrap();
//! assert_eq!(text, "Hello, gzip!");
//! ```

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use zipnav_core::error::{Result, ZipError};

/// Default compression level for writing.
pub const DEFAULT_LEVEL: u32 = 6;

/// Direction a [`GzipStream`] is opened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GzipMode {
    /// Decompress from the file.
    Read,
    /// Compress into the file, truncating it.
    Write,
}

enum Inner {
    Closed,
    Read(MultiGzDecoder<BufReader<File>>),
    Write(GzEncoder<File>),
}

/// A gzip file opened for reading or for writing.
pub struct GzipStream {
    file_name: Option<PathBuf>,
    level: u32,
    inner: Inner,
}

impl Default for GzipStream {
    fn default() -> Self {
        Self::new()
    }
}

impl GzipStream {
    /// A stream with no file name; open it with [`open_file`](Self::open_file).
    pub fn new() -> Self {
        Self {
            file_name: None,
            level: DEFAULT_LEVEL,
            inner: Inner::Closed,
        }
    }

    /// A stream over the file at `path`.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        let mut stream = Self::new();
        stream.file_name = Some(path.as_ref().to_path_buf());
        stream
    }

    /// Set the file opened by [`open`](Self::open).
    pub fn set_file_name(&mut self, path: impl AsRef<Path>) {
        self.file_name = Some(path.as_ref().to_path_buf());
    }

    /// The configured file name.
    pub fn file_name(&self) -> Option<&Path> {
        self.file_name.as_deref()
    }

    /// Set the compression level (0-9) used by the next write open.
    pub fn set_level(&mut self, level: u32) {
        self.level = level.min(9);
    }

    /// Builder form of [`set_level`](Self::set_level).
    pub fn with_level(mut self, level: u32) -> Self {
        self.set_level(level);
        self
    }

    /// The compression level.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Always true: gzip data can only be walked front to back.
    pub fn is_sequential(&self) -> bool {
        true
    }

    /// Whether the stream is open.
    pub fn is_open(&self) -> bool {
        !matches!(self.inner, Inner::Closed)
    }

    /// The direction the stream is open in.
    pub fn mode(&self) -> Option<GzipMode> {
        match self.inner {
            Inner::Closed => None,
            Inner::Read(_) => Some(GzipMode::Read),
            Inner::Write(_) => Some(GzipMode::Write),
        }
    }

    /// Open the configured file.
    pub fn open(&mut self, mode: GzipMode) -> Result<()> {
        self.ensure_closed()?;
        let Some(path) = self.file_name.clone() else {
            return Err(usage("open: no file name set"));
        };
        let file = match mode {
            GzipMode::Read => File::open(&path),
            GzipMode::Write => File::create(&path),
        }
        .map_err(|err| ZipError::open_failed(path.display().to_string(), err.to_string()))?;
        self.bind(file, mode);
        Ok(())
    }

    /// Open over a file the caller already opened.
    pub fn open_file(&mut self, file: File, mode: GzipMode) -> Result<()> {
        self.ensure_closed()?;
        self.bind(file, mode);
        Ok(())
    }

    /// Open over an already-open descriptor.
    #[cfg(unix)]
    pub fn open_fd(&mut self, fd: std::os::fd::OwnedFd, mode: GzipMode) -> Result<()> {
        self.open_file(File::from(fd), mode)
    }

    fn ensure_closed(&self) -> Result<()> {
        if self.is_open() {
            return Err(usage("open: gzip stream is already open"));
        }
        Ok(())
    }

    fn bind(&mut self, file: File, mode: GzipMode) {
        self.inner = match mode {
            GzipMode::Read => Inner::Read(MultiGzDecoder::new(BufReader::new(file))),
            GzipMode::Write => Inner::Write(GzEncoder::new(file, Compression::new(self.level))),
        };
        log::debug!("gzip stream opened for {:?}", mode);
    }

    /// Close the stream, writing the gzip trailer in write mode.
    ///
    /// Closing a closed stream does nothing.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.inner, Inner::Closed) {
            Inner::Closed | Inner::Read(_) => Ok(()),
            Inner::Write(encoder) => {
                let mut file = encoder.finish()?;
                file.flush()?;
                log::debug!("gzip stream finished");
                Ok(())
            }
        }
    }
}

fn usage(message: &str) -> ZipError {
    log::warn!("{}", message);
    ZipError::usage(message)
}

impl Read for GzipStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.inner {
            Inner::Read(decoder) => decoder.read(buf),
            Inner::Write(_) => Err(usage("read: gzip stream is open for writing").into()),
            Inner::Closed => Err(usage("read: gzip stream is not open").into()),
        }
    }
}

impl Write for GzipStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Inner::Write(encoder) = &mut self.inner else {
            return Err(usage("write: gzip stream is not open for writing").into());
        };
        if buf.is_empty() {
            return Ok(0);
        }
        match encoder.write(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "gzip encoder accepted no bytes",
            )),
            n => Ok(n),
        }
    }

    /// Sync-flush the compressor so everything written so far can be
    /// decoded from the file.
    fn flush(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Inner::Write(encoder) => encoder.flush(),
            _ => Err(usage("flush: gzip stream is not open for writing").into()),
        }
    }
}

impl Drop for GzipStream {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("error closing gzip stream on drop: {}", err);
        }
    }
}

impl std::fmt::Debug for GzipStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GzipStream")
            .field("file_name", &self.file_name)
            .field("level", &self.level)
            .field("mode", &self.mode())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use zipnav_core::codes;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.gz");
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 97) as u8).collect();

        let mut gz = GzipStream::with_path(&path).with_level(9);
        gz.open(GzipMode::Write).unwrap();
        assert_eq!(gz.mode(), Some(GzipMode::Write));
        gz.write_all(&data).unwrap();
        gz.close().unwrap();
        assert!(!gz.is_open());

        gz.open(GzipMode::Read).unwrap();
        let mut back = Vec::new();
        gz.read_to_end(&mut back).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn test_with_path_keeps_defaults() {
        let gz = GzipStream::with_path("notes.gz");
        assert_eq!(gz.file_name(), Some(Path::new("notes.gz")));
        assert_eq!(gz.level(), DEFAULT_LEVEL);
        assert!(!gz.is_open());
        assert_eq!(gz.mode(), None);
    }

    #[test]
    fn test_sync_flush_makes_data_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flushed.gz");

        let mut gz = GzipStream::with_path(&path);
        gz.open(GzipMode::Write).unwrap();
        gz.write_all(b"first part").unwrap();
        gz.flush().unwrap();

        // The member is unfinished, but everything before the flush decodes.
        let partial = std::fs::read(&path).unwrap();
        let mut decoder = GzDecoder::new(&partial[..]);
        let mut out = [0u8; 10];
        decoder.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"first part");

        gz.write_all(b", second part").unwrap();
        gz.close().unwrap();

        let mut text = String::new();
        GzDecoder::new(File::open(&path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "first part, second part");
    }

    #[test]
    fn test_direction_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dir.gz");
        let mut gz = GzipStream::with_path(&path);
        gz.open(GzipMode::Write).unwrap();
        assert_eq!(gz.write(b"").unwrap(), 0);
        let mut buf = [0u8; 4];
        assert!(gz.read(&mut buf).is_err());
        gz.close().unwrap();

        gz.open(GzipMode::Read).unwrap();
        assert_eq!(gz.flush().unwrap_err().kind(), io::ErrorKind::InvalidInput);
        assert!(gz.write(b"x").is_err());
    }

    #[test]
    fn test_open_twice_and_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("twice.gz");
        let mut gz = GzipStream::with_path(&path);
        gz.open(GzipMode::Write).unwrap();
        assert!(gz.open(GzipMode::Write).unwrap_err().is_usage());
        gz.close().unwrap();

        let mut missing = GzipStream::with_path(dir.path().join("missing.gz"));
        let err = missing.open(GzipMode::Read).unwrap_err();
        assert_eq!(err.code(), codes::OPEN_ERROR);
        assert!(!missing.is_open());

        assert!(GzipStream::new().open(GzipMode::Read).unwrap_err().is_usage());
    }

    #[cfg(unix)]
    #[test]
    fn test_open_fd() {
        use std::os::fd::OwnedFd;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fd.gz");
        let mut gz = GzipStream::new();
        gz.open_fd(OwnedFd::from(File::create(&path).unwrap()), GzipMode::Write)
            .unwrap();
        gz.write_all(b"via descriptor").unwrap();
        gz.close().unwrap();

        gz.open_fd(OwnedFd::from(File::open(&path).unwrap()), GzipMode::Read)
            .unwrap();
        let mut text = String::new();
        gz.read_to_string(&mut text).unwrap();
        assert_eq!(text, "via descriptor");
    }
}
