//! Entry streams.
//!
//! [`EntryReader`] and [`EntryWriter`] turn the selected (or a new) entry of
//! a [`ZipArchive`] into a plain `std::io` stream. Both keep the archive
//! mutably borrowed for their whole life, so only one entry per archive can
//! be open at a time.

use super::archive::{Mode, ZipArchive};
use super::index::CaseSensitivity;
use super::writer::EntrySpec;
use chrono::{DateTime, Utc};
use std::io::{self, BufRead, Read, Write};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use zipnav_core::entry::{CompressionMethod, EntryMetadata, NewEntry, ext_time, extended_time};
use zipnav_core::error::{Result, ZipError, codes};

/// Read-ahead buffer of an [`EntryReader`].
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// The archive a stream works on.
pub enum ArchiveBinding<'z, 'a> {
    /// An archive owned by the caller.
    Borrowed(&'z mut ZipArchive<'a>),
    /// An archive the stream opened itself and closes with the entry.
    Private(Box<ZipArchive<'a>>),
}

impl<'z, 'a> From<&'z mut ZipArchive<'a>> for ArchiveBinding<'z, 'a> {
    fn from(archive: &'z mut ZipArchive<'a>) -> Self {
        Self::Borrowed(archive)
    }
}

impl<'a> Deref for ArchiveBinding<'_, 'a> {
    type Target = ZipArchive<'a>;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Borrowed(archive) => archive,
            Self::Private(archive) => archive,
        }
    }
}

impl DerefMut for ArchiveBinding<'_, '_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Borrowed(archive) => archive,
            Self::Private(archive) => archive,
        }
    }
}

impl ArchiveBinding<'_, '_> {
    fn is_private(&self) -> bool {
        matches!(self, Self::Private(_))
    }
}

/// Options for opening an entry for reading.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions<'p> {
    /// Deliver the stored bytes without decompressing or decrypting.
    pub raw: bool,
    /// Password for encrypted entries.
    pub password: Option<&'p [u8]>,
}

impl<'p> ReadOptions<'p> {
    /// Read stored bytes as they are.
    pub fn raw() -> Self {
        Self {
            raw: true,
            password: None,
        }
    }

    /// Decrypt with `password`.
    pub fn with_password(mut self, password: &'p [u8]) -> Self {
        self.password = Some(password);
        self
    }
}

/// Options for writing a new entry.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions<'p> {
    /// Compression method.
    pub method: CompressionMethod,
    /// DEFLATE level, 0 to 9.
    pub level: u32,
    /// The caller supplies already-compressed bytes.
    pub raw: bool,
    /// Password for encrypting the entry.
    pub password: Option<&'p [u8]>,
    /// CRC-32 committed for raw entries.
    pub crc: u32,
}

impl Default for WriteOptions<'_> {
    fn default() -> Self {
        Self {
            method: CompressionMethod::Deflate,
            level: 6,
            raw: false,
            password: None,
            crc: 0,
        }
    }
}

impl<'p> WriteOptions<'p> {
    /// Store the entry without compression.
    pub fn stored() -> Self {
        Self {
            method: CompressionMethod::Stored,
            ..Self::default()
        }
    }

    /// Write pre-compressed bytes carrying the given CRC-32.
    pub fn raw(method: CompressionMethod, crc: u32) -> Self {
        Self {
            method,
            raw: true,
            crc,
            ..Self::default()
        }
    }

    /// Set the compression level.
    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level.min(9);
        self
    }

    /// Encrypt with `password`.
    pub fn with_password(mut self, password: &'p [u8]) -> Self {
        self.password = Some(password);
        self
    }
}

/// Records a stream operation's outcome on the stream and its archive.
fn settle<T>(
    archive: &mut ZipArchive<'_>,
    last_error: &mut i32,
    result: Result<T>,
) -> Result<T> {
    match result {
        Ok(value) => {
            archive.set_last_error(codes::OK);
            *last_error = codes::OK;
            Ok(value)
        }
        Err(err) => {
            let err = archive.fail(err);
            *last_error = err.code();
            Err(err)
        }
    }
}

/// Read access to the selected entry of an archive.
///
/// Opening consumes the selection's metadata once; reads go through an
/// internal buffer, so the type also implements [`BufRead`].
pub struct EntryReader<'z, 'a> {
    archive: ArchiveBinding<'z, 'a>,
    metadata: EntryMetadata,
    raw: bool,
    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
    open: bool,
    last_error: i32,
}

impl<'z, 'a> EntryReader<'z, 'a> {
    /// Open the selected entry of an archive in [`Mode::Unzip`].
    pub fn open(archive: impl Into<ArchiveBinding<'z, 'a>>, options: ReadOptions<'_>) -> Result<Self> {
        let mut archive = archive.into();
        if archive.mode() != Mode::Unzip {
            return Err(archive.fail(ZipError::usage("EntryReader: archive is not open in Unzip mode")));
        }
        if !archive.has_current_file() {
            return Err(archive.fail(ZipError::usage("EntryReader: no current entry")));
        }

        let metadata = archive.current_file_info()?;
        let opened = archive
            .unzip_engine()
            .and_then(|engine| engine.open_entry(options.raw, options.password));
        let mut last_error = codes::OK;
        settle(&mut archive, &mut last_error, opened)?;

        Ok(Self {
            archive,
            metadata,
            raw: options.raw,
            buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
            pos: 0,
            filled: 0,
            open: true,
            last_error,
        })
    }

    /// Open entry `name` of the archive at `path`.
    ///
    /// The archive is private to the reader and closed with it.
    pub fn open_path(
        path: impl AsRef<Path>,
        name: &str,
        cs: CaseSensitivity,
        options: ReadOptions<'_>,
    ) -> Result<EntryReader<'static, 'static>> {
        let mut archive = Box::new(ZipArchive::with_path(path));
        archive.open(Mode::Unzip)?;
        if !archive.set_current_file(name, cs)? || !archive.has_current_file() {
            archive.close()?;
            return Err(ZipError::entry_not_found(name));
        }
        EntryReader::open(ArchiveBinding::Private(archive), options)
    }

    /// Metadata of the entry, as read when the stream was opened.
    pub fn metadata(&self) -> &EntryMetadata {
        &self.metadata
    }

    /// The entry's name as stored in the archive.
    ///
    /// Differs from the requested name after a case-insensitive lookup.
    pub fn actual_file_name(&self) -> &str {
        &self.metadata.name
    }

    /// The extra field of the entry's local header.
    pub fn local_extra_field(&self) -> Option<&[u8]> {
        self.archive.unzip_engine_ref()?.local_extra()
    }

    /// Extended modification time (extra field 0x5455).
    pub fn ext_mod_time(&self) -> Option<DateTime<Utc>> {
        self.metadata
            .ext_mod_time()
            .or_else(|| self.local_ext_time(ext_time::MODIFIED))
    }

    /// Extended access time; only local headers carry it.
    pub fn ext_ac_time(&self) -> Option<DateTime<Utc>> {
        self.local_ext_time(ext_time::ACCESSED)
    }

    /// Extended creation time; only local headers carry it.
    pub fn ext_cr_time(&self) -> Option<DateTime<Utc>> {
        self.local_ext_time(ext_time::CREATED)
    }

    fn local_ext_time(&self, which: u8) -> Option<DateTime<Utc>> {
        extended_time(self.local_extra_field()?, which)
    }

    /// Compression method of the entry.
    pub fn compression_method(&self) -> CompressionMethod {
        self.metadata.compression_method()
    }

    /// DEFLATE level hinted by the entry's flag bits; 0 for stored entries.
    pub fn compression_level(&self) -> u32 {
        if self.compression_method() != CompressionMethod::Deflate {
            return 0;
        }
        match (self.metadata.flags >> 1) & 0x3 {
            1 => 9,
            2 => 2,
            3 => 1,
            _ => 6,
        }
    }

    /// Whether the stream delivers stored bytes as they are.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Bytes handed to the caller so far.
    pub fn position(&self) -> u64 {
        let produced = self
            .archive
            .unzip_engine_ref()
            .map_or(0, |engine| engine.entry_tell());
        produced - (self.filled - self.pos) as u64
    }

    /// Whether everything has been read.
    pub fn at_end(&self) -> bool {
        self.pos == self.filled
            && self
                .archive
                .unzip_engine_ref()
                .is_none_or(|engine| engine.entry_eof())
    }

    /// Total bytes the stream delivers: compressed size when raw.
    pub fn size(&self) -> u64 {
        if self.raw {
            self.metadata.compressed_size
        } else {
            self.metadata.uncompressed_size
        }
    }

    /// Bytes left to read.
    pub fn bytes_available(&self) -> u64 {
        self.size().saturating_sub(self.position())
    }

    /// Result code of the last operation on this stream.
    pub fn last_error_code(&self) -> i32 {
        self.last_error
    }

    /// Close the entry, checking its CRC when it was fully read.
    ///
    /// A private archive is closed as well. On failure the stream stays
    /// open.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let closed = self.archive.unzip_engine().and_then(|engine| engine.close_entry());
        settle(&mut self.archive, &mut self.last_error, closed)?;
        self.open = false;
        self.pos = 0;
        self.filled = 0;

        if self.archive.is_private() {
            let closed = self.archive.close();
            self.last_error = self.archive.last_error_code();
            closed?;
        }
        Ok(())
    }

    fn engine_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open {
            return Err(ZipError::usage("read on a closed entry").into());
        }
        let result = self
            .archive
            .unzip_engine()
            .and_then(|engine| engine.read_entry(buf));
        Ok(settle(&mut self.archive, &mut self.last_error, result)?)
    }
}

impl Read for EntryReader<'_, '_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Large reads skip the buffer when it is empty.
        if self.pos == self.filled && buf.len() >= self.buf.len() {
            return self.engine_read(buf);
        }
        let available = self.fill_buf()?;
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

impl BufRead for EntryReader<'_, '_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos == self.filled {
            let mut buf = std::mem::take(&mut self.buf);
            let result = self.engine_read(&mut buf);
            self.buf = buf;
            self.filled = result?;
            self.pos = 0;
        }
        Ok(&self.buf[self.pos..self.filled])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(self.filled);
    }
}

impl Drop for EntryReader<'_, '_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.close() {
                log::warn!("error closing entry {} on drop: {}", self.metadata.name, err);
            }
        }
    }
}

impl std::fmt::Debug for EntryReader<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("name", &self.metadata.name)
            .field("raw", &self.raw)
            .field("open", &self.open)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

/// Write access to a new entry of an archive.
pub struct EntryWriter<'z, 'a> {
    archive: ArchiveBinding<'z, 'a>,
    name: String,
    raw: bool,
    raw_size: u64,
    raw_crc: u32,
    written: u64,
    open: bool,
    last_error: i32,
}

impl<'z, 'a> EntryWriter<'z, 'a> {
    /// Start a new entry in an archive open in a write mode.
    pub fn open(
        archive: impl Into<ArchiveBinding<'z, 'a>>,
        entry: &NewEntry,
        options: WriteOptions<'_>,
    ) -> Result<Self> {
        let mut archive = archive.into();
        if archive.is_private() {
            return Err(ZipError::usage("EntryWriter: cannot write through a private archive"));
        }
        if !archive.mode().is_write() {
            return Err(archive.fail(ZipError::usage("EntryWriter: archive is not open for writing")));
        }

        let config = archive.config().clone();
        let spec = EntrySpec {
            entry,
            method: options.method,
            level: options.level,
            raw: options.raw,
            password: options.password,
            crc: options.crc,
            zip64: config.zip64,
            utf8: config.utf8,
            version_made_by: config.version_made_by(),
        };
        let opened = archive.zip_engine().and_then(|engine| {
            engine.set_write_descriptor(config.data_descriptor);
            engine.open_entry(&spec)
        });
        let mut last_error = codes::OK;
        settle(&mut archive, &mut last_error, opened)?;

        Ok(Self {
            archive,
            name: entry.name.clone(),
            raw: options.raw,
            raw_size: entry.uncompressed_size,
            raw_crc: options.crc,
            written: 0,
            open: true,
            last_error,
        })
    }

    /// Name of the entry being written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the caller supplies already-compressed bytes.
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Bytes accepted so far.
    pub fn position(&self) -> u64 {
        self.written
    }

    /// Same as [`position`](Self::position).
    pub fn size(&self) -> u64 {
        self.written
    }

    /// Always true: a write stream has nothing to read.
    pub fn at_end(&self) -> bool {
        true
    }

    /// Result code of the last operation on this stream.
    pub fn last_error_code(&self) -> i32 {
        self.last_error
    }

    /// Finish the entry.
    ///
    /// Raw entries commit the CRC from [`WriteOptions::crc`] and the size
    /// from [`NewEntry::uncompressed_size`]. On failure the stream stays
    /// open.
    pub fn close(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let (raw_size, raw_crc) = (self.raw_size, self.raw_crc);
        let closed = self
            .archive
            .zip_engine()
            .and_then(|engine| engine.close_entry(raw_size, raw_crc));
        settle(&mut self.archive, &mut self.last_error, closed)?;
        self.open = false;
        Ok(())
    }
}

impl Write for EntryWriter<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.open {
            return Err(ZipError::usage("write on a closed entry").into());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        let result = self
            .archive
            .zip_engine()
            .and_then(|engine| engine.write_entry(buf));
        let accepted = settle(&mut self.archive, &mut self.last_error, result)?;
        if accepted == 0 {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("entry {} accepted no bytes", self.name),
            ));
        }
        self.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for EntryWriter<'_, '_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.close() {
                log::warn!("error closing entry {} on drop: {}", self.name, err);
            }
        }
    }
}

impl std::fmt::Debug for EntryWriter<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryWriter")
            .field("name", &self.name)
            .field("raw", &self.raw)
            .field("written", &self.written)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}
