//! The archive handle.

use super::DeviceRef;
use super::header::{CentralRecord, EndOfCentralDirectory};
use super::index::{CaseSensitivity, EntryCursor, EntryIndex, EntryLocation, MAX_FILE_NAME_LENGTH};
use super::unzip::UnzipEngine;
use super::writer::{WriteStart, ZipEngine};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use zipnav_core::device::Device;
use zipnav_core::entry::EntryMetadata;
use zipnav_core::error::{Result, ZipError, codes};

/// OS code stamped into "version made by" unless configured otherwise (Unix).
pub const DEFAULT_OS_CODE: u8 = 3;

/// Format version written next to the OS code (3.0).
const FORMAT_VERSION: u16 = 0x1E;

/// How an archive is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Not open.
    #[default]
    NotOpen,
    /// Read entries of an existing archive.
    Unzip,
    /// Write a new archive from the current device position.
    Create,
    /// Write a new archive after the existing device content.
    Append,
    /// Add entries to an existing archive in place.
    Add,
}

impl Mode {
    /// Whether entries can be written in this mode.
    pub fn is_write(self) -> bool {
        matches!(self, Self::Create | Self::Append | Self::Add)
    }
}

/// Per-archive settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Write zip64 sizes for new entries.
    pub zip64: bool,
    /// Flag new entry names and comments as UTF-8.
    pub utf8: bool,
    /// Write data descriptors after entry data instead of patching headers.
    pub data_descriptor: bool,
    /// Call [`Device::close`] on a lent device when the archive closes.
    pub auto_close: bool,
    /// OS code for "version made by".
    pub os_code: u8,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            zip64: false,
            utf8: false,
            data_descriptor: true,
            auto_close: true,
            os_code: DEFAULT_OS_CODE,
        }
    }
}

impl ArchiveConfig {
    /// Enable or disable zip64 sizes for new entries.
    pub fn with_zip64(mut self, zip64: bool) -> Self {
        self.zip64 = zip64;
        self
    }

    /// Enable or disable the UTF-8 name flag.
    pub fn with_utf8(mut self, utf8: bool) -> Self {
        self.utf8 = utf8;
        self
    }

    /// Enable or disable data descriptor writing.
    pub fn with_data_descriptor(mut self, enabled: bool) -> Self {
        self.data_descriptor = enabled;
        self
    }

    /// Enable or disable closing a lent device on archive close.
    pub fn with_auto_close(mut self, auto_close: bool) -> Self {
        self.auto_close = auto_close;
        self
    }

    /// Set the OS code.
    pub fn with_os_code(mut self, os_code: u8) -> Self {
        self.os_code = os_code;
        self
    }

    pub(crate) fn version_made_by(&self) -> u16 {
        (u16::from(self.os_code) << 8) | FORMAT_VERSION
    }
}

/// Engine state, one arm per family of modes.
enum Engine<'a> {
    Closed,
    Unzip(UnzipEngine<'a>),
    Zip(ZipEngine<'a>),
}

/// One ZIP archive bound to a file path or a lent device.
///
/// Opening in [`Mode::Unzip`] gives name lookup and enumeration over the
/// central directory; the write modes accept new entries through
/// [`EntryWriter`](super::EntryWriter). Every fallible operation also leaves
/// its result code in [`last_error_code`](Self::last_error_code).
///
/// # Example
///
/// ```rust
/// use std::io::{Cursor, Read, Write};
/// use zipnav_archive::zip::{
///     CaseSensitivity, EntryReader, EntryWriter, Mode, ReadOptions, WriteOptions, ZipArchive,
/// };
/// use zipnav_core::NewEntry;
///
/// let mut buf = Cursor::new(Vec::new());
///
/// let mut archive = ZipArchive::with_device(&mut buf);
/// archive.open(Mode::Create).unwrap();
/// let mut writer =
///     EntryWriter::open(&mut archive, &NewEntry::new("hello.txt"), WriteOptions::default())
///         .unwrap();
/// writer.write_all(b"Hello, zip!").unwrap();
/// writer.close().unwrap();
/// drop(writer);
/// archive.close().unwrap();
/// drop(archive);
///
/// let mut archive = ZipArchive::with_device(&mut buf);
/// archive.open(Mode::Unzip).unwrap();
/// assert!(archive.set_current_file("HELLO.TXT", CaseSensitivity::Insensitive).unwrap());
/// let mut reader = EntryReader::open(&mut archive, ReadOptions::default()).unwrap();
/// let mut text = String::new();
/// reader.read_to_string(&mut text).unwrap();
/// assert_eq!(text, "Hello, zip!");
/// ```
pub struct ZipArchive<'a> {
    zip_name: Option<PathBuf>,
    device: Option<&'a mut (dyn Device + 'a)>,
    config: ArchiveConfig,
    comment: Option<String>,
    mode: Mode,
    engine: Engine<'a>,
    cursor: EntryCursor,
    index: EntryIndex,
    last_error: i32,
}

impl<'a> Default for ZipArchive<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ZipArchive<'a> {
    /// An archive with no source configured.
    pub fn new() -> Self {
        Self {
            zip_name: None,
            device: None,
            config: ArchiveConfig::default(),
            comment: None,
            mode: Mode::NotOpen,
            engine: Engine::Closed,
            cursor: EntryCursor::default(),
            index: EntryIndex::new(),
            last_error: codes::OK,
        }
    }

    /// An archive that opens the file at `path`.
    pub fn with_path(path: impl AsRef<Path>) -> Self {
        let mut archive = Self::new();
        archive.zip_name = Some(path.as_ref().to_path_buf());
        archive
    }

    /// An archive over a lent device.
    pub fn with_device<D: Device + 'a>(device: &'a mut D) -> Self {
        let mut archive = Self::new();
        archive.device = Some(device);
        archive
    }

    /// Use the file at `path` for the next open.
    pub fn set_zip_name(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_open() {
            return Err(self.usage("set_zip_name: archive is already open"));
        }
        self.zip_name = Some(path.as_ref().to_path_buf());
        self.device = None;
        Ok(())
    }

    /// Use a lent device for the next open.
    pub fn set_device<D: Device + 'a>(&mut self, device: &'a mut D) -> Result<()> {
        if self.is_open() {
            return Err(self.usage("set_device: archive is already open"));
        }
        self.device = Some(device);
        self.zip_name = None;
        Ok(())
    }

    /// Path the archive opens, if it was configured with one.
    pub fn zip_name(&self) -> Option<&Path> {
        self.zip_name.as_deref()
    }

    /// Current settings.
    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Mutable settings; changes apply to the next open or the next entry.
    pub fn config_mut(&mut self) -> &mut ArchiveConfig {
        &mut self.config
    }

    /// Replace the settings.
    pub fn set_config(&mut self, config: ArchiveConfig) {
        self.config = config;
    }

    /// Set the global comment written when a write-mode archive closes.
    ///
    /// In [`Mode::Add`] the existing comment is kept unless one is set here.
    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = Some(comment.into());
    }

    /// The mode the archive is open in.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether the archive is open.
    pub fn is_open(&self) -> bool {
        self.mode != Mode::NotOpen
    }

    /// Whether an entry is selected.
    pub fn has_current_file(&self) -> bool {
        self.cursor.has_current()
    }

    /// Result code of the last operation; [`codes::OK`] after a success.
    pub fn last_error_code(&self) -> i32 {
        self.last_error
    }

    /// The name index built so far.
    pub fn index(&self) -> &EntryIndex {
        &self.index
    }

    /// Open the archive.
    ///
    /// Anything but [`Mode::Create`] needs a random-access device. A device
    /// opened from the configured path is owned by the archive; a lent device
    /// goes back to the archive's device slot when opening fails.
    pub fn open(&mut self, mode: Mode) -> Result<()> {
        self.last_error = codes::OK;
        if self.is_open() {
            return Err(self.usage("open: archive is already open"));
        }
        if mode == Mode::NotOpen {
            return Err(self.usage("open: cannot open in NotOpen mode"));
        }

        let mut device = match (self.device.take(), self.zip_name.clone()) {
            (Some(device), _) => DeviceRef::Borrowed(device),
            (None, Some(path)) => match open_file(&path, mode) {
                Ok(file) => DeviceRef::Owned(Box::new(file)),
                Err(err) => {
                    let err = ZipError::open_failed(path.display().to_string(), err.to_string());
                    return Err(self.fail(err));
                }
            },
            (None, None) => {
                return Err(self.usage("open: set either a file name or a device first"));
            }
        };

        if device.is_sequential() && mode != Mode::Create {
            self.give_back(device);
            return Err(self.usage("open: only Create can be used with sequential devices"));
        }

        let engine = match mode {
            Mode::Unzip => EndOfCentralDirectory::locate(&mut *device).map(Prepared::Unzip),
            Mode::Create => WriteStart::create(&mut *device).map(Prepared::Zip),
            Mode::Append => WriteStart::append(&mut *device).map(Prepared::Zip),
            Mode::Add => WriteStart::add(&mut *device).map(Prepared::Zip),
            Mode::NotOpen => Err(ZipError::usage("open: cannot open in NotOpen mode")),
        };

        self.engine = match engine {
            Ok(Prepared::Unzip(eocd)) => Engine::Unzip(UnzipEngine::new(device, eocd)),
            Ok(Prepared::Zip(start)) => Engine::Zip(ZipEngine::new(device, start)),
            Err(err) => {
                self.give_back(device);
                return Err(self.fail(err));
            }
        };
        self.mode = mode;
        log::debug!("archive opened in {:?} mode", mode);
        Ok(())
    }

    /// Close the archive.
    ///
    /// Write modes write the central directory and the global comment. The
    /// index and the selection are cleared either way. Closing an archive
    /// that is not open does nothing.
    pub fn close(&mut self) -> Result<()> {
        self.last_error = codes::OK;
        if self.mode.is_write()
            && self
                .comment
                .as_ref()
                .is_some_and(|c| c.len() > usize::from(u16::MAX))
        {
            return Err(self.fail(ZipError::invalid_parameter("archive comment too long")));
        }
        let engine = std::mem::replace(&mut self.engine, Engine::Closed);
        let mode = std::mem::replace(&mut self.mode, Mode::NotOpen);
        self.index.clear();
        self.cursor.clear();

        let (finished, device) = match engine {
            Engine::Closed => return Ok(()),
            Engine::Unzip(engine) => {
                if engine.is_entry_open() {
                    log::warn!("closing archive with an entry still open");
                }
                (Ok(()), engine.into_device())
            }
            Engine::Zip(mut engine) => {
                log::debug!("finishing archive with {} entries", engine.entries());
                let comment = self.comment.as_deref().map(str::as_bytes);
                let finished = engine.finish(comment, self.config.version_made_by());
                (finished, engine.into_device())
            }
        };
        let released = self.release(device);
        log::debug!("archive closed ({:?} mode)", mode);
        finished.and(released).map_err(|err| self.fail(err))
    }

    /// Number of entries in the directory.
    pub fn entries_count(&mut self) -> Result<u64> {
        self.last_error = codes::OK;
        match &self.engine {
            Engine::Unzip(engine) => Ok(engine.entries()),
            _ => Err(self.usage("entries_count: archive is not open in Unzip mode")),
        }
    }

    /// The global comment of the archive being read.
    pub fn comment(&mut self) -> Result<String> {
        self.last_error = codes::OK;
        match &self.engine {
            Engine::Unzip(engine) => Ok(String::from_utf8_lossy(engine.comment()).into_owned()),
            _ => Err(self.usage("comment: archive is not open in Unzip mode")),
        }
    }

    /// Select the entry called `name`.
    ///
    /// Returns `Ok(false)` when no entry matches, leaving nothing selected.
    /// An empty name deselects and returns `Ok(true)`. Names already seen are
    /// found without scanning; otherwise the scan resumes after the furthest
    /// record seen so far.
    pub fn set_current_file(&mut self, name: &str, cs: CaseSensitivity) -> Result<bool> {
        self.last_error = codes::OK;
        self.require_unzip("set_current_file")?;
        if name.is_empty() {
            self.cursor.clear();
            return Ok(true);
        }
        if name.chars().count() > MAX_FILE_NAME_LENGTH {
            let err = ZipError::invalid_parameter(format!(
                "entry name longer than {MAX_FILE_NAME_LENGTH} characters"
            ));
            return Err(self.fail(err));
        }

        let cs = cs.resolve();
        self.cursor.clear();

        if let Some(location) = self.index.lookup(name, cs) {
            let result = self.unzip_engine()?.go_to(location);
            return self.settle(result).map(|_| true);
        }

        let mut more = self.go_to_first_unmapped_file()?;
        while more {
            let current = self.current_file_name()?;
            if cs.matches(&current, name) {
                return Ok(true);
            }
            more = self.go_to_next_file()?;
        }
        Ok(false)
    }

    /// Select the first entry; `Ok(false)` for an empty archive.
    pub fn go_to_first_file(&mut self) -> Result<bool> {
        self.last_error = codes::OK;
        self.require_unzip("go_to_first_file")?;
        let result = self.unzip_engine()?.go_to_first();
        self.settle(result)
    }

    /// Select the next entry; `Ok(false)` past the last one.
    pub fn go_to_next_file(&mut self) -> Result<bool> {
        self.last_error = codes::OK;
        self.require_unzip("go_to_next_file")?;
        let result = self.unzip_engine()?.go_to_next();
        self.settle(result)
    }

    fn go_to_first_unmapped_file(&mut self) -> Result<bool> {
        let resume = self.index.resume_point();
        let engine = self.unzip_engine()?;
        let result = match resume {
            None => engine.go_to_first(),
            Some(location) => engine.go_to(location),
        };
        self.settle(result)
    }

    /// Name of the selected entry.
    pub fn current_file_name(&mut self) -> Result<String> {
        self.last_error = codes::OK;
        self.require_unzip("current_file_name")?;
        let (location, record) = self.current_record()?;
        let name = record.name_string();
        let record_len = record.disk_len();
        self.index.record(&name, location, record_len);
        Ok(name)
    }

    /// Metadata of the selected entry.
    pub fn current_file_info(&mut self) -> Result<EntryMetadata> {
        self.last_error = codes::OK;
        self.require_unzip("current_file_info")?;
        let (location, record) = self.current_record()?;
        let info = record.to_metadata();
        let record_len = record.disk_len();
        self.index.record(&info.name, location, record_len);
        Ok(info)
    }

    /// Names of all entries, in directory order.
    ///
    /// The selection is restored afterwards; with nothing selected before,
    /// the first entry ends up selected.
    pub fn file_name_list(&mut self) -> Result<Vec<String>> {
        self.collect_entries("file_name_list", Self::current_file_name)
    }

    /// Metadata of all entries, in directory order.
    ///
    /// Restores the selection like [`file_name_list`](Self::file_name_list).
    pub fn file_info_list(&mut self) -> Result<Vec<EntryMetadata>> {
        self.collect_entries("file_info_list", Self::current_file_info)
    }

    fn collect_entries<T>(
        &mut self,
        op: &str,
        mut visit: impl FnMut(&mut Self) -> Result<T>,
    ) -> Result<Vec<T>> {
        self.last_error = codes::OK;
        self.require_unzip(op)?;
        let previous = if self.cursor.has_current() {
            Some(self.current_file_name()?)
        } else {
            None
        };

        let mut items = Vec::new();
        let mut more = self.go_to_first_file()?;
        while more {
            items.push(visit(self)?);
            more = self.go_to_next_file()?;
        }

        match previous {
            Some(name) => {
                self.set_current_file(&name, CaseSensitivity::Sensitive)?;
            }
            None => {
                self.go_to_first_file()?;
            }
        }
        Ok(items)
    }

    pub(crate) fn unzip_engine(&mut self) -> Result<&mut UnzipEngine<'a>> {
        match &mut self.engine {
            Engine::Unzip(engine) => Ok(engine),
            _ => Err(ZipError::usage("archive is not open in Unzip mode")),
        }
    }

    pub(crate) fn unzip_engine_ref(&self) -> Option<&UnzipEngine<'a>> {
        match &self.engine {
            Engine::Unzip(engine) => Some(engine),
            _ => None,
        }
    }

    pub(crate) fn zip_engine(&mut self) -> Result<&mut ZipEngine<'a>> {
        match &mut self.engine {
            Engine::Zip(engine) => Ok(engine),
            _ => Err(ZipError::usage("archive is not open in a write mode")),
        }
    }

    /// The selected entry's central record.
    pub(crate) fn current_record(&mut self) -> Result<(EntryLocation, &CentralRecord)> {
        if !self.cursor.has_current() {
            return Err(self.usage("no current entry"));
        }
        let engine = self.unzip_engine()?;
        engine
            .current()
            .ok_or_else(|| ZipError::usage("no current entry"))
    }

    pub(crate) fn set_last_error(&mut self, code: i32) {
        self.last_error = code;
    }

    /// Store the code of a failed operation and hand the error back.
    pub(crate) fn fail(&mut self, err: ZipError) -> ZipError {
        if err.is_usage() {
            log::warn!("{}", err);
        }
        self.last_error = err.code();
        err
    }

    fn usage(&mut self, message: &str) -> ZipError {
        self.fail(ZipError::usage(message))
    }

    fn require_unzip(&mut self, op: &str) -> Result<()> {
        if self.mode == Mode::Unzip {
            return Ok(());
        }
        Err(self.usage(&format!("{op}: archive is not open in Unzip mode")))
    }

    /// Turn a cursor move into the selection state.
    fn settle(&mut self, result: Result<()>) -> Result<bool> {
        let location = match (&result, &self.engine) {
            (Ok(()), Engine::Unzip(engine)) => engine.current().map(|(location, _)| location),
            _ => None,
        };
        match (result, location) {
            (Ok(()), Some(location)) => {
                self.cursor.select(location);
                Ok(true)
            }
            (Ok(()), None) | (Err(ZipError::EndOfList), _) => {
                self.cursor.clear();
                Ok(false)
            }
            (Err(err), _) => {
                self.cursor.clear();
                Err(self.fail(err))
            }
        }
    }

    /// Put a device back where it came from after a failed open.
    fn give_back(&mut self, device: DeviceRef<'a>) {
        if let DeviceRef::Borrowed(device) = device {
            self.device = Some(device);
        }
    }

    /// Release the device at close.
    fn release(&mut self, device: DeviceRef<'a>) -> Result<()> {
        match device {
            DeviceRef::Owned(mut device) => device.close().map_err(ZipError::from),
            DeviceRef::Borrowed(device) => {
                let closed = if self.config.auto_close {
                    device.close()
                } else {
                    Ok(())
                };
                self.device = Some(device);
                closed.map_err(ZipError::from)
            }
        }
    }
}

impl Drop for ZipArchive<'_> {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(err) = self.close() {
                log::warn!("error closing archive on drop: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for ZipArchive<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipArchive")
            .field("zip_name", &self.zip_name)
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("cursor", &self.cursor)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

/// Engine-specific result of the preparation step of `open`.
enum Prepared {
    Unzip(EndOfCentralDirectory),
    Zip(WriteStart),
}

fn open_file(path: &Path, mode: Mode) -> std::io::Result<File> {
    match mode {
        Mode::Unzip => File::open(path),
        Mode::Create => File::create(path),
        Mode::Append => OpenOptions::new().read(true).write(true).create(true).open(path),
        _ => OpenOptions::new().read(true).write(true).open(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::{EntryWriter, WriteOptions};
    use std::io::{Cursor, Write};
    use zipnav_core::NewEntry;
    use zipnav_core::device::Sequential;

    fn build(names: &[&str]) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut archive = ZipArchive::with_device(&mut buf);
            archive.open(Mode::Create).unwrap();
            for name in names {
                let mut writer =
                    EntryWriter::open(&mut archive, &NewEntry::new(*name), WriteOptions::default())
                        .unwrap();
                writer.write_all(name.as_bytes()).unwrap();
                writer.close().unwrap();
            }
            archive.close().unwrap();
        }
        buf.into_inner()
    }

    fn records_read(archive: &mut ZipArchive<'_>) -> u64 {
        archive.unzip_engine().unwrap().records_read()
    }

    #[test]
    fn test_open_requires_source() {
        let mut archive = ZipArchive::new();
        let err = archive.open(Mode::Unzip).unwrap_err();
        assert!(err.is_usage());
        assert_eq!(archive.last_error_code(), codes::PARAM_ERROR);
        assert!(!archive.is_open());
    }

    #[test]
    fn test_reopen_is_usage_error() {
        let mut buf = Cursor::new(build(&["a"]));
        let mut archive = ZipArchive::with_device(&mut buf);
        archive.open(Mode::Unzip).unwrap();
        assert!(archive.open(Mode::Unzip).unwrap_err().is_usage());
        assert_eq!(archive.mode(), Mode::Unzip);
    }

    #[test]
    fn test_failed_open_returns_lent_device() {
        let mut buf = Cursor::new(vec![0u8; 10]);
        let mut archive = ZipArchive::with_device(&mut buf);
        assert!(archive.open(Mode::Unzip).is_err());
        assert!(!archive.is_open());
        assert_ne!(archive.last_error_code(), codes::OK);

        // The device is still bound: a create on it works.
        archive.open(Mode::Create).unwrap();
        archive.close().unwrap();
    }

    #[test]
    fn test_sequential_device_gating() {
        let mut sink = Sequential::new(Vec::new());
        let mut archive = ZipArchive::with_device(&mut sink);
        for mode in [Mode::Unzip, Mode::Append, Mode::Add] {
            assert!(archive.open(mode).unwrap_err().is_usage());
            assert!(!archive.is_open());
        }
        archive.open(Mode::Create).unwrap();
        archive.close().unwrap();
        drop(archive);
        assert!(sink.bytes_written() >= 22);
    }

    #[test]
    fn test_usage_errors_outside_unzip() {
        let mut buf = Cursor::new(Vec::new());
        let mut archive = ZipArchive::with_device(&mut buf);
        assert!(archive.go_to_first_file().unwrap_err().is_usage());
        archive.open(Mode::Create).unwrap();
        assert!(archive.set_current_file("a", CaseSensitivity::Sensitive).unwrap_err().is_usage());
        assert!(archive.entries_count().unwrap_err().is_usage());
        assert!(archive.set_zip_name("x.zip").unwrap_err().is_usage());
    }

    #[test]
    fn test_locate_scans_once() {
        let mut buf = Cursor::new(build(&["a", "b", "c", "d"]));
        let mut archive = ZipArchive::with_device(&mut buf);
        archive.open(Mode::Unzip).unwrap();

        assert!(archive.set_current_file("c", CaseSensitivity::Sensitive).unwrap());
        assert_eq!(records_read(&mut archive), 3);
        let mark = archive.index().high_water_mark();

        // Map hit: one seek, no scan.
        assert!(archive.set_current_file("c", CaseSensitivity::Sensitive).unwrap());
        assert_eq!(records_read(&mut archive), 4);
        assert_eq!(archive.index().high_water_mark(), mark);

        // Earlier names are already mapped.
        assert!(archive.set_current_file("A", CaseSensitivity::Insensitive).unwrap());
        assert_eq!(records_read(&mut archive), 5);

        // A miss resumes after "c" and only reads "d".
        assert!(!archive.set_current_file("zzz", CaseSensitivity::Sensitive).unwrap());
        assert_eq!(records_read(&mut archive), 6);
        assert!(!archive.has_current_file());
        assert_eq!(archive.last_error_code(), codes::OK);

        // Nothing left to scan.
        assert!(!archive.set_current_file("yyy", CaseSensitivity::Sensitive).unwrap());
        assert_eq!(records_read(&mut archive), 6);
    }

    #[test]
    fn test_long_name_rejected_without_touching_index() {
        let mut buf = Cursor::new(build(&["a"]));
        let mut archive = ZipArchive::with_device(&mut buf);
        archive.open(Mode::Unzip).unwrap();
        let long = "x".repeat(MAX_FILE_NAME_LENGTH + 1);
        let err = archive.set_current_file(&long, CaseSensitivity::Sensitive).unwrap_err();
        assert_eq!(err.code(), codes::PARAM_ERROR);
        assert!(archive.index().is_empty());
        assert_eq!(records_read(&mut archive), 0);
    }

    #[test]
    fn test_empty_name_clears_selection() {
        let mut buf = Cursor::new(build(&["a"]));
        let mut archive = ZipArchive::with_device(&mut buf);
        archive.open(Mode::Unzip).unwrap();
        assert!(archive.go_to_first_file().unwrap());
        assert!(archive.set_current_file("", CaseSensitivity::Sensitive).unwrap());
        assert!(!archive.has_current_file());
    }

    #[test]
    fn test_close_clears_index_and_is_idempotent() {
        let mut buf = Cursor::new(build(&["a", "b"]));
        let mut archive = ZipArchive::with_device(&mut buf);
        archive.open(Mode::Unzip).unwrap();
        archive.file_name_list().unwrap();
        assert_eq!(archive.index().len(), 2);

        archive.close().unwrap();
        assert!(archive.index().is_empty());
        assert_eq!(archive.mode(), Mode::NotOpen);
        archive.close().unwrap();
    }

    #[test]
    fn test_version_made_by() {
        assert_eq!(ArchiveConfig::default().version_made_by(), 0x031E);
        assert_eq!(ArchiveConfig::default().with_os_code(0).version_made_by(), 0x001E);
    }
}
