//! ZIP archive navigation and entry streams.
//!
//! [`ZipArchive`] owns the open/close lifecycle of one archive and the lazy
//! name index over its central directory. [`EntryReader`] and
//! [`EntryWriter`] expose the selected entry as an ordinary byte stream.

mod archive;
mod crypto;
mod header;
mod index;
mod stream;
mod unzip;
mod writer;

pub use archive::{ArchiveConfig, DEFAULT_OS_CODE, Mode, ZipArchive};
pub use index::{CaseSensitivity, EntryCursor, EntryIndex, EntryLocation, MAX_FILE_NAME_LENGTH};
pub use stream::{ArchiveBinding, EntryReader, EntryWriter, ReadOptions, WriteOptions};

use std::ops::{Deref, DerefMut};
use zipnav_core::device::Device;

/// The device an engine works on: opened from a path, or lent by the caller.
pub(crate) enum DeviceRef<'a> {
    Owned(Box<dyn Device + 'a>),
    Borrowed(&'a mut (dyn Device + 'a)),
}

impl<'a> Deref for DeviceRef<'a> {
    type Target = dyn Device + 'a;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(device) => device.as_ref(),
            Self::Borrowed(device) => &**device,
        }
    }
}

impl DerefMut for DeviceRef<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(device) => device.as_mut(),
            Self::Borrowed(device) => &mut **device,
        }
    }
}
