//! Entry metadata.
//!
//! [`EntryMetadata`] is the read-side snapshot of one directory record;
//! [`NewEntry`] describes an entry about to be written.

use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveDateTime, Timelike, Utc};
use std::path::Path;

/// General purpose flag: entry is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// General purpose flag: sizes and CRC follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// General purpose flag: name and comment are UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Info-ZIP extended timestamp extra field ID.
pub const EXT_TIME_FIELD_ID: u16 = 0x5455;

/// Extended timestamp flag bits.
pub mod ext_time {
    /// Modification time present.
    pub const MODIFIED: u8 = 0x01;
    /// Access time present.
    pub const ACCESSED: u8 = 0x02;
    /// Creation time present.
    pub const CREATED: u8 = 0x04;
}

/// Compression method used for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CompressionMethod {
    /// No compression (stored).
    Stored,
    /// DEFLATE compression.
    #[default]
    Deflate,
    /// Unknown/unsupported method.
    Unknown(u16),
}

impl CompressionMethod {
    /// Create from the on-disk method number.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::Stored,
            8 => Self::Deflate,
            _ => Self::Unknown(value),
        }
    }

    /// The on-disk method number.
    pub fn to_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
            Self::Unknown(id) => id,
        }
    }

    /// Get the method name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stored => "Stored",
            Self::Deflate => "Deflate",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl std::fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(id) => write!(f, "Unknown({})", id),
            _ => write!(f, "{}", self.name()),
        }
    }
}

/// Convert a DOS (time, date) pair to a calendar timestamp.
///
/// Returns `None` for field combinations that are not a real date.
pub fn dos_to_datetime(time: u16, date: u16) -> Option<NaiveDateTime> {
    let seconds = u32::from(time & 0x1F) * 2;
    let minutes = u32::from((time >> 5) & 0x3F);
    let hours = u32::from((time >> 11) & 0x1F);
    let day = u32::from(date & 0x1F);
    let month = u32::from((date >> 5) & 0x0F);
    let year = i32::from((date >> 9) & 0x7F) + 1980;

    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hours, minutes, seconds)
}

/// Convert a calendar timestamp to a DOS (time, date) pair.
///
/// Years are clamped to the 1980..=2107 range the format can store; seconds
/// are truncated to even values.
pub fn datetime_to_dos(dt: &NaiveDateTime) -> (u16, u16) {
    let year = dt.year().clamp(1980, 2107);
    let time = ((dt.hour() as u16) << 11) | ((dt.minute() as u16) << 5) | (dt.second() as u16 / 2);
    let date = (((year - 1980) as u16) << 9) | ((dt.month() as u16) << 5) | dt.day() as u16;
    (time, date)
}

/// Walk an extra field block as (header id, payload) pairs.
pub fn extra_fields(extra: &[u8]) -> impl Iterator<Item = (u16, &[u8])> {
    let mut offset = 0;
    std::iter::from_fn(move || {
        if offset + 4 > extra.len() {
            return None;
        }
        let id = u16::from_le_bytes([extra[offset], extra[offset + 1]]);
        let size = u16::from_le_bytes([extra[offset + 2], extra[offset + 3]]) as usize;
        let start = offset + 4;
        let end = (start + size).min(extra.len());
        offset = start + size;
        Some((id, &extra[start..end]))
    })
}

/// Read one of the Info-ZIP extended timestamps out of an extra block.
///
/// `which` is one of the [`ext_time`] bits. Times are stored in the order
/// modified, accessed, created, each present only when its flag is set; a
/// central directory copy usually carries the modification time only.
pub fn extended_time(extra: &[u8], which: u8) -> Option<DateTime<Utc>> {
    let (_, payload) = extra_fields(extra).find(|(id, _)| *id == EXT_TIME_FIELD_ID)?;
    let (&flags, mut times) = payload.split_first()?;
    if flags & which == 0 {
        return None;
    }
    for bit in [ext_time::MODIFIED, ext_time::ACCESSED, ext_time::CREATED] {
        if flags & bit == 0 {
            continue;
        }
        if times.len() < 4 {
            return None;
        }
        let value = u32::from_le_bytes([times[0], times[1], times[2], times[3]]);
        if bit == which {
            return DateTime::from_timestamp(i64::from(value), 0);
        }
        times = &times[4..];
    }
    None
}

/// Snapshot of one directory record.
///
/// Produced on demand from the engine and never cached by the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntryMetadata {
    /// Version made by (high byte: OS code).
    pub version_created: u16,
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flags.
    pub flags: u16,
    /// On-disk compression method number.
    pub method: u16,
    /// CRC-32 of the uncompressed data.
    pub crc: u32,
    /// Compressed size in bytes (including any encryption header).
    pub compressed_size: u64,
    /// Uncompressed size in bytes.
    pub uncompressed_size: u64,
    /// Disk number where the entry starts.
    pub disk_number_start: u32,
    /// Internal file attributes.
    pub internal_attr: u16,
    /// External file attributes.
    pub external_attr: u32,
    /// Entry name.
    pub name: String,
    /// Entry comment.
    pub comment: String,
    /// Raw central directory extra field bytes.
    pub extra: Vec<u8>,
    /// Last modification time, at DOS resolution.
    pub modified: Option<NaiveDateTime>,
}

impl EntryMetadata {
    /// Compression method as an enum.
    pub fn compression_method(&self) -> CompressionMethod {
        CompressionMethod::from_u16(self.method)
    }

    /// Whether this entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.name.ends_with('/')
    }

    /// Whether this entry is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Whether the entry was written with a trailing data descriptor.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// OS code from the version-made-by field.
    pub fn os_code(&self) -> u8 {
        (self.version_created >> 8) as u8
    }

    /// Unix permission bits, if the entry was made on a Unix-like system.
    pub fn unix_mode(&self) -> Option<u32> {
        match self.os_code() {
            3 | 19 => Some(self.external_attr >> 16),
            _ => None,
        }
    }

    /// Extended modification time from the central extra field.
    pub fn ext_mod_time(&self) -> Option<DateTime<Utc>> {
        extended_time(&self.extra, ext_time::MODIFIED)
    }
}

/// Description of an entry about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    /// Entry name. A leading `/` is stripped.
    pub name: String,
    /// Modification time recorded in the headers.
    pub date_time: NaiveDateTime,
    /// Internal file attributes.
    pub internal_attr: u16,
    /// External file attributes.
    pub external_attr: u32,
    /// Entry comment.
    pub comment: String,
    /// Extra field for the local header.
    pub extra_local: Vec<u8>,
    /// Extra field for the central directory.
    pub extra_global: Vec<u8>,
    /// Uncompressed size; only used for raw writes.
    pub uncompressed_size: u64,
}

impl NewEntry {
    /// Entry with the given name stamped with the current local time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: strip_leading_slash(name.into()),
            date_time: Local::now().naive_local(),
            internal_attr: 0,
            external_attr: 0,
            comment: String::new(),
            extra_local: Vec::new(),
            extra_global: Vec::new(),
            uncompressed_size: 0,
        }
    }

    /// Entry named `name` carrying the modification time and permissions of
    /// the file at `path`.
    pub fn from_path(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mut entry = Self::new(name);
        if let Ok(modified) = meta.modified() {
            entry.date_time = DateTime::<Local>::from(modified).naive_local();
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            entry.set_permissions(meta.permissions().mode());
        }
        Ok(entry)
    }

    /// Set the modification time.
    pub fn with_date_time(mut self, date_time: NaiveDateTime) -> Self {
        self.date_time = date_time;
        self
    }

    /// Set the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Set the local and central extra fields.
    pub fn with_extra(mut self, local: Vec<u8>, global: Vec<u8>) -> Self {
        self.extra_local = local;
        self.extra_global = global;
        self
    }

    /// Set the uncompressed size committed with a raw write.
    pub fn with_uncompressed_size(mut self, size: u64) -> Self {
        self.uncompressed_size = size;
        self
    }

    /// Store Unix permission bits in the high half of the external attributes.
    pub fn set_permissions(&mut self, mode: u32) {
        self.external_attr = (self.external_attr & 0xFFFF) | ((mode & 0xFFFF) << 16);
    }
}

fn strip_leading_slash(name: String) -> String {
    match name.strip_prefix('/') {
        Some(rest) => rest.to_string(),
        None => name,
    }
}
