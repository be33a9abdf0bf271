//! ZIP record structures.
//!
//! Encoding and decoding of the fixed records the engines move through:
//! local file headers, central directory records, data descriptors and the
//! (zip64) end of central directory.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};
use zipnav_core::entry::{EntryMetadata, dos_to_datetime, extra_fields};
use zipnav_core::error::{Result, ZipError};

/// ZIP local file header signature.
pub const LOCAL_FILE_HEADER_SIG: u32 = 0x04034B50;

/// ZIP central directory header signature.
pub const CENTRAL_DIR_HEADER_SIG: u32 = 0x02014B50;

/// ZIP end of central directory signature.
pub const END_OF_CENTRAL_DIR_SIG: u32 = 0x06054B50;

/// ZIP64 end of central directory signature.
pub const ZIP64_END_OF_CENTRAL_DIR_SIG: u32 = 0x06064B50;

/// ZIP64 end of central directory locator signature.
pub const ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG: u32 = 0x07064B50;

/// Data descriptor signature (PK\x07\x08).
pub const DATA_DESCRIPTOR_SIG: u32 = 0x08074B50;

/// ZIP64 extra field header ID.
pub const ZIP64_EXTRA_FIELD_ID: u16 = 0x0001;

/// Marker value for Zip64 (0xFFFFFFFF for 32-bit fields).
pub const ZIP64_MARKER_32: u32 = 0xFFFF_FFFF;

/// Marker value for Zip64 (0xFFFF for 16-bit fields).
pub const ZIP64_MARKER_16: u16 = 0xFFFF;

/// Fixed part of a local file header.
pub const LOCAL_HEADER_LEN: u64 = 30;

/// Fixed part of a central directory record.
pub const CENTRAL_RECORD_LEN: usize = 46;

/// Fixed part of the end of central directory record.
const EOCD_LEN: usize = 22;

/// Largest comment the EOCD can carry.
const MAX_COMMENT_LEN: u64 = 0xFFFF;

/// ZIP local file header.
#[derive(Debug, Clone, Default)]
pub struct LocalHeader {
    /// Minimum version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time.
    pub mtime: u16,
    /// Last modification date.
    pub mdate: u16,
    /// CRC-32, or zero when a data descriptor follows.
    pub crc32: u32,
    /// 32-bit compressed size (marker when zip64).
    pub compressed_size: u32,
    /// 32-bit uncompressed size (marker when zip64).
    pub uncompressed_size: u32,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
}

impl LocalHeader {
    /// Read a local file header.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; LOCAL_HEADER_LEN as usize];
        reader.read_exact(&mut buf)?;
        let mut fields = &buf[..];

        let signature = fields.read_u32::<LittleEndian>()?;
        if signature != LOCAL_FILE_HEADER_SIG {
            return Err(ZipError::invalid_magic(
                LOCAL_FILE_HEADER_SIG.to_le_bytes().to_vec(),
                signature.to_le_bytes().to_vec(),
            ));
        }

        let version_needed = fields.read_u16::<LittleEndian>()?;
        let flags = fields.read_u16::<LittleEndian>()?;
        let method = fields.read_u16::<LittleEndian>()?;
        let mtime = fields.read_u16::<LittleEndian>()?;
        let mdate = fields.read_u16::<LittleEndian>()?;
        let crc32 = fields.read_u32::<LittleEndian>()?;
        let compressed_size = fields.read_u32::<LittleEndian>()?;
        let uncompressed_size = fields.read_u32::<LittleEndian>()?;
        let name_len = fields.read_u16::<LittleEndian>()? as usize;
        let extra_len = fields.read_u16::<LittleEndian>()? as usize;

        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        let mut extra = vec![0u8; extra_len];
        reader.read_exact(&mut extra)?;

        Ok(Self {
            version_needed,
            flags,
            method,
            mtime,
            mdate,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
        })
    }

    /// Write the header.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(LOCAL_FILE_HEADER_SIG)?;
        writer.write_u16::<LittleEndian>(self.version_needed)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.method)?;
        writer.write_u16::<LittleEndian>(self.mtime)?;
        writer.write_u16::<LittleEndian>(self.mdate)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(self.compressed_size)?;
        writer.write_u32::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u16::<LittleEndian>(self.name.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.extra.len() as u16)?;
        writer.write_all(&self.name)?;
        writer.write_all(&self.extra)?;
        Ok(())
    }

    /// Total encoded length.
    pub fn len(&self) -> u64 {
        LOCAL_HEADER_LEN + self.name.len() as u64 + self.extra.len() as u64
    }
}

/// One central directory record.
///
/// Sizes and offset are always the resolved 64-bit values; `extra` holds the
/// bytes exactly as found on disk (including any zip64 field).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CentralRecord {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General purpose bit flag.
    pub flags: u16,
    /// Compression method.
    pub method: u16,
    /// Last modification time.
    pub mtime: u16,
    /// Last modification date.
    pub mdate: u16,
    /// CRC-32 of uncompressed data.
    pub crc32: u32,
    /// Compressed size.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Disk number start.
    pub disk_start: u32,
    /// Internal file attributes.
    pub internal_attr: u16,
    /// External file attributes.
    pub external_attr: u32,
    /// Relative offset of local header.
    pub local_header_offset: u64,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra field.
    pub extra: Vec<u8>,
    /// Raw comment bytes.
    pub comment: Vec<u8>,
}

impl CentralRecord {
    /// Read a single central directory record.
    pub fn read<R: Read + ?Sized>(reader: &mut R) -> Result<Self> {
        let mut buf = [0u8; CENTRAL_RECORD_LEN];
        reader.read_exact(&mut buf)?;
        let mut fields = &buf[..];

        let signature = fields.read_u32::<LittleEndian>()?;
        if signature != CENTRAL_DIR_HEADER_SIG {
            return Err(ZipError::invalid_magic(
                CENTRAL_DIR_HEADER_SIG.to_le_bytes().to_vec(),
                signature.to_le_bytes().to_vec(),
            ));
        }

        let version_made_by = fields.read_u16::<LittleEndian>()?;
        let version_needed = fields.read_u16::<LittleEndian>()?;
        let flags = fields.read_u16::<LittleEndian>()?;
        let method = fields.read_u16::<LittleEndian>()?;
        let mtime = fields.read_u16::<LittleEndian>()?;
        let mdate = fields.read_u16::<LittleEndian>()?;
        let crc32 = fields.read_u32::<LittleEndian>()?;
        let compressed_size = fields.read_u32::<LittleEndian>()?;
        let uncompressed_size = fields.read_u32::<LittleEndian>()?;
        let name_len = fields.read_u16::<LittleEndian>()? as usize;
        let extra_len = fields.read_u16::<LittleEndian>()? as usize;
        let comment_len = fields.read_u16::<LittleEndian>()? as usize;
        let disk_start = fields.read_u16::<LittleEndian>()?;
        let internal_attr = fields.read_u16::<LittleEndian>()?;
        let external_attr = fields.read_u32::<LittleEndian>()?;
        let local_header_offset = fields.read_u32::<LittleEndian>()?;

        let mut name = vec![0u8; name_len];
        reader.read_exact(&mut name)?;
        let mut extra = vec![0u8; extra_len];
        reader.read_exact(&mut extra)?;
        let mut comment = vec![0u8; comment_len];
        reader.read_exact(&mut comment)?;

        let mut record = Self {
            version_made_by,
            version_needed,
            flags,
            method,
            mtime,
            mdate,
            crc32,
            compressed_size: u64::from(compressed_size),
            uncompressed_size: u64::from(uncompressed_size),
            disk_start: u32::from(disk_start),
            internal_attr,
            external_attr,
            local_header_offset: u64::from(local_header_offset),
            name,
            extra,
            comment,
        };
        record.apply_zip64_extra(
            uncompressed_size == ZIP64_MARKER_32,
            compressed_size == ZIP64_MARKER_32,
            local_header_offset == ZIP64_MARKER_32,
            disk_start == ZIP64_MARKER_16,
        )?;
        Ok(record)
    }

    /// Replace marker fields with their values from the zip64 extra field.
    ///
    /// Values appear in the order uncompressed size, compressed size, header
    /// offset, disk start, each only if the header field holds the marker.
    fn apply_zip64_extra(
        &mut self,
        uncompressed: bool,
        compressed: bool,
        offset: bool,
        disk: bool,
    ) -> Result<()> {
        if !(uncompressed || compressed || offset || disk) {
            return Ok(());
        }
        let Some((_, mut data)) = extra_fields(&self.extra).find(|(id, _)| *id == ZIP64_EXTRA_FIELD_ID)
        else {
            return Err(ZipError::invalid_header(
                "zip64 marker without zip64 extra field",
            ));
        };

        let short = || ZipError::invalid_header("zip64 extra field too short");
        if uncompressed {
            self.uncompressed_size = data.read_u64::<LittleEndian>().map_err(|_| short())?;
        }
        if compressed {
            self.compressed_size = data.read_u64::<LittleEndian>().map_err(|_| short())?;
        }
        if offset {
            self.local_header_offset = data.read_u64::<LittleEndian>().map_err(|_| short())?;
        }
        if disk {
            self.disk_start = data.read_u32::<LittleEndian>().map_err(|_| short())?;
        }
        Ok(())
    }

    /// Length of this record as it sits on disk.
    pub fn disk_len(&self) -> u64 {
        (CENTRAL_RECORD_LEN + self.name.len() + self.extra.len() + self.comment.len()) as u64
    }

    /// Check if this record requires Zip64 when written.
    pub fn needs_zip64(&self) -> bool {
        self.compressed_size >= u64::from(ZIP64_MARKER_32)
            || self.uncompressed_size >= u64::from(ZIP64_MARKER_32)
            || self.local_header_offset >= u64::from(ZIP64_MARKER_32)
    }

    /// Build Zip64 extra field if needed.
    fn build_zip64_extra(&self) -> Vec<u8> {
        if !self.needs_zip64() {
            return Vec::new();
        }

        let marker = u64::from(ZIP64_MARKER_32);
        let values: Vec<u64> = [
            self.uncompressed_size,
            self.compressed_size,
            self.local_header_offset,
        ]
        .into_iter()
        .filter(|v| *v >= marker)
        .collect();

        let mut extra = Vec::with_capacity(4 + values.len() * 8);
        extra.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
        extra.extend_from_slice(&((values.len() * 8) as u16).to_le_bytes());
        for value in values {
            extra.extend_from_slice(&value.to_le_bytes());
        }
        extra
    }

    /// The extra field without any zip64 block, which is rebuilt on write.
    fn extra_without_zip64(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.extra.len());
        for (id, data) in extra_fields(&self.extra) {
            if id == ZIP64_EXTRA_FIELD_ID {
                continue;
            }
            out.extend_from_slice(&id.to_le_bytes());
            out.extend_from_slice(&(data.len() as u16).to_le_bytes());
            out.extend_from_slice(data);
        }
        out
    }

    /// Write the central directory record, returning its encoded length.
    pub fn write<W: Write + ?Sized>(&self, writer: &mut W) -> Result<u64> {
        let zip64_extra = self.build_zip64_extra();
        let other_extra = self.extra_without_zip64();
        let total_extra_len = zip64_extra.len() + other_extra.len();
        if total_extra_len > usize::from(u16::MAX) {
            return Err(ZipError::invalid_parameter("extra field too long"));
        }

        let marker = u64::from(ZIP64_MARKER_32);
        let clamp = |value: u64| {
            if value >= marker {
                ZIP64_MARKER_32
            } else {
                value as u32
            }
        };
        let version_needed = if self.needs_zip64() {
            self.version_needed.max(45)
        } else {
            self.version_needed
        };

        writer.write_u32::<LittleEndian>(CENTRAL_DIR_HEADER_SIG)?;
        writer.write_u16::<LittleEndian>(self.version_made_by)?;
        writer.write_u16::<LittleEndian>(version_needed)?;
        writer.write_u16::<LittleEndian>(self.flags)?;
        writer.write_u16::<LittleEndian>(self.method)?;
        writer.write_u16::<LittleEndian>(self.mtime)?;
        writer.write_u16::<LittleEndian>(self.mdate)?;
        writer.write_u32::<LittleEndian>(self.crc32)?;
        writer.write_u32::<LittleEndian>(clamp(self.compressed_size))?;
        writer.write_u32::<LittleEndian>(clamp(self.uncompressed_size))?;
        writer.write_u16::<LittleEndian>(self.name.len() as u16)?;
        writer.write_u16::<LittleEndian>(total_extra_len as u16)?;
        writer.write_u16::<LittleEndian>(self.comment.len() as u16)?;
        writer.write_u16::<LittleEndian>(self.disk_start as u16)?;
        writer.write_u16::<LittleEndian>(self.internal_attr)?;
        writer.write_u32::<LittleEndian>(self.external_attr)?;
        writer.write_u32::<LittleEndian>(clamp(self.local_header_offset))?;
        writer.write_all(&self.name)?;
        writer.write_all(&zip64_extra)?;
        writer.write_all(&other_extra)?;
        writer.write_all(&self.comment)?;

        Ok((CENTRAL_RECORD_LEN + self.name.len() + total_extra_len + self.comment.len()) as u64)
    }

    /// Decoded entry name.
    pub fn name_string(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    /// Snapshot for callers.
    pub fn to_metadata(&self) -> EntryMetadata {
        EntryMetadata {
            version_created: self.version_made_by,
            version_needed: self.version_needed,
            flags: self.flags,
            method: self.method,
            crc: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            disk_number_start: self.disk_start,
            internal_attr: self.internal_attr,
            external_attr: self.external_attr,
            name: self.name_string(),
            comment: String::from_utf8_lossy(&self.comment).into_owned(),
            extra: self.extra.clone(),
            modified: dos_to_datetime(self.mtime, self.mdate),
        }
    }
}

/// Write a data descriptor (with signature) after entry data.
///
/// Returns the number of bytes written.
pub fn write_data_descriptor<W: Write + ?Sized>(
    writer: &mut W,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    zip64: bool,
) -> Result<u64> {
    writer.write_u32::<LittleEndian>(DATA_DESCRIPTOR_SIG)?;
    writer.write_u32::<LittleEndian>(crc32)?;
    if zip64 {
        writer.write_u64::<LittleEndian>(compressed_size)?;
        writer.write_u64::<LittleEndian>(uncompressed_size)?;
        Ok(24)
    } else {
        writer.write_u32::<LittleEndian>(compressed_size as u32)?;
        writer.write_u32::<LittleEndian>(uncompressed_size as u32)?;
        Ok(16)
    }
}

/// End of central directory, resolved through the zip64 records if present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    /// Total number of entries.
    pub entries: u64,
    /// Size of the central directory in bytes.
    pub cd_size: u64,
    /// Absolute offset of the first central directory record.
    pub cd_offset: u64,
    /// Raw archive comment.
    pub comment: Vec<u8>,
}

impl EndOfCentralDirectory {
    /// Find and parse the end of central directory.
    pub fn locate<R: Read + Seek + ?Sized>(reader: &mut R) -> Result<Self> {
        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < EOCD_LEN as u64 {
            return Err(ZipError::invalid_header("file too small to be a ZIP archive"));
        }

        // Search for EOCD signature (max comment is 65535 bytes)
        let search_start = file_size.saturating_sub(MAX_COMMENT_LEN + EOCD_LEN as u64);
        reader.seek(SeekFrom::Start(search_start))?;
        let mut buf = vec![0u8; (file_size - search_start) as usize];
        reader.read_exact(&mut buf)?;

        let eocd_sig = END_OF_CENTRAL_DIR_SIG.to_le_bytes();
        let eocd_offset = buf
            .windows(4)
            .rposition(|w| w == eocd_sig)
            .filter(|pos| pos + EOCD_LEN <= buf.len())
            .ok_or_else(|| ZipError::invalid_header("End of central directory not found"))?;
        let eocd_pos = search_start + eocd_offset as u64;

        let mut fields = &buf[eocd_offset + 4..];
        let _disk = fields.read_u16::<LittleEndian>()?;
        let _cd_disk = fields.read_u16::<LittleEndian>()?;
        let _entries_on_disk = fields.read_u16::<LittleEndian>()?;
        let entries = u64::from(fields.read_u16::<LittleEndian>()?);
        let cd_size = u64::from(fields.read_u32::<LittleEndian>()?);
        let cd_offset = u64::from(fields.read_u32::<LittleEndian>()?);
        let comment_len = fields.read_u16::<LittleEndian>()? as usize;
        let comment = fields[..comment_len.min(fields.len())].to_vec();

        let mut eocd = Self {
            entries,
            cd_size,
            cd_offset,
            comment,
        };

        if eocd_pos >= 20 {
            reader.seek(SeekFrom::Start(eocd_pos - 20))?;
            let mut locator = [0u8; 20];
            reader.read_exact(&mut locator)?;
            let mut fields = &locator[..];
            if fields.read_u32::<LittleEndian>()? == ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG {
                let _disk = fields.read_u32::<LittleEndian>()?;
                let zip64_eocd_offset = fields.read_u64::<LittleEndian>()?;
                eocd.read_zip64(reader, zip64_eocd_offset)?;
            }
        }

        Ok(eocd)
    }

    fn read_zip64<R: Read + Seek + ?Sized>(&mut self, reader: &mut R, offset: u64) -> Result<()> {
        reader.seek(SeekFrom::Start(offset))?;
        let mut record = [0u8; 56];
        reader.read_exact(&mut record)?;
        let mut fields = &record[..];

        let signature = fields.read_u32::<LittleEndian>()?;
        if signature != ZIP64_END_OF_CENTRAL_DIR_SIG {
            return Err(ZipError::invalid_magic(
                ZIP64_END_OF_CENTRAL_DIR_SIG.to_le_bytes().to_vec(),
                signature.to_le_bytes().to_vec(),
            ));
        }
        // size of record, versions, disk numbers, entries on this disk
        let mut skipped = [0u8; 28];
        fields.read_exact(&mut skipped)?;
        self.entries = fields.read_u64::<LittleEndian>()?;
        self.cd_size = fields.read_u64::<LittleEndian>()?;
        self.cd_offset = fields.read_u64::<LittleEndian>()?;
        Ok(())
    }

    /// Write the end records after a central directory.
    ///
    /// `cd_end` is the absolute offset just past the central directory; the
    /// zip64 records are emitted when any value overflows its 32/16-bit
    /// field or when `force_zip64` is set. Returns the bytes written.
    pub fn write<W: Write + ?Sized>(
        &self,
        writer: &mut W,
        cd_end: u64,
        version_made_by: u16,
        force_zip64: bool,
    ) -> Result<u64> {
        let comment_len = u16::try_from(self.comment.len())
            .map_err(|_| ZipError::invalid_parameter("archive comment too long"))?;
        let needs_zip64 = force_zip64
            || self.entries >= u64::from(ZIP64_MARKER_16)
            || self.cd_size >= u64::from(ZIP64_MARKER_32)
            || self.cd_offset >= u64::from(ZIP64_MARKER_32);
        let mut written = 0u64;

        if needs_zip64 {
            // Zip64 End of Central Directory Record
            writer.write_u32::<LittleEndian>(ZIP64_END_OF_CENTRAL_DIR_SIG)?;
            // Size of the remaining record
            writer.write_u64::<LittleEndian>(44)?;
            writer.write_u16::<LittleEndian>(version_made_by)?;
            writer.write_u16::<LittleEndian>(45)?;
            writer.write_u32::<LittleEndian>(0)?;
            writer.write_u32::<LittleEndian>(0)?;
            writer.write_u64::<LittleEndian>(self.entries)?;
            writer.write_u64::<LittleEndian>(self.entries)?;
            writer.write_u64::<LittleEndian>(self.cd_size)?;
            writer.write_u64::<LittleEndian>(self.cd_offset)?;

            // Zip64 End of Central Directory Locator
            writer.write_u32::<LittleEndian>(ZIP64_END_OF_CENTRAL_DIR_LOCATOR_SIG)?;
            writer.write_u32::<LittleEndian>(0)?;
            writer.write_u64::<LittleEndian>(cd_end)?;
            writer.write_u32::<LittleEndian>(1)?;
            written += 56 + 20;
        }

        let entries_16 = self.entries.min(u64::from(ZIP64_MARKER_16)) as u16;
        let cd_size_32 = self.cd_size.min(u64::from(ZIP64_MARKER_32)) as u32;
        let cd_offset_32 = self.cd_offset.min(u64::from(ZIP64_MARKER_32)) as u32;

        writer.write_u32::<LittleEndian>(END_OF_CENTRAL_DIR_SIG)?;
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u16::<LittleEndian>(0)?;
        writer.write_u16::<LittleEndian>(entries_16)?;
        writer.write_u16::<LittleEndian>(entries_16)?;
        writer.write_u32::<LittleEndian>(cd_size_32)?;
        writer.write_u32::<LittleEndian>(cd_offset_32)?;
        writer.write_u16::<LittleEndian>(comment_len)?;
        writer.write_all(&self.comment)?;
        written += EOCD_LEN as u64 + u64::from(comment_len);

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_record() -> CentralRecord {
        CentralRecord {
            version_made_by: 0x031E,
            version_needed: 20,
            method: 8,
            crc32: 0xDEADBEEF,
            compressed_size: 100,
            uncompressed_size: 200,
            name: b"dir/test.txt".to_vec(),
            comment: b"note".to_vec(),
            ..CentralRecord::default()
        }
    }

    #[test]
    fn test_central_record_roundtrip() {
        let record = sample_record();
        let mut buf = Vec::new();
        let len = record.write(&mut buf).unwrap();
        assert_eq!(len, buf.len() as u64);
        assert_eq!(len, record.disk_len());

        let parsed = CentralRecord::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.name_string(), "dir/test.txt");
    }

    #[test]
    fn test_central_record_needs_zip64() {
        let entry = sample_record();
        assert!(!entry.needs_zip64());

        let large = CentralRecord {
            local_header_offset: 0x1_0000_0000,
            ..entry.clone()
        };
        assert!(large.needs_zip64());
    }

    #[test]
    fn test_zip64_values_resolved_on_read() {
        let record = CentralRecord {
            compressed_size: 0x1_0000_0000,
            uncompressed_size: 0x2_0000_0000,
            local_header_offset: 0x3_0000_0000,
            ..sample_record()
        };
        let mut buf = Vec::new();
        record.write(&mut buf).unwrap();

        // Header ID (4) + three 8-byte values
        let extra_len = u16::from_le_bytes([buf[30], buf[31]]);
        assert_eq!(extra_len, 28);

        let parsed = CentralRecord::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.compressed_size, 0x1_0000_0000);
        assert_eq!(parsed.uncompressed_size, 0x2_0000_0000);
        assert_eq!(parsed.local_header_offset, 0x3_0000_0000);
        assert!(parsed.to_metadata().version_needed >= 45);

        // Rewriting does not duplicate the zip64 block
        let mut again = Vec::new();
        parsed.write(&mut again).unwrap();
        assert_eq!(again, buf);
    }

    #[test]
    fn test_marker_without_extra_is_rejected() {
        let mut buf = Vec::new();
        sample_record().write(&mut buf).unwrap();
        // Compressed size field → marker
        buf[20..24].copy_from_slice(&ZIP64_MARKER_32.to_le_bytes());
        assert!(CentralRecord::read(&mut Cursor::new(&buf)).is_err());
    }

    #[test]
    fn test_local_header_roundtrip() {
        let header = LocalHeader {
            version_needed: 20,
            flags: 0x0008,
            method: 8,
            name: b"a.txt".to_vec(),
            extra: vec![0xAA, 0xBB, 0x00, 0x00],
            ..LocalHeader::default()
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, header.len());

        let parsed = LocalHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.name, b"a.txt");
        assert_eq!(parsed.flags, 0x0008);
        assert_eq!(parsed.extra, header.extra);
    }

    #[test]
    fn test_data_descriptor_layout() {
        let mut buf = Vec::new();
        assert_eq!(write_data_descriptor(&mut buf, 0x78563412, 4096, 8192, false).unwrap(), 16);
        assert_eq!(&buf[..4], &[0x50, 0x4B, 0x07, 0x08]);
        assert_eq!(&buf[4..8], &[0x12, 0x34, 0x56, 0x78]);

        let mut buf64 = Vec::new();
        assert_eq!(write_data_descriptor(&mut buf64, 1, 2, 3, true).unwrap(), 24);
        assert_eq!(u64::from_le_bytes(buf64[8..16].try_into().unwrap()), 2);
    }

    #[test]
    fn test_eocd_roundtrip_with_comment() {
        let eocd = EndOfCentralDirectory {
            entries: 3,
            cd_size: 0,
            cd_offset: 0,
            comment: b"archive comment".to_vec(),
        };
        let mut buf = Vec::new();
        eocd.write(&mut buf, 0, 0x031E, false).unwrap();

        let parsed = EndOfCentralDirectory::locate(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed, eocd);
    }

    #[test]
    fn test_eocd_overlong_comment_writes_nothing() {
        let eocd = EndOfCentralDirectory {
            entries: 0,
            cd_size: 0,
            cd_offset: 0,
            comment: vec![b'x'; 70_000],
        };
        let mut buf = Vec::new();
        let err = eocd.write(&mut buf, 0, 0x031E, true).unwrap_err();
        assert!(matches!(err, ZipError::InvalidParameter { .. }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_eocd_zip64_forced() {
        let eocd = EndOfCentralDirectory {
            entries: 2,
            cd_size: 10,
            cd_offset: 0,
            comment: Vec::new(),
        };
        // Pretend a 10-byte directory precedes the end records.
        let mut buf = vec![0u8; 10];
        eocd.write(&mut buf, 10, 0x031E, true).unwrap();

        let parsed = EndOfCentralDirectory::locate(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(parsed.entries, 2);
        assert_eq!(parsed.cd_size, 10);
    }

    #[test]
    fn test_not_a_zip() {
        let data = vec![0u8; 64];
        assert!(EndOfCentralDirectory::locate(&mut Cursor::new(&data)).is_err());
    }
}
