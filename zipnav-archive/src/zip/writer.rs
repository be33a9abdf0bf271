//! Write engine.
//!
//! [`ZipEngine`] streams one entry at a time onto the device and keeps the
//! central records of everything written (plus, in add mode, everything that
//! was already there) until the archive is closed.

use super::DeviceRef;
use super::crypto::{ZipCrypto, random_header_bytes};
use super::header::{
    CentralRecord, EndOfCentralDirectory, LocalHeader, ZIP64_EXTRA_FIELD_ID, ZIP64_MARKER_32,
    write_data_descriptor,
};
use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use flate2::{Compress, Compression, FlushCompress, Status};
use std::io::{SeekFrom, Write};
use zipnav_core::device::Device;
use zipnav_core::entry::{
    CompressionMethod, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED, FLAG_UTF8, NewEntry, datetime_to_dos,
};
use zipnav_core::error::{Result, ZipError};

/// Output chunk handed to the compressor per call.
const OUTPUT_CHUNK: usize = 16 * 1024;

/// Everything needed to start one entry.
pub(crate) struct EntrySpec<'e> {
    pub entry: &'e NewEntry,
    pub method: CompressionMethod,
    pub level: u32,
    pub raw: bool,
    pub password: Option<&'e [u8]>,
    /// Caller CRC; the encryption check byte for raw entries.
    pub crc: u32,
    pub zip64: bool,
    pub utf8: bool,
    pub version_made_by: u16,
}

/// Entry writer plus the accumulated central directory.
pub(crate) struct ZipEngine<'a> {
    device: DeviceRef<'a>,
    sequential: bool,
    /// Absolute device position of the next byte written.
    offset: u64,
    records: Vec<CentralRecord>,
    kept_comment: Vec<u8>,
    write_descriptor: bool,
    entry: Option<EntryEncoder>,
}

/// Where a new archive session starts and what it inherits.
pub(crate) struct WriteStart {
    offset: u64,
    records: Vec<CentralRecord>,
    kept_comment: Vec<u8>,
}

impl WriteStart {
    /// Start a new archive at the device's current position.
    pub fn create(device: &mut dyn Device) -> Result<Self> {
        Ok(Self {
            offset: device.stream_position()?,
            records: Vec::new(),
            kept_comment: Vec::new(),
        })
    }

    /// Start a new archive after whatever the device already holds.
    pub fn append(device: &mut dyn Device) -> Result<Self> {
        Ok(Self {
            offset: device.seek(SeekFrom::End(0))?,
            records: Vec::new(),
            kept_comment: Vec::new(),
        })
    }

    /// Continue an existing archive: its central records are kept and new
    /// entries overwrite the old directory, which is rewritten on close.
    pub fn add(device: &mut dyn Device) -> Result<Self> {
        let eocd = EndOfCentralDirectory::locate(device)?;
        device.seek(SeekFrom::Start(eocd.cd_offset))?;
        let mut records = Vec::with_capacity(eocd.entries.min(1 << 16) as usize);
        for _ in 0..eocd.entries {
            records.push(CentralRecord::read(device)?);
        }
        device.seek(SeekFrom::Start(eocd.cd_offset))?;
        log::debug!("adding to archive with {} entries", records.len());
        Ok(Self {
            offset: eocd.cd_offset,
            records,
            kept_comment: eocd.comment,
        })
    }
}

impl<'a> ZipEngine<'a> {
    /// Bind a prepared session to its device.
    pub fn new(device: DeviceRef<'a>, start: WriteStart) -> Self {
        let sequential = device.is_sequential();
        Self {
            device,
            sequential,
            offset: start.offset,
            records: start.records,
            kept_comment: start.kept_comment,
            write_descriptor: true,
            entry: None,
        }
    }

    pub fn into_device(self) -> DeviceRef<'a> {
        self.device
    }

    pub fn set_write_descriptor(&mut self, enabled: bool) {
        self.write_descriptor = enabled;
    }

    pub fn is_entry_open(&self) -> bool {
        self.entry.is_some()
    }

    /// Number of entries that will be in the directory.
    pub fn entries(&self) -> usize {
        self.records.len()
    }

    /// Write the local header (and encryption header) of a new entry.
    pub fn open_entry(&mut self, spec: &EntrySpec<'_>) -> Result<()> {
        if self.entry.is_some() {
            return Err(ZipError::usage("an entry is already open"));
        }
        if matches!(spec.method, CompressionMethod::Unknown(_)) {
            return Err(ZipError::unsupported_method(spec.method.to_string()));
        }

        let entry = spec.entry;
        let name = entry.name.as_bytes().to_vec();
        let comment = entry.comment.as_bytes().to_vec();
        if name.len() > usize::from(u16::MAX) || comment.len() > usize::from(u16::MAX) {
            return Err(ZipError::invalid_parameter("name or comment too long"));
        }

        let deflate = spec.method == CompressionMethod::Deflate;
        // Encrypted entries take their check byte from the time field,
        // which readers only accept when a descriptor follows.
        let descriptor = self.write_descriptor
            || self.sequential
            || (spec.password.is_some() && !spec.raw);

        let mut flags = 0u16;
        if spec.utf8 {
            flags |= FLAG_UTF8;
        }
        if descriptor {
            flags |= FLAG_DATA_DESCRIPTOR;
        }
        if spec.password.is_some() {
            flags |= FLAG_ENCRYPTED;
        }
        if deflate {
            flags |= match spec.level {
                8 | 9 => 0x2,
                2 => 0x4,
                1 => 0x6,
                _ => 0,
            };
        }

        let (mtime, mdate) = datetime_to_dos(&entry.date_time);
        let version_needed = if spec.zip64 {
            45
        } else if deflate {
            20
        } else {
            10
        };

        let mut extra = Vec::with_capacity(20 + entry.extra_local.len());
        if spec.zip64 {
            extra.extend_from_slice(&ZIP64_EXTRA_FIELD_ID.to_le_bytes());
            extra.extend_from_slice(&16u16.to_le_bytes());
            extra.extend_from_slice(&[0u8; 16]);
        }
        extra.extend_from_slice(&entry.extra_local);
        if extra.len() > usize::from(u16::MAX) {
            return Err(ZipError::invalid_parameter("local extra field too long"));
        }

        let size_field = if spec.zip64 { ZIP64_MARKER_32 } else { 0 };
        let local = LocalHeader {
            version_needed,
            flags,
            method: spec.method.to_u16(),
            mtime,
            mdate,
            crc32: 0,
            compressed_size: size_field,
            uncompressed_size: size_field,
            name: name.clone(),
            extra,
        };

        let header_offset = self.offset;
        local.write(&mut *self.device)?;
        self.offset += local.len();

        let mut compressed = 0u64;
        let cipher = match spec.password {
            Some(password) => {
                let check = if descriptor {
                    (mtime >> 8) as u8
                } else {
                    (spec.crc >> 24) as u8
                };
                let mut cipher = ZipCrypto::new(password);
                let header = cipher.header(check, random_header_bytes());
                self.device.write_all(&header)?;
                self.offset += header.len() as u64;
                compressed += header.len() as u64;
                Some(cipher)
            }
            None => None,
        };

        let compressor = (deflate && !spec.raw)
            .then(|| Compress::new(Compression::new(spec.level.min(9)), false));

        log::debug!(
            "new entry {} at {:#x} ({}, level {}, raw={}, descriptor={})",
            entry.name,
            header_offset,
            spec.method,
            spec.level,
            spec.raw,
            descriptor
        );

        self.entry = Some(EntryEncoder {
            raw: spec.raw,
            descriptor,
            zip64: spec.zip64,
            header_offset,
            name_len: name.len() as u64,
            compressor,
            cipher,
            hasher: Hasher::new(),
            uncompressed: 0,
            compressed,
            out: Vec::with_capacity(OUTPUT_CHUNK),
            record: CentralRecord {
                version_made_by: spec.version_made_by,
                version_needed,
                flags,
                method: spec.method.to_u16(),
                mtime,
                mdate,
                crc32: 0,
                compressed_size: 0,
                uncompressed_size: 0,
                disk_start: 0,
                internal_attr: entry.internal_attr,
                external_attr: entry.external_attr,
                local_header_offset: header_offset,
                name,
                extra: entry.extra_global.clone(),
                comment,
            },
        });
        Ok(())
    }

    /// Feed entry data; returns the number of bytes accepted.
    pub fn write_entry(&mut self, buf: &[u8]) -> Result<usize> {
        let Some(entry) = self.entry.as_mut() else {
            return Err(ZipError::usage("no entry is open"));
        };
        if !entry.raw {
            entry.hasher.update(buf);
            entry.uncompressed += buf.len() as u64;
        }
        if entry.compressor.is_some() {
            entry.deflate(&mut self.device, &mut self.offset, buf, FlushCompress::None)?;
        } else {
            entry.out.clear();
            entry.out.extend_from_slice(buf);
            entry.emit(&mut self.device, &mut self.offset)?;
        }
        Ok(buf.len())
    }

    /// Finish the open entry.
    ///
    /// For raw entries `raw_size` and `raw_crc` are recorded as given; for
    /// everything else they are ignored and the engine's own counts are used.
    pub fn close_entry(&mut self, raw_size: u64, raw_crc: u32) -> Result<()> {
        let Some(entry) = self.entry.as_mut() else {
            return Err(ZipError::usage("no entry is open"));
        };
        if entry.compressor.is_some() {
            entry.deflate(&mut self.device, &mut self.offset, &[], FlushCompress::Finish)?;
        }

        let (crc32, uncompressed) = if entry.raw {
            (raw_crc, raw_size)
        } else {
            (entry.hasher.clone().finalize(), entry.uncompressed)
        };
        let compressed = entry.compressed;
        let marker = u64::from(ZIP64_MARKER_32);
        if !entry.zip64 && (compressed >= marker || uncompressed >= marker) {
            return Err(ZipError::invalid_parameter(
                "entry exceeds 4 GiB; enable zip64 on the archive",
            ));
        }
        let Some(entry) = self.entry.take() else {
            return Err(ZipError::usage("no entry is open"));
        };

        if entry.descriptor {
            self.offset += write_data_descriptor(
                &mut *self.device,
                crc32,
                compressed,
                uncompressed,
                entry.zip64,
            )?;
        } else {
            self.patch_local_header(&entry, crc32, compressed, uncompressed)?;
        }

        let mut record = entry.record;
        record.crc32 = crc32;
        record.compressed_size = compressed;
        record.uncompressed_size = uncompressed;
        log::debug!(
            "closed entry {} ({} -> {} bytes, crc {:#010x})",
            record.name_string(),
            uncompressed,
            compressed,
            crc32
        );
        self.records.push(record);
        Ok(())
    }

    fn patch_local_header(
        &mut self,
        entry: &EntryEncoder,
        crc32: u32,
        compressed: u64,
        uncompressed: u64,
    ) -> Result<()> {
        let device = &mut *self.device;
        // crc-32 sits 14 bytes into the local header
        device.seek(SeekFrom::Start(entry.header_offset + 14))?;
        device.write_u32::<LittleEndian>(crc32)?;
        if entry.zip64 {
            device.write_u32::<LittleEndian>(ZIP64_MARKER_32)?;
            device.write_u32::<LittleEndian>(ZIP64_MARKER_32)?;
            // zip64 block leads the local extra field: id, size, then values
            device.seek(SeekFrom::Start(entry.header_offset + 30 + entry.name_len + 4))?;
            device.write_u64::<LittleEndian>(uncompressed)?;
            device.write_u64::<LittleEndian>(compressed)?;
        } else {
            device.write_u32::<LittleEndian>(compressed as u32)?;
            device.write_u32::<LittleEndian>(uncompressed as u32)?;
        }
        device.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    /// Write the central directory and end records.
    ///
    /// An entry still open is closed first. `comment` replaces the comment
    /// kept from an existing archive when given.
    pub fn finish(&mut self, comment: Option<&[u8]>, version_made_by: u16) -> Result<()> {
        if comment.is_some_and(|c| c.len() > usize::from(u16::MAX)) {
            return Err(ZipError::invalid_parameter("archive comment too long"));
        }
        if self.is_entry_open() {
            self.close_entry(0, 0)?;
        }

        let cd_offset = self.offset;
        let mut cd_size = 0u64;
        for record in &self.records {
            cd_size += record.write(&mut *self.device)?;
        }
        let force_zip64 = self.records.iter().any(CentralRecord::needs_zip64);

        let eocd = EndOfCentralDirectory {
            entries: self.records.len() as u64,
            cd_size,
            cd_offset,
            comment: comment.map_or_else(|| self.kept_comment.clone(), <[u8]>::to_vec),
        };
        let written = eocd.write(&mut *self.device, cd_offset + cd_size, version_made_by, force_zip64)?;
        self.offset = cd_offset + cd_size + written;
        self.device.flush()?;

        log::debug!(
            "wrote central directory: {} entries, {} bytes at {:#x}",
            eocd.entries,
            cd_size,
            cd_offset
        );
        Ok(())
    }
}

/// Encode state for one entry.
struct EntryEncoder {
    raw: bool,
    descriptor: bool,
    zip64: bool,
    header_offset: u64,
    name_len: u64,
    compressor: Option<Compress>,
    cipher: Option<ZipCrypto>,
    hasher: Hasher,
    uncompressed: u64,
    compressed: u64,
    out: Vec<u8>,
    record: CentralRecord,
}

impl EntryEncoder {
    /// Encrypt and write whatever sits in `out`.
    fn emit(&mut self, device: &mut DeviceRef<'_>, offset: &mut u64) -> Result<()> {
        if self.out.is_empty() {
            return Ok(());
        }
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.encrypt(&mut self.out);
        }
        device.write_all(&self.out)?;
        *offset += self.out.len() as u64;
        self.compressed += self.out.len() as u64;
        self.out.clear();
        Ok(())
    }

    fn deflate(
        &mut self,
        device: &mut DeviceRef<'_>,
        offset: &mut u64,
        mut input: &[u8],
        flush: FlushCompress,
    ) -> Result<()> {
        loop {
            let Some(compressor) = self.compressor.as_mut() else {
                return Ok(());
            };
            self.out.clear();
            self.out.reserve(OUTPUT_CHUNK);
            let before = compressor.total_in();
            let status = compressor
                .compress_vec(input, &mut self.out, flush)
                .map_err(|e| ZipError::codec(e.to_string()))?;
            let consumed = (compressor.total_in() - before) as usize;
            input = &input[consumed..];
            let produced = !self.out.is_empty();
            self.emit(device, offset)?;

            match flush {
                FlushCompress::Finish if status == Status::StreamEnd => return Ok(()),
                FlushCompress::Finish => {}
                _ if input.is_empty() && !produced => return Ok(()),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::unzip::UnzipEngine;
    use std::io::Cursor;
    use zipnav_core::device::Sequential;

    fn spec(entry: &NewEntry) -> EntrySpec<'_> {
        EntrySpec {
            entry,
            method: CompressionMethod::Deflate,
            level: 6,
            raw: false,
            password: None,
            crc: 0,
            zip64: false,
            utf8: false,
            version_made_by: 0x031E,
        }
    }

    fn create(mut device: DeviceRef<'_>) -> ZipEngine<'_> {
        let start = WriteStart::create(&mut *device).unwrap();
        ZipEngine::new(device, start)
    }

    fn write_archive(device: DeviceRef<'_>, entries: &[(&str, &[u8])], descriptor: bool) {
        let mut engine = create(device);
        engine.set_write_descriptor(descriptor);
        for (name, data) in entries {
            let entry = NewEntry::new(*name);
            engine.open_entry(&spec(&entry)).unwrap();
            engine.write_entry(data).unwrap();
            engine.close_entry(0, 0).unwrap();
        }
        engine.finish(None, 0x031E).unwrap();
    }

    fn read_all(data: Vec<u8>) -> Vec<(String, Vec<u8>)> {
        let mut cursor = Cursor::new(data);
        let eocd = EndOfCentralDirectory::locate(&mut cursor).unwrap();
        let mut engine = UnzipEngine::new(DeviceRef::Owned(Box::new(cursor)), eocd);
        let mut out = Vec::new();
        let mut more = engine.go_to_first().is_ok();
        while more {
            let name = engine.current().unwrap().1.name_string();
            engine.open_entry(false, None).unwrap();
            let mut content = Vec::new();
            let mut buf = [0u8; 512];
            loop {
                let n = engine.read_entry(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                content.extend_from_slice(&buf[..n]);
            }
            engine.close_entry().unwrap();
            out.push((name, content));
            more = engine.go_to_next().is_ok();
        }
        out
    }

    #[test]
    fn test_roundtrip_with_descriptor() {
        let mut buf = Vec::new();
        let big: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        write_archive(
            DeviceRef::Owned(Box::new(Cursor::new(&mut buf))),
            &[("a.txt", b"hello"), ("big.bin", &big)],
            true,
        );
        let entries = read_all(buf);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], ("a.txt".to_string(), b"hello".to_vec()));
        assert_eq!(entries[1].1, big);
    }

    #[test]
    fn test_header_patched_without_descriptor() {
        let mut buf = Vec::new();
        write_archive(
            DeviceRef::Owned(Box::new(Cursor::new(&mut buf))),
            &[("a.txt", b"hello hello hello")],
            false,
        );
        let local = LocalHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(local.flags & FLAG_DATA_DESCRIPTOR, 0);
        assert_eq!(local.crc32, crc32fast::hash(b"hello hello hello"));
        assert_eq!(local.uncompressed_size, 17);
        assert_eq!(read_all(buf)[0].1, b"hello hello hello");
    }

    #[test]
    fn test_sequential_forces_descriptor() {
        let mut sink = Sequential::new(Vec::new());
        write_archive(DeviceRef::Borrowed(&mut sink), &[("s.txt", b"streamed")], false);
        let data = sink.into_inner();
        let local = LocalHeader::read(&mut Cursor::new(&data)).unwrap();
        assert_ne!(local.flags & FLAG_DATA_DESCRIPTOR, 0);
        assert_eq!(read_all(data)[0].1, b"streamed");
    }

    #[test]
    fn test_level_flag_bits() {
        let mut buf = Vec::new();
        let mut engine = create(DeviceRef::Owned(Box::new(Cursor::new(&mut buf))));
        let entry = NewEntry::new("x");
        let mut best = spec(&entry);
        best.level = 9;
        engine.open_entry(&best).unwrap();
        engine.close_entry(0, 0).unwrap();
        engine.finish(None, 0x031E).unwrap();
        drop(engine);

        let local = LocalHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(local.flags & 0x6, 0x2);
    }

    #[test]
    fn test_second_open_is_usage_error() {
        let mut buf = Vec::new();
        let mut engine = create(DeviceRef::Owned(Box::new(Cursor::new(&mut buf))));
        let entry = NewEntry::new("x");
        engine.open_entry(&spec(&entry)).unwrap();
        assert!(engine.open_entry(&spec(&entry)).unwrap_err().is_usage());
        assert!(engine.is_entry_open());
    }

    #[test]
    fn test_add_keeps_records() {
        let mut buf = Vec::new();
        write_archive(
            DeviceRef::Owned(Box::new(Cursor::new(&mut buf))),
            &[("one", b"1")],
            true,
        );

        let mut cursor = Cursor::new(&mut buf);
        let start = WriteStart::add(&mut cursor).unwrap();
        let mut engine = ZipEngine::new(DeviceRef::Owned(Box::new(cursor)), start);
        assert_eq!(engine.entries(), 1);
        let entry = NewEntry::new("two");
        engine.open_entry(&spec(&entry)).unwrap();
        engine.write_entry(b"2").unwrap();
        engine.close_entry(0, 0).unwrap();
        engine.finish(None, 0x031E).unwrap();
        drop(engine);

        let names: Vec<String> = read_all(buf).into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["one", "two"]);
    }
}
