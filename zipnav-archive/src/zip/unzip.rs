//! Read engine.
//!
//! [`UnzipEngine`] walks the central directory one record at a time and
//! decodes the entry under its cursor. It never loads the whole directory:
//! the archive layer decides which records to visit.

use super::DeviceRef;
use super::crypto::{ENCRYPTION_HEADER_SIZE, ZipCrypto};
use super::header::{CentralRecord, EndOfCentralDirectory, LocalHeader};
use super::index::EntryLocation;
use crc32fast::Hasher;
use flate2::{Decompress, FlushDecompress, Status};
use std::io::{Seek, SeekFrom};
use zipnav_core::entry::{CompressionMethod, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED};
use zipnav_core::error::{Result, ZipError};

/// Compressed bytes pulled from the device per refill.
const INPUT_BUFFER_SIZE: usize = 16 * 1024;

/// Directory cursor plus the decode context of the open entry.
pub(crate) struct UnzipEngine<'a> {
    device: DeviceRef<'a>,
    eocd: EndOfCentralDirectory,
    current: Option<(EntryLocation, CentralRecord)>,
    entry: Option<EntryDecoder>,
    #[cfg(test)]
    records_read: u64,
}

impl<'a> UnzipEngine<'a> {
    /// Bind to a device whose end records were already located.
    pub fn new(device: DeviceRef<'a>, eocd: EndOfCentralDirectory) -> Self {
        log::debug!(
            "central directory: {} entries at {:#x} ({} bytes)",
            eocd.entries,
            eocd.cd_offset,
            eocd.cd_size
        );
        Self {
            device,
            eocd,
            current: None,
            entry: None,
            #[cfg(test)]
            records_read: 0,
        }
    }

    /// Give the device back.
    pub fn into_device(self) -> DeviceRef<'a> {
        self.device
    }

    pub fn entries(&self) -> u64 {
        self.eocd.entries
    }

    pub fn comment(&self) -> &[u8] {
        &self.eocd.comment
    }

    /// Central records parsed so far.
    #[cfg(test)]
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// The record under the cursor.
    pub fn current(&self) -> Option<(EntryLocation, &CentralRecord)> {
        self.current.as_ref().map(|(loc, record)| (*loc, record))
    }

    pub fn go_to_first(&mut self) -> Result<()> {
        self.current = None;
        if self.eocd.entries == 0 {
            return Err(ZipError::EndOfList);
        }
        self.go_to(EntryLocation::new(0, self.eocd.cd_offset))
    }

    pub fn go_to_next(&mut self) -> Result<()> {
        let Some((location, record)) = self.current.take() else {
            return Err(ZipError::usage("no current entry"));
        };
        let next = location.index + 1;
        if next >= self.eocd.entries {
            return Err(ZipError::EndOfList);
        }
        self.go_to(EntryLocation::new(next, location.offset + record.disk_len()))
    }

    /// Move the cursor to a record location.
    pub fn go_to(&mut self, location: EntryLocation) -> Result<()> {
        self.current = None;
        if location.index >= self.eocd.entries {
            return Err(ZipError::EndOfList);
        }
        self.device.seek(SeekFrom::Start(location.offset))?;
        let record = CentralRecord::read(&mut *self.device)?;
        #[cfg(test)]
        {
            self.records_read += 1;
        }
        log::trace!("directory record #{}: {}", location.index, record.name_string());
        self.current = Some((location, record));
        Ok(())
    }

    /// Whether an entry is open for reading.
    pub fn is_entry_open(&self) -> bool {
        self.entry.is_some()
    }

    /// Open the entry under the cursor.
    pub fn open_entry(&mut self, raw: bool, password: Option<&[u8]>) -> Result<()> {
        if self.entry.is_some() {
            return Err(ZipError::usage("an entry is already open"));
        }
        let Some((_, record)) = self.current.as_ref() else {
            return Err(ZipError::usage("no current entry"));
        };

        let method = CompressionMethod::from_u16(record.method);
        if !raw && matches!(method, CompressionMethod::Unknown(_)) {
            return Err(ZipError::unsupported_method(method.to_string()));
        }

        self.device.seek(SeekFrom::Start(record.local_header_offset))?;
        let local = LocalHeader::read(&mut *self.device)?;
        let mut data_pos = record.local_header_offset + local.len();
        let mut compressed_left = record.compressed_size;

        let mut cipher = None;
        if record.flags & FLAG_ENCRYPTED != 0 && !raw {
            let Some(password) = password else {
                return Err(ZipError::BadPassword);
            };
            let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
            self.device.read_exact(&mut header)?;
            let check = if record.flags & FLAG_DATA_DESCRIPTOR != 0 {
                (record.mtime >> 8) as u8
            } else {
                (record.crc32 >> 24) as u8
            };
            let mut crypto = ZipCrypto::new(password);
            crypto.verify_header(header, check)?;
            cipher = Some(crypto);
            data_pos += ENCRYPTION_HEADER_SIZE as u64;
            compressed_left = compressed_left.saturating_sub(ENCRYPTION_HEADER_SIZE as u64);
        }

        let inflater = (!raw && method == CompressionMethod::Deflate).then(|| Decompress::new(false));
        log::debug!(
            "open entry {} ({}, raw={}) data at {:#x}",
            record.name_string(),
            method,
            raw,
            data_pos
        );

        self.entry = Some(EntryDecoder {
            raw,
            cipher,
            inflater,
            data_pos,
            compressed_left,
            uncompressed_size: record.uncompressed_size,
            expected_crc: record.crc32,
            produced: 0,
            hasher: Hasher::new(),
            input: Vec::new(),
            input_pos: 0,
            local_extra: local.extra,
        });
        Ok(())
    }

    /// Read decoded (or raw) bytes from the open entry.
    pub fn read_entry(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(entry) = self.entry.as_mut() else {
            return Err(ZipError::usage("no entry is open"));
        };
        entry.read(&mut self.device, buf)
    }

    /// Close the open entry, checking the CRC when it was read to the end.
    pub fn close_entry(&mut self) -> Result<()> {
        let Some(entry) = self.entry.take() else {
            return Err(ZipError::usage("no entry is open"));
        };
        if !entry.raw && entry.produced >= entry.uncompressed_size {
            let computed = entry.hasher.finalize();
            if computed != entry.expected_crc {
                return Err(ZipError::crc_mismatch(entry.expected_crc, computed));
            }
        }
        Ok(())
    }

    /// Bytes delivered from the open entry so far.
    pub fn entry_tell(&self) -> u64 {
        self.entry.as_ref().map_or(0, |e| e.produced)
    }

    /// Whether the open entry has nothing left to deliver.
    pub fn entry_eof(&self) -> bool {
        self.entry.as_ref().is_none_or(EntryDecoder::is_exhausted)
    }

    /// Extra field from the open entry's local header.
    pub fn local_extra(&self) -> Option<&[u8]> {
        self.entry.as_ref().map(|e| e.local_extra.as_slice())
    }
}

/// Decode state for one entry.
struct EntryDecoder {
    raw: bool,
    cipher: Option<ZipCrypto>,
    inflater: Option<Decompress>,
    /// Absolute offset of the next compressed byte on the device.
    data_pos: u64,
    compressed_left: u64,
    uncompressed_size: u64,
    expected_crc: u32,
    produced: u64,
    hasher: Hasher,
    input: Vec<u8>,
    input_pos: usize,
    local_extra: Vec<u8>,
}

impl EntryDecoder {
    fn is_exhausted(&self) -> bool {
        if self.inflater.is_some() {
            self.produced >= self.uncompressed_size
        } else {
            self.compressed_left == 0
        }
    }

    /// Pull compressed bytes from the device, decrypting them.
    fn fill(&mut self, device: &mut DeviceRef<'_>, dst: &mut [u8]) -> Result<usize> {
        let want = (dst.len() as u64).min(self.compressed_left) as usize;
        if want == 0 {
            return Ok(0);
        }
        device.seek(SeekFrom::Start(self.data_pos))?;
        let n = device.read(&mut dst[..want])?;
        if n == 0 {
            return Err(ZipError::corrupted(self.data_pos, "entry data truncated"));
        }
        if let Some(cipher) = self.cipher.as_mut() {
            cipher.decrypt(&mut dst[..n]);
        }
        self.data_pos += n as u64;
        self.compressed_left -= n as u64;
        Ok(n)
    }

    fn read(&mut self, device: &mut DeviceRef<'_>, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.inflater.is_none() {
            let n = self.fill(device, buf)?;
            if !self.raw {
                self.hasher.update(&buf[..n]);
            }
            self.produced += n as u64;
            return Ok(n);
        }

        loop {
            if self.input_pos == self.input.len() && self.compressed_left > 0 {
                let mut input = std::mem::take(&mut self.input);
                input.resize(INPUT_BUFFER_SIZE, 0);
                let n = self.fill(device, &mut input)?;
                input.truncate(n);
                self.input = input;
                self.input_pos = 0;
            }

            let Some(inflater) = self.inflater.as_mut() else {
                return Ok(0);
            };
            let in_before = inflater.total_in();
            let out_before = inflater.total_out();
            let status = inflater
                .decompress(&self.input[self.input_pos..], buf, FlushDecompress::None)
                .map_err(|e| ZipError::codec(e.to_string()))?;
            let consumed = (inflater.total_in() - in_before) as usize;
            let written = (inflater.total_out() - out_before) as usize;
            self.input_pos += consumed;

            if written > 0 {
                self.hasher.update(&buf[..written]);
                self.produced += written as u64;
                return Ok(written);
            }
            if status == Status::StreamEnd {
                return Ok(0);
            }
            let starved = self.input_pos == self.input.len() && self.compressed_left == 0;
            if consumed == 0 && starved {
                if self.produced >= self.uncompressed_size {
                    return Ok(0);
                }
                return Err(ZipError::corrupted(self.data_pos, "deflate stream truncated"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::header::LOCAL_HEADER_LEN;
    use std::io::{Cursor, Write};

    /// Stored entries laid out by hand so the engine is tested on its own.
    fn stored_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut records = Vec::new();
        for (name, data) in entries {
            let offset = out.len() as u64;
            let crc32 = crc32fast::hash(data);
            LocalHeader {
                version_needed: 10,
                crc32,
                compressed_size: data.len() as u32,
                uncompressed_size: data.len() as u32,
                name: name.as_bytes().to_vec(),
                ..LocalHeader::default()
            }
            .write(&mut out)
            .unwrap();
            out.write_all(data).unwrap();
            records.push(CentralRecord {
                version_needed: 10,
                crc32,
                compressed_size: data.len() as u64,
                uncompressed_size: data.len() as u64,
                local_header_offset: offset,
                name: name.as_bytes().to_vec(),
                ..CentralRecord::default()
            });
        }
        let cd_offset = out.len() as u64;
        for record in &records {
            record.write(&mut out).unwrap();
        }
        let eocd = EndOfCentralDirectory {
            entries: records.len() as u64,
            cd_size: out.len() as u64 - cd_offset,
            cd_offset,
            comment: b"hand made".to_vec(),
        };
        let end = out.len() as u64;
        eocd.write(&mut out, end, 0, false).unwrap();
        out
    }

    fn engine(data: Vec<u8>) -> UnzipEngine<'static> {
        let mut cursor = Cursor::new(data);
        let eocd = EndOfCentralDirectory::locate(&mut cursor).unwrap();
        UnzipEngine::new(DeviceRef::Owned(Box::new(cursor)), eocd)
    }

    #[test]
    fn test_walk_directory() {
        let mut engine = engine(stored_archive(&[("a", b"1"), ("b", b"22"), ("c", b"333")]));
        assert_eq!(engine.entries(), 3);
        assert_eq!(engine.comment(), b"hand made");

        engine.go_to_first().unwrap();
        let mut names = vec![engine.current().unwrap().1.name_string()];
        while engine.go_to_next().is_ok() {
            names.push(engine.current().unwrap().1.name_string());
        }
        assert_eq!(names, ["a", "b", "c"]);
        assert!(engine.current().is_none());
        assert_eq!(engine.records_read(), 3);
    }

    #[test]
    fn test_end_of_list() {
        let mut engine = engine(stored_archive(&[("only", b"x")]));
        engine.go_to_first().unwrap();
        assert!(matches!(engine.go_to_next(), Err(ZipError::EndOfList)));

        let mut empty = engine_from_empty();
        assert!(matches!(empty.go_to_first(), Err(ZipError::EndOfList)));
    }

    fn engine_from_empty() -> UnzipEngine<'static> {
        engine(stored_archive(&[]))
    }

    #[test]
    fn test_revisit_location() {
        let mut engine = engine(stored_archive(&[("a", b"1"), ("b", b"22")]));
        engine.go_to_first().unwrap();
        engine.go_to_next().unwrap();
        let (second, _) = engine.current().unwrap();

        engine.go_to_first().unwrap();
        engine.go_to(second).unwrap();
        assert_eq!(engine.current().unwrap().1.name_string(), "b");
    }

    #[test]
    fn test_read_stored_entry() {
        let mut engine = engine(stored_archive(&[("a", b"hello"), ("b", b"world!")]));
        engine.go_to_first().unwrap();
        engine.go_to_next().unwrap();
        engine.open_entry(false, None).unwrap();

        let mut buf = [0u8; 4];
        let mut out = Vec::new();
        loop {
            let n = engine.read_entry(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"world!");
        assert!(engine.entry_eof());
        assert_eq!(engine.entry_tell(), 6);
        engine.close_entry().unwrap();
    }

    #[test]
    fn test_crc_checked_on_close() {
        let mut data = stored_archive(&[("a", b"hello")]);
        // Corrupt the payload right after the 31-byte local header.
        data[31] ^= 0xFF;
        let mut engine = engine(data);
        engine.go_to_first().unwrap();
        engine.open_entry(false, None).unwrap();
        let mut buf = [0u8; 16];
        while engine.read_entry(&mut buf).unwrap() > 0 {}
        assert!(matches!(engine.close_entry(), Err(ZipError::CrcMismatch { .. })));
    }

    #[test]
    fn test_open_requires_current() {
        let mut engine = engine(stored_archive(&[("a", b"1")]));
        assert!(engine.open_entry(false, None).unwrap_err().is_usage());
        assert!(engine.close_entry().unwrap_err().is_usage());
    }

    #[test]
    fn test_local_header_len_constant() {
        let header = LocalHeader {
            name: b"abc".to_vec(),
            ..LocalHeader::default()
        };
        assert_eq!(header.len(), LOCAL_HEADER_LEN + 3);
    }
}
