//! Traditional PKWARE encryption.
//!
//! The legacy ZIP stream cipher: three 32-bit keys stirred with CRC-32 steps
//! and a 12-byte header whose last byte doubles as a password check. Weak by
//! modern standards; kept for interoperability with archives that use it.

use std::time::{SystemTime, UNIX_EPOCH};
use zipnav_core::error::{Result, ZipError};

/// Reflected CRC-32 table (polynomial 0xEDB88320) for single-byte key steps.
const CRC32_TABLE: [u32; 256] = build_crc32_table();

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < table.len() {
        let mut value = n as u32;
        let mut bit = 0;
        while bit < 8 {
            let mask = (value & 1).wrapping_neg();
            value = (value >> 1) ^ (0xEDB8_8320 & mask);
            bit += 1;
        }
        table[n] = value;
        n += 1;
    }
    table
}

const INITIAL_KEYS: (u32, u32, u32) = (0x12345678, 0x23456789, 0x34567890);

/// Size of the encryption header in bytes.
pub const ENCRYPTION_HEADER_SIZE: usize = 12;

/// Cipher state for one entry.
#[derive(Debug, Clone)]
pub struct ZipCrypto {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl ZipCrypto {
    /// Cipher keyed with `password`.
    pub fn new(password: &[u8]) -> Self {
        let (key0, key1, key2) = INITIAL_KEYS;
        let mut cipher = Self { key0, key1, key2 };
        for &byte in password {
            cipher.update_keys(byte);
        }
        cipher
    }

    #[inline]
    fn update_keys(&mut self, byte: u8) {
        self.key0 = crc32_step(self.key0, byte);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xFF)
            .wrapping_mul(134775813)
            .wrapping_add(1);
        self.key2 = crc32_step(self.key2, (self.key1 >> 24) as u8);
    }

    #[inline]
    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Encrypt a buffer in place.
    pub fn encrypt(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            let plain = *byte;
            *byte = plain ^ self.stream_byte();
            self.update_keys(plain);
        }
    }

    /// Decrypt a buffer in place.
    pub fn decrypt(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            let plain = *byte ^ self.stream_byte();
            self.update_keys(plain);
            *byte = plain;
        }
    }

    /// Build the encrypted header that precedes entry data.
    ///
    /// `check_byte` is what readers compare the last decrypted byte with:
    /// the high byte of the CRC, or of the DOS time when the entry carries a
    /// data descriptor.
    pub fn header(&mut self, check_byte: u8, random: [u8; 11]) -> [u8; ENCRYPTION_HEADER_SIZE] {
        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        header[..11].copy_from_slice(&random);
        header[11] = check_byte;
        self.encrypt(&mut header);
        header
    }

    /// Decrypt a header read from an entry and compare its check byte.
    pub fn verify_header(
        &mut self,
        mut header: [u8; ENCRYPTION_HEADER_SIZE],
        check_byte: u8,
    ) -> Result<()> {
        self.decrypt(&mut header);
        if header[11] != check_byte {
            log::debug!(
                "password check failed: expected {:#04x}, got {:#04x}",
                check_byte,
                header[11]
            );
            return Err(ZipError::BadPassword);
        }
        Ok(())
    }
}

/// Filler bytes for a new encryption header, seeded from the clock.
pub fn random_header_bytes() -> [u8; 11] {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut state = nanos ^ u64::from(std::process::id()).rotate_left(32);
    let mut random = [0u8; 11];
    for byte in random.iter_mut() {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        *byte = (state >> 56) as u8;
    }
    random
}

#[inline]
fn crc32_step(crc: u32, byte: u8) -> u32 {
    CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let plaintext = b"Hello, World! This is a test of ZIP encryption.".to_vec();
        let mut data = plaintext.clone();

        ZipCrypto::new(b"secret").encrypt(&mut data);
        assert_ne!(data, plaintext);

        ZipCrypto::new(b"secret").decrypt(&mut data);
        assert_eq!(data, plaintext);
    }

    #[test]
    fn test_password_changes_keystream() {
        let mut a = b"Test data".to_vec();
        let mut b = a.clone();
        ZipCrypto::new(b"password1").encrypt(&mut a);
        ZipCrypto::new(b"password2").encrypt(&mut b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_header_verification() {
        let header = ZipCrypto::new(b"correct").header(0xDE, [0x11; 11]);

        assert!(ZipCrypto::new(b"correct").verify_header(header, 0xDE).is_ok());
        let err = ZipCrypto::new(b"wrong").verify_header(header, 0xDE).unwrap_err();
        assert!(matches!(err, ZipError::BadPassword));
    }

    #[test]
    fn test_header_then_data_shares_keystream() {
        let mut writer = ZipCrypto::new(b"pw");
        let header = writer.header(0x42, random_header_bytes());
        let mut body = b"payload".to_vec();
        writer.encrypt(&mut body);

        let mut reader = ZipCrypto::new(b"pw");
        reader.verify_header(header, 0x42).unwrap();
        reader.decrypt(&mut body);
        assert_eq!(body, b"payload");
    }

    #[test]
    fn test_crc32_step_matches_crc32fast() {
        // Full CRC-32 is the inverted step function folded over the input.
        let data = b"123456789";
        let folded = !data.iter().fold(0xFFFF_FFFF, |crc, &b| crc32_step(crc, b));
        assert_eq!(folded, crc32fast::hash(data));
    }
}
