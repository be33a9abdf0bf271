//! Error types for zipnav operations.
//!
//! Every failure is a [`ZipError`]. Handles and streams additionally keep
//! the integer code of their last operation (see [`codes`]) so callers that
//! poll status after the fact can do so.

use std::io;
use thiserror::Error;

/// Integer result codes mirrored by [`ZipError::code`].
///
/// The values follow the classic minizip/zlib numbering so that codes read
/// back from a handle can be compared with documentation of those engines.
pub mod codes {
    /// Success.
    pub const OK: i32 = 0;
    /// Underlying I/O failure.
    pub const ERRNO: i32 = -1;
    /// Compressed stream is corrupt.
    pub const DATA_ERROR: i32 = -3;
    /// The directory has no more entries.
    pub const END_OF_LIST: i32 = -100;
    /// Bad argument or call in the wrong state.
    pub const PARAM_ERROR: i32 = -102;
    /// Structural damage in the container.
    pub const BAD_ZIPFILE: i32 = -103;
    /// Internal inconsistency in the engine.
    pub const INTERNAL_ERROR: i32 = -104;
    /// Decoded data does not match the recorded CRC-32.
    pub const CRC_ERROR: i32 = -105;
    /// Password check byte did not match.
    pub const BAD_PASSWORD: i32 = -106;
    /// The container could not be opened.
    pub const OPEN_ERROR: i32 = -1000;
}

/// The main error type for zipnav operations.
#[derive(Debug, Error)]
pub enum ZipError {
    /// I/O error from the underlying device.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid signature in a container record.
    #[error("Invalid magic number: expected {expected:02x?}, found {found:02x?}")]
    InvalidMagic {
        /// Expected magic bytes.
        expected: Vec<u8>,
        /// Actual magic bytes found.
        found: Vec<u8>,
    },

    /// Unsupported compression method.
    #[error("Unsupported compression method: {method}")]
    UnsupportedMethod {
        /// The compression method identifier.
        method: String,
    },

    /// CRC checksum mismatch.
    #[error("CRC mismatch: expected {expected:#x}, computed {computed:#x}")]
    CrcMismatch {
        /// Expected CRC value from the directory.
        expected: u32,
        /// Computed CRC value from data.
        computed: u32,
    },

    /// Corrupted data in the container.
    #[error("Corrupted data at offset {offset}: {message}")]
    CorruptedData {
        /// Byte offset where corruption was detected.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid header format.
    #[error("Invalid header: {message}")]
    InvalidHeader {
        /// Description of the header error.
        message: String,
    },

    /// The directory cursor ran past the last entry.
    #[error("End of entry list")]
    EndOfList,

    /// Entry not found in archive.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// Name of the missing entry.
        name: String,
    },

    /// A parameter was rejected before touching any state.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Description of the bad parameter.
        message: String,
    },

    /// The call is not allowed in the current state of the handle.
    #[error("Usage error: {message}")]
    Usage {
        /// Description of the violated precondition.
        message: String,
    },

    /// Legacy encryption header did not verify.
    #[error("Wrong password for entry")]
    BadPassword,

    /// The DEFLATE codec rejected the stream.
    #[error("Codec error: {message}")]
    Codec {
        /// Message reported by the codec.
        message: String,
    },

    /// The container or its device could not be opened.
    #[error("Could not open {target}: {message}")]
    Open {
        /// What was being opened (usually a path).
        target: String,
        /// Why it failed.
        message: String,
    },
}

/// Result type alias for zipnav operations.
pub type Result<T> = std::result::Result<T, ZipError>;

impl ZipError {
    /// Create an invalid magic error.
    pub fn invalid_magic(expected: impl Into<Vec<u8>>, found: impl Into<Vec<u8>>) -> Self {
        Self::InvalidMagic {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create an unsupported method error.
    pub fn unsupported_method(method: impl Into<String>) -> Self {
        Self::UnsupportedMethod {
            method: method.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(expected: u32, computed: u32) -> Self {
        Self::CrcMismatch { expected, computed }
    }

    /// Create a corrupted data error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptedData {
            offset,
            message: message.into(),
        }
    }

    /// Create an invalid header error.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader {
            message: message.into(),
        }
    }

    /// Create an entry not found error.
    pub fn entry_not_found(name: impl Into<String>) -> Self {
        Self::EntryNotFound { name: name.into() }
    }

    /// Create an invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a usage error.
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// Create a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec {
            message: message.into(),
        }
    }

    /// Create an open failure.
    pub fn open_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Open {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Integer code for this error, as stored in a handle's last-error slot.
    pub fn code(&self) -> i32 {
        match self {
            Self::Io(_) => codes::ERRNO,
            Self::InvalidMagic { .. }
            | Self::InvalidHeader { .. }
            | Self::CorruptedData { .. }
            | Self::UnsupportedMethod { .. } => codes::BAD_ZIPFILE,
            Self::CrcMismatch { .. } => codes::CRC_ERROR,
            Self::EndOfList | Self::EntryNotFound { .. } => codes::END_OF_LIST,
            Self::InvalidParameter { .. } | Self::Usage { .. } => codes::PARAM_ERROR,
            Self::BadPassword => codes::BAD_PASSWORD,
            Self::Codec { .. } => codes::DATA_ERROR,
            Self::Open { .. } => codes::OPEN_ERROR,
        }
    }

    /// Whether this is a usage (precondition) error rather than an engine error.
    pub fn is_usage(&self) -> bool {
        matches!(self, Self::Usage { .. })
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(inner) => inner,
            ZipError::Usage { .. } | ZipError::InvalidParameter { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            ZipError::EntryNotFound { .. } => io::Error::new(io::ErrorKind::NotFound, err),
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}
