//! # zipnav core
//!
//! Core components shared by the zipnav crates:
//!
//! - [`error`]: the [`ZipError`] type and the integer result [`codes`]
//! - [`device`]: the [`Device`] boundary and the [`Sequential`] wrapper
//! - [`entry`]: entry metadata, DOS and extended timestamps
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Streams: EntryReader / EntryWriter, GzipStream          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Navigation: ZipArchive, EntryIndex, EntryCursor         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Engine: directory cursor, record codec, flate2          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Boundary (this crate): Device, ZipError, EntryMetadata  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use zipnav_core::device::{Device, Sequential};
//! use zipnav_core::entry::{datetime_to_dos, dos_to_datetime};
//!
//! let sink = Sequential::new(Vec::new());
//! assert!(sink.is_sequential());
//!
//! let now = chrono::NaiveDate::from_ymd_opt(2024, 2, 29)
//!     .unwrap()
//!     .and_hms_opt(12, 30, 10)
//!     .unwrap();
//! let (time, date) = datetime_to_dos(&now);
//! assert_eq!(dos_to_datetime(time, date), Some(now));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod device;
pub mod entry;
pub mod error;

// Re-exports for convenience
pub use device::{Device, Sequential};
pub use entry::{CompressionMethod, EntryMetadata, NewEntry};
pub use error::{Result, ZipError, codes};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::device::{Device, Sequential};
    pub use crate::entry::{CompressionMethod, EntryMetadata, NewEntry};
    pub use crate::error::{Result, ZipError};
}
