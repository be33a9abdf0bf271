//! # zipnav archive
//!
//! Name-indexed ZIP navigation and entry streams, plus a gzip stream
//! wrapper.
//!
//! - **ZIP**: [`zip::ZipArchive`] opens an archive over a file path or any
//!   [`Device`](zipnav_core::Device) and looks entries up by name without
//!   reading the whole central directory up front. [`zip::EntryReader`] and
//!   [`zip::EntryWriter`] expose one entry at a time as a `std::io` stream.
//! - **GZIP**: [`gzip::GzipStream`] reads or writes a single gzip file.
//!
//! ## Example
//!
//! ```rust
//! use std::io::{Cursor, Read, Write};
//! use zipnav_archive::zip::{EntryReader, EntryWriter, Mode, ReadOptions, WriteOptions, ZipArchive};
//! use zipnav_archive::CaseSensitivity;
//! use zipnav_core::NewEntry;
//!
//! let mut buf = Cursor::new(Vec::new());
//! {
//!     let mut archive = ZipArchive::with_device(&mut buf);
//!     archive.open(Mode::Create).unwrap();
//!     for (name, text) in [("docs/a.txt", "alpha"), ("docs/b.txt", "beta")] {
//!         let mut writer =
//!             EntryWriter::open(&mut archive, &NewEntry::new(name), WriteOptions::default())
//!                 .unwrap();
//!         writer.write_all(text.as_bytes()).unwrap();
//!         writer.close().unwrap();
//!     }
//!     archive.close().unwrap();
//! }
//!
//! let mut archive = ZipArchive::with_device(&mut buf);
//! archive.open(Mode::Unzip).unwrap();
//! assert_eq!(archive.file_name_list().unwrap(), ["docs/a.txt", "docs/b.txt"]);
//!
//! archive.set_current_file("docs/b.txt", CaseSensitivity::Sensitive).unwrap();
//! let mut reader = EntryReader::open(&mut archive, ReadOptions::default()).unwrap();
//! let mut text = String::new();
//! reader.read_to_string(&mut text).unwrap();
//! assert_eq!(text, "beta");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod gzip;
pub mod zip;

// Re-exports
pub use gzip::{GzipMode, GzipStream};
pub use zip::{
    ArchiveConfig, CaseSensitivity, EntryReader, EntryWriter, Mode, ReadOptions, WriteOptions,
    ZipArchive,
};
