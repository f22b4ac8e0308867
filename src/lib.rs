//! # zipcode
//!
//! Read and write ZIP archives through scoped, exclusive access.
//!
//! An [`Archive`] names a ZIP file on disk. Each [`Archive::read`] or
//! [`Archive::write`] call locks the archive, opens the file, passes a
//! reader or writer to your callback and closes the file again before
//! returning, on success and on failure alike. Inside the callback every
//! entry operation opens its entry, transfers the data and closes the entry,
//! so the archive is never left with an entry half-open.
//!
//! ## Features
//!
//! - List entries with their name, size, CRC-32 and directory flag
//! - Extract entries to memory or straight to a file
//! - Create archives, or append to existing ones, from memory or from files
//! - DEFLATE compression with a configurable level (0 stores entries as is)
//! - Reads ZIP64 archives
//!
//! ## Example
//!
//! ```no_run
//! use zipcode::{Archive, WriteMode, ZipError};
//!
//! fn main() -> Result<(), ZipError> {
//!     let archive = Archive::new("notes.zip");
//!
//!     archive.write(WriteMode::Overwrite, |writer| {
//!         writer.add_directory("notes")?;
//!         writer.write_entry_named("notes/today.txt", b"buy milk")
//!     })?;
//!
//!     let text = archive.read(|reader| {
//!         for entry in reader.entries()? {
//!             println!("{} ({} bytes)", entry.name, entry.uncompressed_size);
//!         }
//!         reader.read_entry_named("notes/today.txt")
//!     })?;
//!     assert_eq!(text, b"buy milk");
//!
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod error;
mod io;
mod zip;

pub use archive::{Archive, ArchiveReader, ArchiveWriter, EntryMetadata, EntryRef, WriteMode};
pub use error::{Result, ZipError};
pub use zip::CompressionLevel;
