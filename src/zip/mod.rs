//! ZIP codec: format structures, parsing, compression and the stateful
//! archive handle.
//!
//! ## Architecture
//!
//! - [`structures`]: data structures representing ZIP format records
//! - [`parser`]: reads the central directory of an existing archive
//! - [`compression`]: DEFLATE/STORED encoding and verified decoding of entries
//! - [`handle`]: [`ZipHandle`], the open archive with its current-entry cursor
//!
//! ## Writing strategy
//!
//! Every entry close appends the entry's local record after the last one
//! and rewrites the central directory and end record behind it, so the
//! file on disk is a complete archive after each entry. Appending to an
//! existing archive starts writing where its central directory began.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - Reading ZIP64 archives; writing is limited to classic ZIP sizes
//! - STORED and DEFLATE compression methods
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support
//! - No BZIP2, LZMA, or other compression methods

mod compression;
mod handle;
mod parser;
mod structures;

pub use compression::CompressionLevel;
pub(crate) use handle::{OpenMode, ZipHandle};
