//! Scoped, exclusive access to one archive file.
//!
//! An [`Archive`] holds no open file between calls. [`Archive::read`] and
//! [`Archive::write`] take the archive's lock, open the file, hand an
//! [`ArchiveReader`] or [`ArchiveWriter`] to the callback and close the
//! file again before returning, whether the callback succeeded, failed or
//! panicked.
//!
//! ## Locking
//!
//! The lock is per `Archive` value and is not reentrant: calling `read` or
//! `write` on the same `Archive` from inside its own callback deadlocks.
//! Two `Archive` values for the same path, or other processes, are not
//! coordinated at all.

mod entry;
mod metadata;
mod reader;
mod writer;

pub use entry::EntryRef;
pub use metadata::EntryMetadata;
pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::error::ZipError;
use crate::zip::{CompressionLevel, OpenMode, ZipHandle};

/// How [`Archive::write`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Start a new, empty archive, truncating any existing file.
    Overwrite,
    /// Add to the existing archive, which must already exist.
    Append,
}

impl From<WriteMode> for OpenMode {
    fn from(mode: WriteMode) -> Self {
        match mode {
            WriteMode::Overwrite => OpenMode::Write,
            WriteMode::Append => OpenMode::Append,
        }
    }
}

/// One ZIP file on disk. Creating it performs no I/O.
#[derive(Debug)]
pub struct Archive {
    path: PathBuf,
    level: CompressionLevel,
    lock: Mutex<()>,
}

impl Archive {
    /// Archive at `path`, compressed at the default level.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            level: CompressionLevel::default(),
            lock: Mutex::new(()),
        }
    }

    /// Compression level for entries written through this archive.
    pub fn with_compression_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression_level(&self) -> CompressionLevel {
        self.level
    }

    /// Open the archive for writing and run `action` on it.
    ///
    /// The archive is closed before this returns. If `action` fails its
    /// error is returned as is.
    pub fn write<T, E, F>(&self, mode: WriteMode, action: F) -> Result<T, E>
    where
        F: FnOnce(&mut ArchiveWriter<'_>) -> Result<T, E>,
        E: From<ZipError>,
    {
        self.scoped(mode.into(), |handle| action(&mut ArchiveWriter::new(handle)))
    }

    /// Open the archive for reading and run `action` on it.
    ///
    /// The archive is closed before this returns. If `action` fails its
    /// error is returned as is.
    pub fn read<T, E, F>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce(&mut ArchiveReader<'_>) -> Result<T, E>,
        E: From<ZipError>,
    {
        self.scoped(OpenMode::Read, |handle| action(&mut ArchiveReader::new(handle)))
    }

    fn scoped<T, E, F>(&self, mode: OpenMode, action: F) -> Result<T, E>
    where
        F: FnOnce(&mut ZipHandle) -> Result<T, E>,
        E: From<ZipError>,
    {
        // No state outlives a call, so a panic in an earlier callback
        // leaves nothing to repair.
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut handle = ZipHandle::open(&self.path, self.level, mode)?;
        let result = action(&mut handle);
        if result.is_err() {
            debug!("{:?} action on {} failed", mode, self.path.display());
        }
        handle.close();
        result
    }
}
