use std::path::Path;

use tracing::warn;

use super::entry::{EntryRef, with_entry};
use super::metadata::{EntryMetadata, list_entries};
use crate::error::{Result, ZipError};
use crate::zip::ZipHandle;

/// Read access to an archive for the duration of one [`Archive::read`] call.
///
/// [`Archive::read`]: super::Archive::read
pub struct ArchiveReader<'h> {
    handle: &'h mut ZipHandle,
}

impl<'h> ArchiveReader<'h> {
    pub(crate) fn new(handle: &'h mut ZipHandle) -> Self {
        Self { handle }
    }

    /// Number of entries, files and directories alike.
    pub fn entry_count(&self) -> Result<usize> {
        self.handle.total_entries()
    }

    /// Metadata of every entry, in index order.
    pub fn entries(&mut self) -> Result<Vec<EntryMetadata>> {
        list_entries(self.handle)
    }

    /// Metadata of the entry called `name`.
    pub fn entry_named(&mut self, name: &str) -> Result<EntryMetadata> {
        EntryMetadata::read_named(self.handle, name)
    }

    /// Decompress the entry at `index` into memory.
    pub fn read_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        self.read(EntryRef::Index(index))
    }

    /// Decompress the entry called `name` into memory.
    pub fn read_entry_named(&mut self, name: &str) -> Result<Vec<u8>> {
        self.read(EntryRef::Name(name))
    }

    /// Decompress the entry at `index` straight into the file at `dest`.
    pub fn read_entry_to_file(&mut self, index: usize, dest: impl AsRef<Path>) -> Result<()> {
        self.read_to_file(EntryRef::Index(index), dest.as_ref())
    }

    /// Decompress the entry called `name` straight into the file at `dest`.
    pub fn read_entry_named_to_file(&mut self, name: &str, dest: impl AsRef<Path>) -> Result<()> {
        self.read_to_file(EntryRef::Name(name), dest.as_ref())
    }

    /// Decompress any addressed entry into memory.
    pub fn read<'e>(&mut self, entry: impl Into<EntryRef<'e>>) -> Result<Vec<u8>> {
        with_entry(self.handle, entry.into(), |h| {
            // Content is verified against the recorded size, so that size is
            // the whole buffer once it is known to be plausible.
            let size = h.entry_size()?;
            if size > h.entry_size_bound()? {
                warn!("entry claims {} bytes, more than its data can hold", size);
                return Err(ZipError::EntryReadFailed);
            }
            let size = usize::try_from(size).map_err(|_| ZipError::EntryReadFailed)?;
            let mut buf = Vec::new();
            buf.try_reserve_exact(size).map_err(|err| {
                warn!("cannot allocate {} bytes for entry: {}", size, err);
                ZipError::EntryReadFailed
            })?;
            buf.resize(size, 0);
            let read = h.entry_read_into(&mut buf)?;
            buf.truncate(read);
            Ok(buf)
        })
    }

    /// Decompress any addressed entry into the file at `dest`.
    pub fn read_to_file<'e>(&mut self, entry: impl Into<EntryRef<'e>>, dest: &Path) -> Result<()> {
        with_entry(self.handle, entry.into(), |h| h.entry_fread(dest))
    }
}
