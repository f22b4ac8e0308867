use std::path::Path;

use super::entry::{EntryRef, with_entry};
use super::metadata::{EntryMetadata, list_entries};
use crate::error::Result;
use crate::zip::ZipHandle;

/// Write access to an archive for the duration of one [`Archive::write`] call.
///
/// Writing to a name that already exists replaces that entry in place, it
/// keeps its index. Addressing by index only reaches existing entries.
///
/// [`Archive::write`]: super::Archive::write
pub struct ArchiveWriter<'h> {
    handle: &'h mut ZipHandle,
}

impl<'h> ArchiveWriter<'h> {
    pub(crate) fn new(handle: &'h mut ZipHandle) -> Self {
        Self { handle }
    }

    /// Number of entries, including those written earlier in this call.
    pub fn entry_count(&self) -> Result<usize> {
        self.handle.total_entries()
    }

    /// Metadata of every entry, in index order, including entries written
    /// earlier in this call.
    pub fn entries(&mut self) -> Result<Vec<EntryMetadata>> {
        list_entries(self.handle)
    }

    /// Replace the content of the existing entry at `index`.
    pub fn write_entry(&mut self, index: usize, data: &[u8]) -> Result<()> {
        self.write(EntryRef::Index(index), data)
    }

    /// Store `data` under `name`, creating or replacing the entry.
    pub fn write_entry_named(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.write(EntryRef::Name(name), data)
    }

    /// Replace the content of the existing entry at `index` with the file at `source`.
    pub fn write_entry_from_file(&mut self, index: usize, source: impl AsRef<Path>) -> Result<()> {
        self.write_from_file(EntryRef::Index(index), source.as_ref())
    }

    /// Store the file at `source` under `name`, creating or replacing the entry.
    pub fn write_entry_named_from_file(
        &mut self,
        name: &str,
        source: impl AsRef<Path>,
    ) -> Result<()> {
        self.write_from_file(EntryRef::Name(name), source.as_ref())
    }

    /// Create a directory entry. A trailing `/` is added when missing.
    pub fn add_directory(&mut self, name: &str) -> Result<()> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{name}/")
        };
        with_entry(self.handle, EntryRef::Name(&name), |_| Ok(()))
    }

    /// Store `data` in any addressed entry.
    pub fn write<'e>(&mut self, entry: impl Into<EntryRef<'e>>, data: &[u8]) -> Result<()> {
        with_entry(self.handle, entry.into(), |h| h.entry_write(data))
    }

    /// Store the file at `source` in any addressed entry.
    pub fn write_from_file<'e>(
        &mut self,
        entry: impl Into<EntryRef<'e>>,
        source: &Path,
    ) -> Result<()> {
        with_entry(self.handle, entry.into(), |h| h.entry_fwrite(source))
    }
}
