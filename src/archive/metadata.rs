use super::entry::{EntryRef, with_entry};
use crate::error::Result;
use crate::zip::ZipHandle;

/// Point-in-time snapshot of one archive entry.
///
/// Holds no reference to the archive. It goes stale once the archive is
/// changed, so do not mix snapshots taken before a write with entries
/// addressed after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryMetadata {
    /// Zero-based position in the archive's central directory.
    pub index: usize,
    /// Path relative to the archive root, `/`-separated. Never has a drive
    /// letter or a leading slash.
    pub name: String,
    pub is_directory: bool,
    /// Uncompressed size in bytes.
    pub uncompressed_size: u64,
    /// CRC-32 of the uncompressed content.
    pub crc32: u32,
}

impl EntryMetadata {
    /// Snapshot the entry at `index`, opening and closing it.
    pub(crate) fn read(handle: &mut ZipHandle, index: usize) -> Result<Self> {
        with_entry(handle, EntryRef::Index(index), |h| Self::current(h, index))
    }

    /// Snapshot the entry called `name`, opening and closing it.
    pub(crate) fn read_named(handle: &mut ZipHandle, name: &str) -> Result<Self> {
        with_entry(handle, EntryRef::Name(name), |h| {
            let index = h.entry_index()?;
            Self::current(h, index)
        })
    }

    fn current(handle: &ZipHandle, index: usize) -> Result<Self> {
        Ok(Self {
            index,
            name: handle.entry_name()?,
            is_directory: handle.entry_is_dir()?,
            uncompressed_size: handle.entry_size()?,
            crc32: handle.entry_crc32()?,
        })
    }
}

/// Metadata of every entry in index order; fails as a whole if any entry
/// cannot be read.
pub(crate) fn list_entries(handle: &mut ZipHandle) -> Result<Vec<EntryMetadata>> {
    let count = handle.total_entries()?;
    (0..count)
        .map(|index| EntryMetadata::read(handle, index))
        .collect()
}
