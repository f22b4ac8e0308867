use tracing::warn;

use super::EntryMetadata;
use crate::error::Result;
use crate::zip::ZipHandle;

/// Addresses one entry of an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryRef<'a> {
    /// Zero-based position in the central directory.
    Index(usize),
    /// Relative path inside the archive.
    Name(&'a str),
}

impl From<usize> for EntryRef<'_> {
    fn from(index: usize) -> Self {
        EntryRef::Index(index)
    }
}

impl<'a> From<&'a str> for EntryRef<'a> {
    fn from(name: &'a str) -> Self {
        EntryRef::Name(name)
    }
}

impl<'a> From<&'a String> for EntryRef<'a> {
    fn from(name: &'a String) -> Self {
        EntryRef::Name(name)
    }
}

impl From<&EntryMetadata> for EntryRef<'_> {
    fn from(entry: &EntryMetadata) -> Self {
        EntryRef::Index(entry.index)
    }
}

/// Open `entry`, run `op` on the handle and close the entry again.
///
/// The entry is closed on every path. When `op` fails the close is best
/// effort and its own failure is only logged, so the caller sees `op`'s
/// error. When `op` succeeds a failing close is the result.
pub(crate) fn with_entry<T>(
    handle: &mut ZipHandle,
    entry: EntryRef<'_>,
    op: impl FnOnce(&mut ZipHandle) -> Result<T>,
) -> Result<T> {
    match entry {
        EntryRef::Index(index) => handle.entry_open_by_index(index)?,
        EntryRef::Name(name) => handle.entry_open(name)?,
    }

    match op(handle) {
        Ok(value) => {
            handle.entry_close()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(close_err) = handle.entry_close() {
                warn!("ignoring close failure of {:?} after '{}': {}", entry, err, close_err);
            }
            Err(err)
        }
    }
}
