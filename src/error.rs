//! Failure kinds reported by archive operations.
//!
//! Every public operation returns one of a small, closed set of failures.
//! They are terminal for the operation that raised them: nothing in this
//! crate retries, and callers are expected to treat them as fatal for
//! that operation rather than probe and recover.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZipError {
    /// The archive could not be opened or created.
    #[error("failed to open archive {}", .0.display())]
    ArchiveOpenFailed(PathBuf),

    /// No entry with that name exists (read mode), or one could not be
    /// created (write and append modes).
    #[error("failed to open entry '{0}' in archive")]
    EntryOpenFailed(String),

    #[error("failed to open entry at index {0}")]
    EntryOpenByIndexFailed(usize),

    /// The current entry could not be finalized.
    #[error("failed to close entry")]
    EntryCloseFailed,

    #[error("failed to get information for current entry")]
    EntryInfoUnavailable,

    #[error("failed to read entry")]
    EntryReadFailed,

    #[error("failed to write entry")]
    EntryWriteFailed,

    #[error("failed to get entry count")]
    EntryCountUnavailable,
}

pub type Result<T> = std::result::Result<T, ZipError>;
