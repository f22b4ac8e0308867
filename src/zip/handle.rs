//! Stateful archive handle: one open ZIP file plus its current-entry cursor.
//!
//! The handle exposes the primitive, cursor-based operations everything
//! above it is built from. At most one entry is open at a time; entry
//! level calls require the cursor to be set, handle level calls require
//! it to be idle. Internal failures are logged with their cause and
//! reported as the matching [`ZipError`] kind.

use std::fs::File;
use std::io::{self, Read, Write};
use std::mem;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::{debug, trace, warn};

use super::compression::{CompressionLevel, EntryEncoder, MAX_DEFLATE_RATIO, entry_decoder};
use super::parser::ZipParser;
use super::structures::{CompressionMethod, EndOfCentralDirectory, ZipFileEntry, dos_now};
use crate::error::{Result, ZipError};
use crate::io::{LocalFile, ReadAt, SectionReader};

/// Access mode of an open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Read and extract; the file must exist.
    Read,
    /// Create an empty archive, truncating any existing file.
    Write,
    /// Add entries to an existing archive.
    Append,
}

enum EntryCursor {
    Idle,
    Reading(usize),
    Writing(PendingEntry),
}

struct PendingEntry {
    name: String,
    /// Index of the record this entry replaces, if any.
    replaces: Option<usize>,
    encoder: EntryEncoder,
    /// Whether any data was written, even an empty buffer.
    touched: bool,
    /// A transfer into this entry failed; its data is never stored.
    failed: bool,
}

pub struct ZipHandle {
    path: PathBuf,
    mode: OpenMode,
    level: CompressionLevel,
    file: LocalFile,
    entries: Vec<ZipFileEntry>,
    /// Where the next local record goes; the central directory follows it.
    data_end: u64,
    cursor: EntryCursor,
    closed: bool,
}

/// Normalize an entry name: forward slashes, no leading slash.
pub(crate) fn normalize_name(name: &str) -> String {
    name.replace('\\', "/").trim_start_matches('/').to_string()
}

impl ZipHandle {
    /// Open `path` in the given mode.
    ///
    /// `level` only matters for entries written through this handle.
    pub fn open(path: &Path, level: CompressionLevel, mode: OpenMode) -> Result<Self> {
        let opened = match mode {
            OpenMode::Read => Self::open_existing(path, LocalFile::open(path)),
            OpenMode::Append => Self::open_existing(path, LocalFile::open_rw(path)),
            OpenMode::Write => Self::create(path),
        };
        let (file, entries, data_end) = opened.map_err(|err| {
            debug!("cannot open {} ({:?}): {:#}", path.display(), mode, err);
            ZipError::ArchiveOpenFailed(path.to_path_buf())
        })?;

        debug!(
            "opened {} ({:?}, {} entries)",
            path.display(),
            mode,
            entries.len()
        );
        Ok(Self {
            path: path.to_path_buf(),
            mode,
            level,
            file,
            entries,
            data_end,
            cursor: EntryCursor::Idle,
            closed: false,
        })
    }

    fn open_existing(
        path: &Path,
        file: anyhow::Result<LocalFile>,
    ) -> anyhow::Result<(LocalFile, Vec<ZipFileEntry>, u64)> {
        let file = file?;
        let cd = ZipParser::new(&file)
            .read_central_directory()
            .with_context(|| format!("Cannot read directory of {}", path.display()))?;
        Ok((file, cd.entries, cd.offset))
    }

    fn create(path: &Path) -> anyhow::Result<(LocalFile, Vec<ZipFileEntry>, u64)> {
        let mut file = LocalFile::create(path)?;
        // An empty archive is just its end record
        write_central_directory(&mut file, &[], 0)?;
        Ok((file, Vec::new(), 0))
    }

    /// Close the archive and release the file. Never fails: an entry left
    /// open is discarded and problems are only logged.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match mem::replace(&mut self.cursor, EntryCursor::Idle) {
            EntryCursor::Idle => {}
            EntryCursor::Reading(index) => {
                warn!("closing {} with entry {} still open", self.path.display(), index)
            }
            EntryCursor::Writing(pending) => warn!(
                "closing {} with entry '{}' still open; its data is discarded",
                self.path.display(),
                pending.name
            ),
        }

        if self.mode != OpenMode::Read {
            if let Err(err) = self.file.sync() {
                warn!("failed to sync {}: {:#}", self.path.display(), err);
            }
        }
        debug!("closed {}", self.path.display());
    }

    /// Open an entry by name.
    ///
    /// In read mode the entry must exist. In write and append modes an
    /// existing entry of that name is replaced, otherwise a new one is
    /// appended.
    pub fn entry_open(&mut self, name: &str) -> Result<()> {
        let fail = || ZipError::EntryOpenFailed(name.to_string());
        if !matches!(self.cursor, EntryCursor::Idle) {
            warn!("cannot open entry '{}': another entry is open", name);
            return Err(fail());
        }

        let name = normalize_name(name);
        if name.is_empty() {
            return Err(fail());
        }
        let existing = self.entries.iter().position(|e| e.file_name == name);
        trace!("opening entry '{}' (existing index {:?})", name, existing);

        self.cursor = match (self.mode, existing) {
            (OpenMode::Read, Some(index)) => EntryCursor::Reading(index),
            (OpenMode::Read, None) => return Err(fail()),
            (_, replaces) => EntryCursor::Writing(PendingEntry {
                name,
                replaces,
                encoder: EntryEncoder::new(self.level),
                touched: false,
                failed: false,
            }),
        };
        Ok(())
    }

    /// Open an entry by its index in the central directory.
    ///
    /// In write and append modes this positions on the existing entry for
    /// replacement.
    pub fn entry_open_by_index(&mut self, index: usize) -> Result<()> {
        if !matches!(self.cursor, EntryCursor::Idle) {
            warn!("cannot open entry {}: another entry is open", index);
            return Err(ZipError::EntryOpenByIndexFailed(index));
        }
        let Some(existing) = self.entries.get(index) else {
            return Err(ZipError::EntryOpenByIndexFailed(index));
        };

        self.cursor = match self.mode {
            OpenMode::Read => EntryCursor::Reading(index),
            OpenMode::Write | OpenMode::Append => EntryCursor::Writing(PendingEntry {
                name: existing.file_name.clone(),
                replaces: Some(index),
                encoder: EntryEncoder::new(self.level),
                touched: false,
                failed: false,
            }),
        };
        trace!("opened entry {}", index);
        Ok(())
    }

    /// Close the current entry. For an entry being written this stores
    /// its data and rewrites the central directory.
    pub fn entry_close(&mut self) -> Result<()> {
        match mem::replace(&mut self.cursor, EntryCursor::Idle) {
            EntryCursor::Idle => Err(ZipError::EntryCloseFailed),
            EntryCursor::Reading(index) => {
                trace!("closed entry {}", index);
                Ok(())
            }
            EntryCursor::Writing(pending) if pending.failed => {
                warn!("discarding entry '{}' after a failed write", pending.name);
                Err(ZipError::EntryCloseFailed)
            }
            EntryCursor::Writing(pending) if pending.replaces.is_some() && !pending.touched => {
                trace!("closed untouched entry '{}'", pending.name);
                Ok(())
            }
            EntryCursor::Writing(pending) => {
                let name = pending.name.clone();
                self.commit(pending).map_err(|err| {
                    warn!("failed to store entry '{}': {:#}", name, err);
                    ZipError::EntryCloseFailed
                })
            }
        }
    }

    fn commit(&mut self, pending: PendingEntry) -> anyhow::Result<()> {
        let PendingEntry {
            name,
            replaces,
            encoder,
            ..
        } = pending;
        let encoded = encoder.finish()?;
        let is_directory = name.ends_with('/');
        if is_directory && encoded.size > 0 {
            bail!("Directory entry '{}' cannot hold data", name);
        }
        let (last_mod_time, last_mod_date) = dos_now();

        let entry = ZipFileEntry {
            file_name: name,
            compression_method: encoded.method,
            compressed_size: encoded.data.len() as u64,
            uncompressed_size: encoded.size,
            crc32: encoded.crc32,
            lfh_offset: self.data_end,
            last_mod_time,
            last_mod_date,
            is_directory,
            central_record: None,
        };

        let mut record = Vec::with_capacity(entry.local_header_len() as usize + encoded.data.len());
        entry.write_local_header(&mut record)?;
        record.extend_from_slice(&encoded.data);
        let data_end = self.data_end + record.len() as u64;

        let index = replaces.unwrap_or(self.entries.len());
        let mut entries = self.entries.clone();
        match replaces {
            Some(index) => entries[index] = entry,
            None => entries.push(entry),
        }

        // The file is untouched until the new directory is known to fit
        record.extend_from_slice(&central_directory(&entries, data_end)?);
        let written = self
            .file
            .write_all_at(self.data_end, &record)
            .and_then(|_| self.file.set_len(self.data_end + record.len() as u64));
        if let Err(err) = written {
            self.restore_directory();
            return Err(err);
        }

        debug!(
            "stored entry {} '{}' ({} -> {} bytes)",
            index,
            entries[index].file_name,
            encoded.size,
            encoded.data.len()
        );
        self.entries = entries;
        self.data_end = data_end;
        Ok(())
    }

    /// Put back the directory of the last successful commit after a
    /// failed write may have overwritten it.
    fn restore_directory(&mut self) {
        if let Err(err) = write_central_directory(&mut self.file, &self.entries, self.data_end) {
            warn!(
                "failed to restore central directory of {}: {:#}",
                self.path.display(),
                err
            );
        }
    }

    fn current(&self) -> Result<Current<'_>> {
        match &self.cursor {
            EntryCursor::Idle => Err(ZipError::EntryInfoUnavailable),
            EntryCursor::Reading(index) => Ok(Current::Stored(*index, &self.entries[*index])),
            EntryCursor::Writing(pending) => match (pending.replaces, pending.touched) {
                (Some(index), false) => Ok(Current::Stored(index, &self.entries[index])),
                (replaces, _) => Ok(Current::Pending(
                    replaces.unwrap_or(self.entries.len()),
                    pending,
                )),
            },
        }
    }

    /// Name of the current entry, relative to the archive root.
    pub fn entry_name(&self) -> Result<String> {
        Ok(match self.current()? {
            Current::Stored(_, entry) => entry.file_name.clone(),
            Current::Pending(_, pending) => pending.name.clone(),
        })
    }

    /// Index of the current entry. A new entry being written reports the
    /// index it will have once closed.
    pub fn entry_index(&self) -> Result<usize> {
        Ok(match self.current()? {
            Current::Stored(index, _) | Current::Pending(index, _) => index,
        })
    }

    pub fn entry_is_dir(&self) -> Result<bool> {
        Ok(match self.current()? {
            Current::Stored(_, entry) => entry.is_directory,
            Current::Pending(_, pending) => pending.name.ends_with('/'),
        })
    }

    /// Uncompressed size in bytes.
    pub fn entry_size(&self) -> Result<u64> {
        Ok(match self.current()? {
            Current::Stored(_, entry) => entry.uncompressed_size,
            Current::Pending(_, pending) => pending.encoder.size(),
        })
    }

    pub fn entry_crc32(&self) -> Result<u32> {
        Ok(match self.current()? {
            Current::Stored(_, entry) => entry.crc32,
            Current::Pending(_, pending) => pending.encoder.crc32(),
        })
    }

    fn pending(&mut self) -> Result<&mut PendingEntry> {
        match &mut self.cursor {
            EntryCursor::Writing(pending) => Ok(pending),
            _ => Err(ZipError::EntryWriteFailed),
        }
    }

    /// Compress `data` into the current entry.
    pub fn entry_write(&mut self, data: &[u8]) -> Result<()> {
        let pending = self.pending()?;
        pending.touched = true;
        if let Err(err) = pending.encoder.write_all(data) {
            warn!("failed to compress into '{}': {}", pending.name, err);
            pending.failed = true;
            return Err(ZipError::EntryWriteFailed);
        }
        Ok(())
    }

    /// Compress the contents of the file at `source` into the current entry.
    pub fn entry_fwrite(&mut self, source: &Path) -> Result<()> {
        let pending = self.pending()?;
        pending.touched = true;
        let copied =
            File::open(source).and_then(|mut file| io::copy(&mut file, &mut pending.encoder));
        if let Err(err) = copied {
            warn!(
                "failed to compress {} into '{}': {}",
                source.display(),
                pending.name,
                err
            );
            pending.failed = true;
            return Err(ZipError::EntryWriteFailed);
        }
        Ok(())
    }

    /// Most bytes the stored data of the entry open for reading can expand
    /// to. A recorded size above this cannot be genuine.
    pub fn entry_size_bound(&self) -> Result<u64> {
        let EntryCursor::Reading(index) = self.cursor else {
            return Err(ZipError::EntryReadFailed);
        };
        let entry = &self.entries[index];
        Ok(match entry.compression_method {
            CompressionMethod::Stored => entry.compressed_size,
            _ => entry.compressed_size.saturating_mul(MAX_DEFLATE_RATIO),
        })
    }

    /// Verified decompressing reader over the current entry.
    fn entry_reader(&self) -> anyhow::Result<Box<dyn Read + '_>> {
        let EntryCursor::Reading(index) = self.cursor else {
            bail!("No entry is open for reading");
        };
        let entry = &self.entries[index];
        let offset = ZipParser::new(&self.file).get_data_offset(entry)?;
        let raw = SectionReader::new(&self.file, offset, entry.compressed_size);
        entry_decoder(raw, entry.compression_method, entry.crc32, entry.uncompressed_size)
    }

    /// Extract the current entry into `buf` without allocating, returning
    /// the number of bytes written. Fails if the content does not fit.
    pub fn entry_read_into(&self, buf: &mut [u8]) -> Result<usize> {
        self.read_into(buf).map_err(|err| {
            warn!("failed to extract entry: {:#}", err);
            ZipError::EntryReadFailed
        })
    }

    fn read_into(&self, buf: &mut [u8]) -> anyhow::Result<usize> {
        let mut reader = self.entry_reader()?;
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => return Ok(filled),
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        // Buffer full: the entry must end here, which also runs the
        // end-of-data checksum verification.
        let mut probe = [0u8; 1];
        if reader.read(&mut probe)? != 0 {
            bail!("Entry does not fit in {} bytes", buf.len());
        }
        Ok(filled)
    }

    /// Extract the current entry into the file at `dest`, streaming.
    pub fn entry_fread(&self, dest: &Path) -> Result<()> {
        self.read_to_file(dest).map_err(|err| {
            warn!("failed to extract entry to {}: {:#}", dest.display(), err);
            ZipError::EntryReadFailed
        })
    }

    fn read_to_file(&self, dest: &Path) -> anyhow::Result<()> {
        let mut reader = self.entry_reader()?;
        let mut out = File::create(dest)
            .with_context(|| format!("Cannot create {}", dest.display()))?;
        io::copy(&mut reader, &mut out)?;
        out.flush()?;
        Ok(())
    }

    /// Number of entries, files and directories alike.
    pub fn total_entries(&self) -> Result<usize> {
        if !matches!(self.cursor, EntryCursor::Idle) {
            warn!("entry count requested while an entry is open");
            return Err(ZipError::EntryCountUnavailable);
        }
        Ok(self.entries.len())
    }
}

enum Current<'a> {
    Stored(usize, &'a ZipFileEntry),
    Pending(usize, &'a PendingEntry),
}

impl Drop for ZipHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Write the central directory for `entries` at `offset`, followed by the
/// end record, and cut the file there.
fn write_central_directory(
    file: &mut LocalFile,
    entries: &[ZipFileEntry],
    offset: u64,
) -> anyhow::Result<()> {
    let cd = central_directory(entries, offset)?;
    file.write_all_at(offset, &cd)?;
    file.set_len(offset + cd.len() as u64)?;
    Ok(())
}

/// Serialize the central directory for `entries` placed at `offset`, with
/// its end record. Fails if the result would need ZIP64.
fn central_directory(entries: &[ZipFileEntry], offset: u64) -> anyhow::Result<Vec<u8>> {
    let mut cd = Vec::with_capacity(
        entries.iter().map(|e| e.central_header_len() as usize).sum::<usize>()
            + EndOfCentralDirectory::SIZE,
    );
    for entry in entries {
        entry.write_central_header(&mut cd)?;
    }
    let count = u16::try_from(entries.len()).context("Too many entries without ZIP64")?;
    let cd_size = u32::try_from(cd.len())?;
    let cd_offset = u32::try_from(offset).context("Archive too large without ZIP64")?;
    if count == u16::MAX || cd_offset == u32::MAX {
        bail!("Archive needs ZIP64, which is not written");
    }
    EndOfCentralDirectory::new(count, cd_size, cd_offset).write_to(&mut cd)?;
    Ok(cd)
}
