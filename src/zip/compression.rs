//! Entry compression and decompression on top of `flate2`.

use std::io::{self, Read, Write};

use anyhow::{Result, bail};
use crc32fast::Hasher;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;

use super::structures::CompressionMethod;

/// Highest expansion DEFLATE can achieve, uncompressed bytes per
/// compressed byte.
pub(crate) const MAX_DEFLATE_RATIO: u64 = 1032;

/// DEFLATE compression level used when writing entries.
///
/// Level 0 stores entries without compression; 1 (fastest) through 9
/// (smallest) deflate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    pub const NONE: CompressionLevel = CompressionLevel(0);
    pub const FASTEST: CompressionLevel = CompressionLevel(1);
    pub const DEFAULT: CompressionLevel = CompressionLevel(6);
    pub const BEST: CompressionLevel = CompressionLevel(9);

    /// Returns `None` for levels above 9.
    pub const fn new(level: u32) -> Option<Self> {
        if level <= 9 {
            Some(CompressionLevel(level))
        } else {
            None
        }
    }

    pub const fn level(self) -> u32 {
        self.0
    }

    pub(crate) fn method(self) -> CompressionMethod {
        if self.0 == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflate
        }
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        CompressionLevel::DEFAULT
    }
}

/// Accumulates the compressed form of one entry while tracking its CRC-32
/// and uncompressed length.
pub(crate) struct EntryEncoder {
    sink: Sink,
    hasher: Hasher,
    size: u64,
}

enum Sink {
    Stored(Vec<u8>),
    Deflate(DeflateEncoder<Vec<u8>>),
}

/// Output of [`EntryEncoder::finish`].
pub(crate) struct EncodedEntry {
    pub method: CompressionMethod,
    pub data: Vec<u8>,
    pub crc32: u32,
    pub size: u64,
}

impl EntryEncoder {
    pub fn new(level: CompressionLevel) -> Self {
        let sink = match level.method() {
            CompressionMethod::Stored => Sink::Stored(Vec::new()),
            _ => Sink::Deflate(DeflateEncoder::new(Vec::new(), Compression::new(level.level()))),
        };
        Self {
            sink,
            hasher: Hasher::new(),
            size: 0,
        }
    }

    /// Uncompressed bytes accepted so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// CRC-32 of the uncompressed bytes accepted so far.
    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn finish(self) -> Result<EncodedEntry> {
        let crc32 = self.hasher.finalize();
        let (method, data) = match self.sink {
            Sink::Stored(data) => (CompressionMethod::Stored, data),
            Sink::Deflate(encoder) => (CompressionMethod::Deflate, encoder.finish()?),
        };
        Ok(EncodedEntry {
            method,
            data,
            crc32,
            size: self.size,
        })
    }
}

impl Write for EntryEncoder {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = match &mut self.sink {
            Sink::Stored(data) => {
                data.extend_from_slice(buf);
                buf.len()
            }
            Sink::Deflate(encoder) => encoder.write(buf)?,
        };
        self.hasher.update(&buf[..n]);
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::Stored(_) => Ok(()),
            Sink::Deflate(encoder) => encoder.flush(),
        }
    }
}

/// Reader that checks the CRC-32 and length of the data passing through it
/// once the inner reader is exhausted.
pub(crate) struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    read: u64,
    expected_crc: u32,
    expected_size: u64,
}

impl<R: Read> Crc32Reader<R> {
    pub fn new(inner: R, expected_crc: u32, expected_size: u64) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            read: 0,
            expected_crc,
            expected_size,
        }
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.read > self.expected_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "entry is longer than its recorded size",
            ));
        }
        if n == 0 && !buf.is_empty() {
            if self.read != self.expected_size {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "entry is shorter than its recorded size",
                ));
            }
            if self.hasher.clone().finalize() != self.expected_crc {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "invalid checksum",
                ));
            }
        }
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

/// Wrap the raw (compressed) bytes of an entry in a verifying decoder.
pub(crate) fn entry_decoder<'a, R: Read + 'a>(
    raw: R,
    method: CompressionMethod,
    crc32: u32,
    size: u64,
) -> Result<Box<dyn Read + 'a>> {
    let reader: Box<dyn Read + 'a> = match method {
        CompressionMethod::Stored => Box::new(Crc32Reader::new(raw, crc32, size)),
        CompressionMethod::Deflate => {
            Box::new(Crc32Reader::new(DeflateDecoder::new(raw), crc32, size))
        }
        CompressionMethod::Unknown(m) => bail!("Unsupported compression method: {}", m),
    };
    Ok(reader)
}
