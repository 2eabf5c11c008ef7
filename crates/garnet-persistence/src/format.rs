//! Binary format helpers for the snapshot file.
//!
//! Length-prefixed byte fields, little-endian integers, CRC32
//! checksums, and the magic/version header.

use std::io::{self, Read, Write};

use crc32fast::Hasher;
use thiserror::Error;

/// Magic bytes for the snapshot file header.
pub const SNAP_MAGIC: &[u8; 4] = b"GRDB";

/// Current snapshot format version.
pub const FORMAT_VERSION: u8 = 1;

/// Maximum length accepted for a length-prefixed field (512 MB). A
/// corrupt prefix must not trigger a multi-gigabyte allocation.
pub const MAX_FIELD_LEN: usize = 512 * 1024 * 1024;

/// Errors reading or writing persistence files.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unexpected end of file")]
    UnexpectedEof,

    #[error("invalid magic bytes")]
    InvalidMagic,

    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("crc32 mismatch (expected {expected:#010x}, got {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("field length {0} exceeds limit")]
    FieldTooLarge(usize),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Computes a CRC32 checksum over a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(data);
    h.finalize()
}

pub fn write_header(w: &mut impl Write) -> io::Result<()> {
    w.write_all(SNAP_MAGIC)?;
    w.write_all(&[FORMAT_VERSION])
}

/// Validates the magic bytes and returns the file's format version.
pub fn read_header(r: &mut impl Read) -> Result<u8, FormatError> {
    let mut magic = [0u8; 4];
    read_exact(r, &mut magic)?;
    if &magic != SNAP_MAGIC {
        return Err(FormatError::InvalidMagic);
    }
    let mut version = [0u8; 1];
    read_exact(r, &mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(FormatError::UnsupportedVersion(version[0]));
    }
    Ok(version[0])
}

pub fn write_u32(w: &mut impl Write, val: u32) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

pub fn write_u64(w: &mut impl Write, val: u64) -> io::Result<()> {
    w.write_all(&val.to_le_bytes())
}

/// Writes a length-prefixed byte slice: `[len: u32][data]`.
pub fn write_bytes(w: &mut impl Write, data: &[u8]) -> io::Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("field length {} exceeds u32::MAX", data.len()),
        )
    })?;
    write_u32(w, len)?;
    w.write_all(data)
}

pub fn read_u32(r: &mut impl Read) -> Result<u32, FormatError> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_u64(r: &mut impl Read) -> Result<u64, FormatError> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads a length-prefixed byte vector: `[len: u32][data]`.
pub fn read_bytes(r: &mut impl Read) -> Result<Vec<u8>, FormatError> {
    let len = read_u32(r)? as usize;
    if len > MAX_FIELD_LEN {
        return Err(FormatError::FieldTooLarge(len));
    }
    let mut buf = vec![0u8; len];
    read_exact(r, &mut buf)?;
    Ok(buf)
}

fn read_exact(r: &mut impl Read, buf: &mut [u8]) -> Result<(), FormatError> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            FormatError::UnexpectedEof
        } else {
            FormatError::Io(e)
        }
    })
}
