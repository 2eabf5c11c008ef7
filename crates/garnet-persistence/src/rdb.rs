//! Point-in-time snapshot files.
//!
//! A snapshot stores every live entry including its expiry instant and
//! access metadata, so a decoded keyspace equals the encoded one.
//!
//! File layout:
//! ```text
//! [GRDB magic: 4B][version: 1B][entry_count: 4B]
//! [entries...]
//! [footer_crc32: 4B]
//! ```
//!
//! Each entry:
//! ```text
//! [key_len: 4B][key][value_len: 4B][value]
//! [expires_at_ms: 8B][last_access_ms: 8B][accesses: 8B]
//! ```
//!
//! The footer CRC covers the concatenated entry bytes. The file is
//! opened truncate-create on write; a concurrent foreground and
//! background save race on it (last writer wins) and that race is
//! left undefined.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use bytes::Bytes;

use crate::format::{self, FormatError};

/// One keyspace entry as persisted in a snapshot, and the unit handed
/// to background save/rewrite tasks as a point-in-time copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: String,
    pub value: Bytes,
    /// Absolute expiry in UNIX ms; 0 means no expiry.
    pub expires_at_ms: u64,
    pub last_access_ms: u64,
    pub accesses: u64,
}

/// Writes a complete snapshot to `path`, replacing whatever is there.
pub fn write_snapshot(path: &Path, entries: &[SnapshotEntry]) -> Result<(), FormatError> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o644);
    }
    let file = opts.open(path)?;
    let mut writer = BufWriter::new(file);

    format::write_header(&mut writer)?;
    format::write_u32(&mut writer, entries.len() as u32)?;

    let mut hasher = crc32fast::Hasher::new();
    let mut buf = Vec::new();
    for entry in entries {
        buf.clear();
        format::write_bytes(&mut buf, entry.key.as_bytes())?;
        format::write_bytes(&mut buf, &entry.value)?;
        format::write_u64(&mut buf, entry.expires_at_ms)?;
        format::write_u64(&mut buf, entry.last_access_ms)?;
        format::write_u64(&mut buf, entry.accesses)?;
        hasher.update(&buf);
        writer.write_all(&buf)?;
    }

    format::write_u32(&mut writer, hasher.finalize())?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Reads a snapshot from `path`, verifying the header and footer CRC.
pub fn read_snapshot(path: &Path) -> Result<Vec<SnapshotEntry>, FormatError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    format::read_header(&mut reader)?;
    let count = format::read_u32(&mut reader)?;

    let mut hasher = crc32fast::Hasher::new();
    let mut entries = Vec::with_capacity(count.min(1024) as usize);
    let mut buf = Vec::new();
    for _ in 0..count {
        buf.clear();
        let key = format::read_bytes(&mut reader)?;
        format::write_bytes(&mut buf, &key)?;
        let value = format::read_bytes(&mut reader)?;
        format::write_bytes(&mut buf, &value)?;
        let expires_at_ms = format::read_u64(&mut reader)?;
        format::write_u64(&mut buf, expires_at_ms)?;
        let last_access_ms = format::read_u64(&mut reader)?;
        format::write_u64(&mut buf, last_access_ms)?;
        let accesses = format::read_u64(&mut reader)?;
        format::write_u64(&mut buf, accesses)?;
        hasher.update(&buf);

        let key = String::from_utf8(key)
            .map_err(|_| FormatError::Io(std::io::Error::other("key is not valid utf-8")))?;
        entries.push(SnapshotEntry {
            key,
            value: Bytes::from(value),
            expires_at_ms,
            last_access_ms,
            accesses,
        });
    }

    let stored = format::read_u32(&mut reader)?;
    let actual = hasher.finalize();
    if stored != actual {
        return Err(FormatError::ChecksumMismatch {
            expected: stored,
            actual,
        });
    }

    Ok(entries)
}
