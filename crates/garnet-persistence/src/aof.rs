//! Append-only log of write commands.
//!
//! Records are the original request arrays in wire framing, so the log
//! is replayed with the same parser that serves the network. The writer
//! appends after each acknowledged write; how often it reaches the disk
//! is governed by the [`FsyncPolicy`].
//!
//! # Rewrite
//!
//! A rewrite compacts the log to one `SET` record per live key. While
//! the file is truncated and rewritten, the writer's sink is swapped to
//! an in-memory buffer so concurrent writes are not lost; the buffer is
//! drained back into the file before the sink is restored. Both swaps
//! happen under whatever lock guards the writer, making them atomic
//! with respect to write handlers.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use garnet_protocol::{parse_request, ProtocolError, Value};

use crate::rdb::SnapshotEntry;

/// How often appended records are fsynced to disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FsyncPolicy {
    /// fsync before acknowledging every write. Safest, slowest.
    Always,
    /// fsync once per second from a background ticker.
    #[default]
    EverySec,
    /// Leave flushing to the OS. Fastest, least durable.
    No,
}

/// Where appended records currently go: the log file, or an in-memory
/// buffer while a rewrite holds the file.
enum Sink {
    File(BufWriter<File>),
    Buffer(Vec<u8>),
}

/// Buffered writer appending records to the log.
pub struct AofWriter {
    sink: Sink,
    path: PathBuf,
}

impl AofWriter {
    /// Opens (or creates) the log in append mode, owner read-write and
    /// world read.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o644);
        }
        let file = opts.open(&path)?;
        Ok(Self {
            sink: Sink::File(BufWriter::new(file)),
            path,
        })
    }

    /// Appends one record in wire framing.
    pub fn append(&mut self, record: &Value) -> io::Result<()> {
        let mut buf = BytesMut::new();
        record.serialize(&mut buf);
        match &mut self.sink {
            Sink::File(writer) => writer.write_all(&buf),
            Sink::Buffer(bytes) => {
                bytes.extend_from_slice(&buf);
                Ok(())
            }
        }
    }

    /// Flushes buffered records to the OS.
    pub fn flush(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::File(writer) => writer.flush(),
            Sink::Buffer(_) => Ok(()),
        }
    }

    /// Flushes and fsyncs the log file.
    pub fn sync(&mut self) -> io::Result<()> {
        match &mut self.sink {
            Sink::File(writer) => {
                writer.flush()?;
                writer.get_ref().sync_all()
            }
            Sink::Buffer(_) => Ok(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts a rewrite: swaps the sink to an in-memory buffer and
    /// hands the detached file handle to the caller. Fails if a rewrite
    /// is already in progress.
    pub fn begin_rewrite(&mut self) -> io::Result<File> {
        match mem::replace(&mut self.sink, Sink::Buffer(Vec::new())) {
            Sink::File(writer) => writer.into_inner().map_err(|e| e.into_error()),
            Sink::Buffer(buf) => {
                self.sink = Sink::Buffer(buf);
                Err(io::Error::other("aof rewrite already in progress"))
            }
        }
    }

    /// Finishes a rewrite: drains records buffered while the file was
    /// held, then restores the file sink.
    pub fn finish_rewrite(&mut self, mut file: File) -> io::Result<()> {
        if let Sink::Buffer(buf) = &self.sink {
            if !buf.is_empty() {
                file.write_all(buf)?;
            }
        }
        self.sink = Sink::File(BufWriter::new(file));
        Ok(())
    }
}

/// Truncates the log file and writes one `SET key value` record per
/// entry of a point-in-time keyspace copy, then fsyncs.
pub fn rewrite_records(file: &mut File, entries: &[SnapshotEntry]) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;

    let mut buf = BytesMut::new();
    for entry in entries {
        let record = Value::Array(vec![
            Value::bulk("SET"),
            Value::bulk(entry.key.clone()),
            Value::Bulk(entry.value.clone()),
        ]);
        record.serialize(&mut buf);
    }
    file.write_all(&buf)?;
    file.sync_all()
}

/// Reads records back out of a log file.
pub struct AofReader {
    data: Vec<u8>,
    pos: usize,
}

impl AofReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            data: std::fs::read(path)?,
            pos: 0,
        })
    }

    /// Returns the next record, or `None` at end of file. A truncated
    /// trailing record (crash mid-append) is treated as end of usable
    /// data rather than an error.
    pub fn next_record(&mut self) -> Result<Option<Value>, ProtocolError> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        match parse_request(&self.data[self.pos..])? {
            Some((value, consumed)) => {
                self.pos += consumed;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> tempfile::TempDir {
        tempfile::tempdir().expect("create temp dir")
    }

    fn set_record(key: &str, value: &str) -> Value {
        Value::Array(vec![
            Value::bulk("SET"),
            Value::bulk(key.to_string()),
            Value::bulk(value.to_string()),
        ])
    }

    fn read_all(path: &Path) -> Vec<Value> {
        let mut reader = AofReader::open(path).unwrap();
        let mut records = Vec::new();
        while let Some(record) = reader.next_record().unwrap() {
            records.push(record);
        }
        records
    }

    #[test]
    fn writer_reader_round_trip() {
        let dir = temp_dir();
        let path = dir.path().join("test.aof");

        let records = vec![
            set_record("a", "1"),
            set_record("b", "2"),
            Value::Array(vec![Value::bulk("DEL"), Value::bulk("a")]),
        ];

        {
            let mut writer = AofWriter::open(&path).unwrap();
            for record in &records {
                writer.append(record).unwrap();
            }
            writer.sync().unwrap();
        }

        assert_eq!(read_all(&path), records);
    }

    #[test]
    fn reopen_appends_after_existing_records() {
        let dir = temp_dir();
        let path = dir.path().join("test.aof");

        {
            let mut writer = AofWriter::open(&path).unwrap();
            writer.append(&set_record("first", "1")).unwrap();
            writer.sync().unwrap();
        }
        {
            let mut writer = AofWriter::open(&path).unwrap();
            writer.append(&set_record("second", "2")).unwrap();
            writer.sync().unwrap();
        }

        assert_eq!(
            read_all(&path),
            vec![set_record("first", "1"), set_record("second", "2")]
        );
    }

    #[test]
    fn empty_log_has_no_records() {
        let dir = temp_dir();
        let path = dir.path().join("empty.aof");
        let mut writer = AofWriter::open(&path).unwrap();
        writer.sync().unwrap();
        assert!(read_all(&path).is_empty());
    }

    #[test]
    fn truncated_tail_is_treated_as_eof() {
        let dir = temp_dir();
        let path = dir.path().join("trunc.aof");

        {
            let mut writer = AofWriter::open(&path).unwrap();
            writer.append(&set_record("ok", "good")).unwrap();
            writer.sync().unwrap();
        }
        // simulate a crash mid-append
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(b"*3\r\n$3\r\nSET\r\n$4\r\npar").unwrap();
        }

        assert_eq!(read_all(&path), vec![set_record("ok", "good")]);
    }

    #[test]
    fn malformed_record_is_an_error() {
        let dir = temp_dir();
        let path = dir.path().join("bad.aof");
        std::fs::write(&path, b"+OK\r\n").unwrap();

        let mut reader = AofReader::open(&path).unwrap();
        assert!(reader.next_record().is_err());
    }

    #[test]
    fn rewrite_replaces_history_with_live_entries() {
        let dir = temp_dir();
        let path = dir.path().join("rw.aof");

        let mut writer = AofWriter::open(&path).unwrap();
        writer.append(&set_record("stale", "1")).unwrap();
        writer.append(&set_record("stale", "2")).unwrap();
        writer.append(&set_record("stale", "3")).unwrap();
        writer.sync().unwrap();

        let entries = vec![SnapshotEntry {
            key: "stale".into(),
            value: bytes::Bytes::from_static(b"3"),
            expires_at_ms: 0,
            last_access_ms: 0,
            accesses: 0,
        }];

        let mut file = writer.begin_rewrite().unwrap();
        rewrite_records(&mut file, &entries).unwrap();
        writer.finish_rewrite(file).unwrap();
        writer.sync().unwrap();

        assert_eq!(read_all(&path), vec![set_record("stale", "3")]);
    }

    #[test]
    fn appends_during_rewrite_are_drained_into_the_file() {
        let dir = temp_dir();
        let path = dir.path().join("drain.aof");

        let mut writer = AofWriter::open(&path).unwrap();
        writer.append(&set_record("old", "x")).unwrap();
        writer.sync().unwrap();

        let entries = vec![SnapshotEntry {
            key: "old".into(),
            value: bytes::Bytes::from_static(b"x"),
            expires_at_ms: 0,
            last_access_ms: 0,
            accesses: 0,
        }];

        let mut file = writer.begin_rewrite().unwrap();
        // a write lands while the rewrite holds the file
        writer.append(&set_record("live", "y")).unwrap();
        rewrite_records(&mut file, &entries).unwrap();
        writer.finish_rewrite(file).unwrap();
        writer.sync().unwrap();

        assert_eq!(
            read_all(&path),
            vec![set_record("old", "x"), set_record("live", "y")]
        );
    }

    #[test]
    fn concurrent_rewrite_is_rejected() {
        let dir = temp_dir();
        let path = dir.path().join("twice.aof");

        let mut writer = AofWriter::open(&path).unwrap();
        let file = writer.begin_rewrite().unwrap();
        assert!(writer.begin_rewrite().is_err());
        writer.finish_rewrite(file).unwrap();
        // after finishing, a new rewrite may start
        let file = writer.begin_rewrite().unwrap();
        writer.finish_rewrite(file).unwrap();
    }
}
