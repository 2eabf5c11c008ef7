//! garnet-persistence: durable state for the garnet server.
//!
//! Two complementary mechanisms:
//!
//! - the [`aof`] module appends every acknowledged write to a log as
//!   wire-framed request arrays and replays them at startup;
//! - the [`rdb`] module serializes the whole keyspace into a single
//!   self-describing snapshot file with a CRC32 footer.

pub mod aof;
pub mod format;
pub mod rdb;

pub use aof::{AofReader, AofWriter, FsyncPolicy};
pub use format::FormatError;
pub use rdb::SnapshotEntry;
