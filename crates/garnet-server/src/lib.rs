//! garnet-server: the TCP front end of the garnet key/value store.
//!
//! Wires the keyspace engine, the wire codec, and the persistence layer
//! together: configuration, per-connection dispatch with transaction
//! buffering, snapshot tickers, and startup recovery.

pub mod client;
pub mod config;
pub mod connection;
pub mod handlers;
pub mod recovery;
pub mod server;
pub mod snapshot;
pub mod state;
