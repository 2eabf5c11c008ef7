//! Startup recovery: AOF replay and snapshot load.
//!
//! The sequence runs before connections are accepted:
//! 1. replay the AOF through the real command handlers with a
//!    synthetic, pre-authenticated client;
//! 2. install the AOF writer (only now, so replayed commands were not
//!    appended back onto the log they came from);
//! 3. load the snapshot file if one exists, merging over the replayed
//!    state.
//!
//! Errors here are logged, never fatal: a corrupt file means starting
//! from whatever could be read.

use std::sync::Arc;

use garnet_core::Item;
use garnet_persistence::{rdb, AofReader, AofWriter};
use tracing::{error, info, warn};

use crate::client::Client;
use crate::handlers;
use crate::state::AppState;

/// Replays the append-only log through the command handlers.
pub async fn replay_aof(state: &Arc<AppState>) {
    if !state.config.aof_enabled {
        return;
    }
    let path = state.config.aof_path();
    if !path.exists() {
        return;
    }

    let mut reader = match AofReader::open(&path) {
        Ok(reader) => reader,
        Err(e) => {
            warn!("cannot open aof for replay: {e}");
            return;
        }
    };

    let mut client = Client::replay();
    let mut replayed = 0u64;
    loop {
        match reader.next_record() {
            Ok(Some(record)) => {
                handlers::dispatch(&mut client, record, state).await;
                replayed += 1;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("unexpected error while reading aof records: {e}");
                break;
            }
        }
    }
    info!(replayed, "aof replay finished");
}

/// Opens the log for appending and installs it in the state.
pub async fn install_aof_writer(state: &Arc<AppState>) {
    if !state.config.aof_enabled {
        return;
    }
    match AofWriter::open(state.config.aof_path()) {
        Ok(writer) => *state.aof.lock().await = Some(writer),
        Err(e) => error!("cannot open aof for appending: {e}"),
    }
}

/// Loads the snapshot file, if present, into the keyspace.
pub async fn load_snapshot(state: &Arc<AppState>) {
    let path = state.config.rdb_path();
    if !path.exists() {
        return;
    }

    match rdb::read_snapshot(&path) {
        Ok(entries) => {
            let mut db = state.db.write().await;
            let loaded = entries.len();
            for entry in entries {
                let item = Item::from_parts(
                    entry.value,
                    entry.expires_at_ms,
                    entry.last_access_ms,
                    entry.accesses,
                );
                db.restore(&entry.key, item);
            }
            info!(loaded, "snapshot loaded");
        }
        Err(e) => warn!("error decoding snapshot file: {e}"),
    }
}
