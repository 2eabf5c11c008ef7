//! Process-wide application state.
//!
//! One `AppState` aggregate is built at startup and threaded through
//! every handler; nothing lives in globals. The keyspace sits behind a
//! reader/writer lock, the AOF writer behind a mutex (absent until
//! startup replay finishes), and everything else is atomics.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use garnet_core::Keyspace;
use garnet_persistence::AofWriter;
use tokio::sync::{Mutex, RwLock};

use crate::config::{Config, SnapshotRule};

/// Server-wide counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    /// Connections accepted since startup.
    pub total_connections: AtomicU64,
    /// Currently connected clients.
    pub connected_clients: AtomicU64,
}

/// Change counter for one snapshot rule. Bumped on every successful
/// `SET`; drained by the rule's ticker.
#[derive(Debug)]
pub struct SnapshotCounter {
    pub rule: SnapshotRule,
    pub changes: AtomicU64,
}

/// Everything the handlers need, shared across connection tasks.
pub struct AppState {
    pub config: Config,
    pub db: RwLock<Keyspace>,
    /// Installed after startup replay so replayed commands are not
    /// appended back onto the log they came from.
    pub aof: Mutex<Option<AofWriter>>,
    pub snapshot_counters: Vec<SnapshotCounter>,
    /// Guards against overlapping background snapshots.
    pub bgsave_running: AtomicBool,
    pub stats: ServerStats,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let snapshot_counters = config
            .snapshot_rules
            .iter()
            .map(|rule| SnapshotCounter {
                rule: rule.clone(),
                changes: AtomicU64::new(0),
            })
            .collect();

        Arc::new(Self {
            db: RwLock::new(Keyspace::with_config(config.keyspace_config())),
            aof: Mutex::new(None),
            snapshot_counters,
            bgsave_running: AtomicBool::new(false),
            stats: ServerStats::default(),
            config,
        })
    }

    /// Credits one keyspace change to every snapshot rule.
    pub fn record_write(&self) {
        for counter in &self.snapshot_counters {
            counter.changes.fetch_add(1, Ordering::Relaxed);
        }
    }
}
