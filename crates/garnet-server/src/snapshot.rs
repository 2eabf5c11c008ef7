//! Snapshot plumbing: exporting the keyspace, the foreground save
//! path, the change-count tickers, and the background AOF rewrite.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use garnet_core::Keyspace;
use garnet_persistence::{aof, rdb, SnapshotEntry};
use tracing::{debug, error, info};

use crate::state::AppState;

/// Builds a point-in-time copy of the keyspace: the unit written by
/// snapshots and AOF rewrites.
pub fn export(db: &Keyspace) -> Vec<SnapshotEntry> {
    db.iter()
        .map(|(key, item)| SnapshotEntry {
            key: key.to_string(),
            value: item.value().clone(),
            expires_at_ms: item.expires_at_ms(),
            last_access_ms: item.last_access_ms(),
            accesses: item.accesses(),
        })
        .collect()
}

/// Foreground save: serializes the live keyspace under the read lock.
/// I/O errors are logged, never surfaced to the requesting client.
pub async fn save(state: &Arc<AppState>) {
    let path = state.config.rdb_path();
    let db = state.db.read().await;
    match rdb::write_snapshot(&path, &export(&db)) {
        Ok(()) => info!(keys = db.len(), path = %path.display(), "snapshot saved"),
        Err(e) => error!("error saving snapshot: {e}"),
    }
}

/// Spawns one ticker task per configured snapshot rule. On every tick
/// the rule's change counter is reset; if it had reached the rule's
/// threshold, a save runs first.
pub fn spawn_tickers(state: &Arc<AppState>) {
    for idx in 0..state.snapshot_counters.len() {
        // startup replay may have credited changes; tickers start clean
        state.snapshot_counters[idx].changes.store(0, Ordering::Relaxed);

        let state = state.clone();
        tokio::spawn(async move {
            let rule = state.snapshot_counters[idx].rule.clone();
            let mut ticker = tokio::time::interval(Duration::from_secs(rule.every_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // the first tick completes immediately

            loop {
                ticker.tick().await;
                let changed = state.snapshot_counters[idx].changes.swap(0, Ordering::Relaxed);
                debug!(changed, required = rule.changes, "snapshot rule tick");
                if changed >= rule.changes {
                    save(&state).await;
                }
            }
        });
    }
}

/// Rewrites the AOF from a point-in-time copy of the keyspace.
///
/// The writer's sink is swapped to an in-memory buffer while the file
/// is truncated and rewritten; writes that land in the meantime are
/// drained back into the file before the sink is restored. Both swaps
/// run under the writer mutex.
pub async fn rewrite_aof(state: &Arc<AppState>) {
    let entries = {
        let db = state.db.read().await;
        export(&db)
    };

    let mut file = {
        let mut aof = state.aof.lock().await;
        let Some(writer) = aof.as_mut() else {
            return;
        };
        match writer.begin_rewrite() {
            Ok(file) => file,
            Err(e) => {
                error!("aof rewrite: {e}");
                return;
            }
        }
    };

    let result = tokio::task::spawn_blocking(move || {
        let outcome = aof::rewrite_records(&mut file, &entries);
        (outcome, file)
    })
    .await;

    match result {
        Ok((outcome, file)) => {
            if let Err(e) = outcome {
                error!("aof rewrite failed: {e}");
            }
            // restore the sink even after a failed rewrite so live
            // appends reach the file again
            let mut aof = state.aof.lock().await;
            if let Some(writer) = aof.as_mut() {
                match writer.finish_rewrite(file) {
                    Ok(()) => info!("aof rewrite finished"),
                    Err(e) => error!("aof rewrite drain failed: {e}"),
                }
            }
        }
        Err(e) => error!("aof rewrite task failed: {e}"),
    }
}

/// Spawns the once-per-second fsync ticker used by the `everysec`
/// flush policy.
pub fn spawn_aof_flush_ticker(state: &Arc<AppState>) {
    use garnet_persistence::FsyncPolicy;

    if !state.config.aof_enabled || state.config.aof_fsync != FsyncPolicy::EverySec {
        return;
    }

    let state = state.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let mut aof = state.aof.lock().await;
            if let Some(writer) = aof.as_mut() {
                if let Err(e) = writer.sync() {
                    error!("aof fsync failed: {e}");
                }
            }
        }
    });
}
