//! Command dispatch and the per-verb handlers.
//!
//! [`dispatch`] resolves the verb, applies the authentication gate,
//! queues the request when a transaction is open, and otherwise runs
//! the handler. Handlers validate their own arity so a command queued
//! inside `MULTI` reports argument errors at `EXEC` time, the same as
//! it would outside a transaction.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use garnet_core::{Lookup, TtlStatus};
use garnet_persistence::FsyncPolicy;
use garnet_protocol::Value;
use tracing::{error, info};

use crate::client::{Client, QueuedCommand, Transaction};
use crate::snapshot;
use crate::state::AppState;

/// Every command the server understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Command,
    Get,
    Set,
    Del,
    Exists,
    Keys,
    DbSize,
    FlushDb,
    Expire,
    Ttl,
    Save,
    BgSave,
    BgRewriteAof,
    Multi,
    Exec,
    Discard,
    Auth,
}

impl Verb {
    /// Resolves an uppercase-insensitive command name.
    pub fn resolve(name: &str) -> Option<Verb> {
        let verb = match name.to_ascii_uppercase().as_str() {
            "COMMAND" => Verb::Command,
            "GET" => Verb::Get,
            "SET" => Verb::Set,
            "DEL" => Verb::Del,
            "EXISTS" => Verb::Exists,
            "KEYS" => Verb::Keys,
            "DBSIZE" => Verb::DbSize,
            "FLUSHDB" => Verb::FlushDb,
            "EXPIRE" => Verb::Expire,
            "TTL" => Verb::Ttl,
            "SAVE" => Verb::Save,
            "BGSAVE" => Verb::BgSave,
            "BGREWRITEAOF" => Verb::BgRewriteAof,
            "MULTI" => Verb::Multi,
            "EXEC" => Verb::Exec,
            "DISCARD" => Verb::Discard,
            "AUTH" => Verb::Auth,
            _ => return None,
        };
        Some(verb)
    }

    /// Commands allowed before authentication.
    fn allowed_unauthenticated(self) -> bool {
        matches!(self, Verb::Command | Verb::Auth)
    }

    fn name(self) -> &'static str {
        match self {
            Verb::Command => "COMMAND",
            Verb::Get => "GET",
            Verb::Set => "SET",
            Verb::Del => "DEL",
            Verb::Exists => "EXISTS",
            Verb::Keys => "KEYS",
            Verb::DbSize => "DBSIZE",
            Verb::FlushDb => "FLUSHDB",
            Verb::Expire => "EXPIRE",
            Verb::Ttl => "TTL",
            Verb::Save => "SAVE",
            Verb::BgSave => "BGSAVE",
            Verb::BgRewriteAof => "BGREWRITEAOF",
            Verb::Multi => "MULTI",
            Verb::Exec => "EXEC",
            Verb::Discard => "DISCARD",
            Verb::Auth => "AUTH",
        }
    }
}

/// Routes one parsed request to its handler and returns the reply.
pub async fn dispatch(client: &mut Client, request: Value, state: &Arc<AppState>) -> Value {
    let Some(verb) = verb_of(&request) else {
        return Value::error("ERR invalid command");
    };

    if state.config.require_pass && !client.authenticated && !verb.allowed_unauthenticated() {
        return Value::error("NOAUTH authentication required");
    }

    if client.tx.is_some() && verb != Verb::Exec && verb != Verb::Discard {
        if let Some(tx) = client.tx.as_mut() {
            tx.commands.push(QueuedCommand { verb, request });
        }
        return Value::Simple("QUEUED".into());
    }

    run(client, verb, request, state).await
}

fn verb_of(request: &Value) -> Option<Verb> {
    match request {
        Value::Array(items) => Verb::resolve(items.first()?.as_bulk_str()?),
        _ => None,
    }
}

async fn run(client: &mut Client, verb: Verb, request: Value, state: &Arc<AppState>) -> Value {
    match verb {
        Verb::Command => Value::ok(),
        Verb::Get => get(&request, state).await,
        Verb::Set => set(&request, state).await,
        Verb::Del => del(&request, state).await,
        Verb::Exists => exists(&request, state).await,
        Verb::Keys => keys(&request, state).await,
        Verb::DbSize => dbsize(&request, state).await,
        Verb::FlushDb => flushdb(&request, state).await,
        Verb::Expire => expire(&request, state).await,
        Verb::Ttl => ttl(&request, state).await,
        Verb::Save => save(&request, state).await,
        Verb::BgSave => bgsave(&request, state).await,
        Verb::BgRewriteAof => bgrewriteaof(&request, state).await,
        Verb::Multi => multi(&request, client),
        Verb::Exec => exec(&request, client, state).await,
        Verb::Discard => discard(&request, client),
        Verb::Auth => auth(&request, client, state),
    }
}

fn args(request: &Value) -> &[Value] {
    match request {
        Value::Array(items) if !items.is_empty() => &items[1..],
        _ => &[],
    }
}

fn arity_error(verb: Verb) -> Value {
    Value::error(format!(
        "ERR invalid number of arguments for '{}' command",
        verb.name()
    ))
}

/// Keys travel as bulk strings but are stored as `str`; reject the
/// rare non-UTF-8 key rather than store a lossy version of it.
fn key_of(arg: &Value) -> Result<&str, Value> {
    arg.as_bulk_str()
        .ok_or_else(|| Value::error("ERR invalid key"))
}

async fn get(request: &Value, state: &Arc<AppState>) -> Value {
    let args = args(request);
    if args.len() != 1 {
        return arity_error(Verb::Get);
    }
    let key = match key_of(&args[0]) {
        Ok(key) => key,
        Err(reply) => return reply,
    };

    let db = state.db.read().await;
    match db.get(key) {
        Lookup::Found(value) => Value::Bulk(value),
        Lookup::Missing => Value::Null,
        Lookup::Expired => {
            drop(db);
            state.db.write().await.remove_expired(key);
            Value::Null
        }
    }
}

async fn set(request: &Value, state: &Arc<AppState>) -> Value {
    let args = args(request);
    if args.len() != 2 {
        return arity_error(Verb::Set);
    }
    let key = match key_of(&args[0]) {
        Ok(key) => key,
        Err(reply) => return reply,
    };
    let Some(value) = args[1].as_bulk() else {
        return Value::error("ERR invalid value");
    };

    let mut db = state.db.write().await;
    if let Err(e) = db.set(key, value.clone()) {
        return Value::error(format!("ERR {e}"));
    }

    // the append happens under the keyspace write lock so log order
    // matches apply order across connections
    if state.config.aof_enabled {
        append_to_aof(request, state).await;
    }
    state.record_write();

    Value::ok()
}

async fn del(request: &Value, state: &Arc<AppState>) -> Value {
    let args = args(request);
    if args.is_empty() {
        return arity_error(Verb::Del);
    }

    let mut db = state.db.write().await;
    let mut removed = 0i64;
    for arg in args {
        if let Ok(key) = key_of(arg) {
            if db.del(key) {
                removed += 1;
            }
        }
    }

    if removed > 0 && state.config.aof_enabled {
        append_to_aof(request, state).await;
    }

    Value::Integer(removed)
}

/// Appends the original request to the log. I/O failures are logged
/// and swallowed: the write already succeeded in memory.
async fn append_to_aof(request: &Value, state: &Arc<AppState>) {
    let mut aof = state.aof.lock().await;
    let Some(writer) = aof.as_mut() else {
        return;
    };
    if let Err(e) = writer.append(request) {
        error!("failed to append aof record: {e}");
        return;
    }
    if state.config.aof_fsync == FsyncPolicy::Always {
        if let Err(e) = writer.sync() {
            error!("aof fsync failed: {e}");
        }
    }
}

async fn exists(request: &Value, state: &Arc<AppState>) -> Value {
    let args = args(request);
    if args.is_empty() {
        return arity_error(Verb::Exists);
    }

    let db = state.db.read().await;
    let mut present = 0i64;
    for arg in args {
        if let Ok(key) = key_of(arg) {
            if db.exists(key) {
                present += 1;
            }
        }
    }
    Value::Integer(present)
}

async fn keys(request: &Value, state: &Arc<AppState>) -> Value {
    let args = args(request);
    if args.len() != 1 {
        return arity_error(Verb::Keys);
    }
    let pattern = match key_of(&args[0]) {
        Ok(pattern) => pattern,
        Err(reply) => return reply,
    };

    let db = state.db.read().await;
    let matches = db.keys(pattern);
    Value::Array(matches.into_iter().map(Value::bulk).collect())
}

async fn dbsize(request: &Value, state: &Arc<AppState>) -> Value {
    if !args(request).is_empty() {
        return arity_error(Verb::DbSize);
    }
    let db = state.db.read().await;
    Value::Integer(db.len() as i64)
}

async fn flushdb(request: &Value, state: &Arc<AppState>) -> Value {
    if !args(request).is_empty() {
        return arity_error(Verb::FlushDb);
    }
    state.db.write().await.flush();
    Value::ok()
}

async fn expire(request: &Value, state: &Arc<AppState>) -> Value {
    let args = args(request);
    if args.len() != 2 {
        return arity_error(Verb::Expire);
    }
    let key = match key_of(&args[0]) {
        Ok(key) => key,
        Err(reply) => return reply,
    };
    let Some(secs) = args[1].as_bulk_str().and_then(|s| s.parse::<i64>().ok()) else {
        return Value::error("ERR invalid expiry value");
    };

    let db = state.db.read().await;
    Value::Integer(i64::from(db.expire(key, secs)))
}

async fn ttl(request: &Value, state: &Arc<AppState>) -> Value {
    let args = args(request);
    if args.len() != 1 {
        return arity_error(Verb::Ttl);
    }
    let key = match key_of(&args[0]) {
        Ok(key) => key,
        Err(reply) => return reply,
    };

    let db = state.db.read().await;
    match db.ttl(key) {
        TtlStatus::Missing => Value::Integer(-2),
        TtlStatus::NoExpiry => Value::Integer(-1),
        TtlStatus::Remaining(secs) => Value::Integer(secs),
        TtlStatus::Expired => {
            drop(db);
            state.db.write().await.remove_expired(key);
            Value::Integer(-2)
        }
    }
}

async fn save(request: &Value, state: &Arc<AppState>) -> Value {
    if !args(request).is_empty() {
        return arity_error(Verb::Save);
    }
    snapshot::save(state).await;
    Value::ok()
}

async fn bgsave(request: &Value, state: &Arc<AppState>) -> Value {
    if !args(request).is_empty() {
        return arity_error(Verb::BgSave);
    }

    if state
        .bgsave_running
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        return Value::error("ERR background saving already in progress");
    }

    // the copy is taken here under the read lock; the spawned task
    // serializes the copy, never the live map
    let entries = {
        let db = state.db.read().await;
        snapshot::export(&db)
    };

    let state = state.clone();
    tokio::spawn(async move {
        let path = state.config.rdb_path();
        let result =
            tokio::task::spawn_blocking(move || garnet_persistence::rdb::write_snapshot(&path, &entries))
                .await;
        match result {
            Ok(Ok(())) => info!("background snapshot finished"),
            Ok(Err(e)) => error!("background snapshot failed: {e}"),
            Err(e) => error!("background snapshot task failed: {e}"),
        }
        state.bgsave_running.store(false, Ordering::Release);
    });

    Value::ok()
}

async fn bgrewriteaof(request: &Value, state: &Arc<AppState>) -> Value {
    if !args(request).is_empty() {
        return arity_error(Verb::BgRewriteAof);
    }
    if !state.config.aof_enabled {
        return Value::error("ERR AOF is not enabled");
    }

    let state = state.clone();
    tokio::spawn(async move {
        snapshot::rewrite_aof(&state).await;
    });

    Value::Simple("Background AOF rewriting started".into())
}

fn multi(request: &Value, client: &mut Client) -> Value {
    if !args(request).is_empty() {
        return arity_error(Verb::Multi);
    }
    if client.tx.is_some() {
        return Value::error("ERR MULTI calls can not be nested");
    }
    client.tx = Some(Transaction::new());
    Value::ok()
}

async fn exec(request: &Value, client: &mut Client, state: &Arc<AppState>) -> Value {
    if !args(request).is_empty() {
        return arity_error(Verb::Exec);
    }
    let Some(tx) = client.tx.as_mut() else {
        return Value::error("ERR EXEC without MULTI");
    };

    // the buffer is drained but the transaction stays open while the
    // queued commands run, so a queued MULTI still reports nesting
    let commands: Vec<QueuedCommand> = std::mem::take(&mut tx.commands);
    let mut replies = Vec::with_capacity(commands.len());
    for queued in commands {
        let reply = Box::pin(run(client, queued.verb, queued.request, state)).await;
        replies.push(reply);
    }
    client.tx = None;

    Value::Array(replies)
}

fn discard(request: &Value, client: &mut Client) -> Value {
    if !args(request).is_empty() {
        return arity_error(Verb::Discard);
    }
    if client.tx.is_none() {
        return Value::error("ERR DISCARD without MULTI");
    }
    client.tx = None;
    Value::ok()
}

fn auth(request: &Value, client: &mut Client, state: &AppState) -> Value {
    let args = args(request);
    if args.len() != 1 {
        return arity_error(Verb::Auth);
    }
    let supplied = args[0].as_bulk_str().unwrap_or_default();

    if supplied == state.config.password {
        client.authenticated = true;
        Value::ok()
    } else {
        client.authenticated = false;
        Value::error("ERR invalid password")
    }
}
