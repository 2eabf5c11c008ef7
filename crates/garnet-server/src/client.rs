//! Per-connection client state.
//!
//! The TCP stream itself is owned by the connection loop; this is just
//! the state the dispatcher needs: the authenticated flag and the
//! transaction buffer, present only between `MULTI` and `EXEC`.

use garnet_protocol::Value;

use crate::handlers::Verb;

/// State for one connected client.
#[derive(Debug, Default)]
pub struct Client {
    pub authenticated: bool,
    /// Present while a `MULTI` transaction is open.
    pub tx: Option<Transaction>,
}

impl Client {
    pub fn new() -> Self {
        Self::default()
    }

    /// A synthetic client for AOF replay: pre-authenticated, never in a
    /// transaction.
    pub fn replay() -> Self {
        Self {
            authenticated: true,
            tx: None,
        }
    }
}

/// Commands queued between `MULTI` and `EXEC`, in submission order.
#[derive(Debug, Default)]
pub struct Transaction {
    pub commands: Vec<QueuedCommand>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }
}

/// One queued command: the original request plus its resolved verb.
#[derive(Debug)]
pub struct QueuedCommand {
    pub verb: Verb,
    pub request: Value,
}
