//! Per-connection read→dispatch→write loop.
//!
//! Reads framed requests from the TCP stream, routes them through the
//! dispatcher, and writes the replies back. Multiple requests sitting
//! in one read (pipelining) are answered in a single write. The loop
//! ends on client disconnect, a read error, or malformed framing.

use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use garnet_protocol::parse_request;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::warn;

use crate::client::Client;
use crate::handlers;
use crate::state::AppState;

/// Initial read buffer capacity; covers typical commands without
/// over-allocating for small workloads.
const BUF_CAPACITY: usize = 4096;

/// Read buffer ceiling. A client that streams an enormous incomplete
/// frame is disconnected instead of consuming unbounded memory.
const MAX_BUF_SIZE: usize = 64 * 1024 * 1024;

/// Drives one client connection to completion.
pub async fn handle(mut stream: TcpStream, state: &Arc<AppState>) -> io::Result<()> {
    let mut client = Client::new();
    let mut buf = BytesMut::with_capacity(BUF_CAPACITY);
    let mut out = BytesMut::with_capacity(BUF_CAPACITY);

    loop {
        if buf.len() > MAX_BUF_SIZE {
            warn!("read buffer limit exceeded, closing connection");
            return Ok(());
        }

        match stream.read_buf(&mut buf).await {
            Ok(0) => return Ok(()), // clean disconnect
            Ok(_) => {}
            Err(e) => return Err(e),
        }

        // answer every complete frame in the buffer before writing
        out.clear();
        loop {
            match parse_request(&buf) {
                Ok(Some((request, consumed))) => {
                    let _ = buf.split_to(consumed);
                    let reply = handlers::dispatch(&mut client, request, state).await;
                    reply.serialize(&mut out);
                }
                Ok(None) => break, // need more data
                Err(e) => {
                    // malformed framing: flush what we owe, then close
                    warn!("protocol error, closing connection: {e}");
                    if !out.is_empty() {
                        let _ = stream.write_all(&out).await;
                    }
                    return Ok(());
                }
            }
        }

        if !out.is_empty() {
            stream.write_all(&out).await?;
        }
    }
}
