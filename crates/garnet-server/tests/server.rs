//! End-to-end tests: a real listener, a raw TCP client, exact wire
//! bytes asserted on both sides.

use std::net::SocketAddr;
use std::time::Duration;

use garnet_core::EvictionPolicy;
use garnet_persistence::FsyncPolicy;
use garnet_protocol::Value;
use garnet_server::config::Config;
use garnet_server::server;
use garnet_server::state::AppState;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

async fn start(config: Config) -> SocketAddr {
    let state = AppState::new(config);
    server::bootstrap(&state).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server::serve(listener, state));
    addr
}

async fn connect(addr: SocketAddr) -> TcpStream {
    TcpStream::connect(addr).await.unwrap()
}

fn encode(parts: &[&str]) -> Vec<u8> {
    Value::Array(parts.iter().map(|p| Value::bulk(p.to_string())).collect()).to_bytes()
}

async fn send(stream: &mut TcpStream, parts: &[&str]) {
    stream.write_all(&encode(parts)).await.unwrap();
}

async fn expect(stream: &mut TcpStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    tokio::time::timeout(REPLY_TIMEOUT, stream.read_exact(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .expect("read reply");
    assert_eq!(
        buf,
        expected,
        "got {:?}, want {:?}",
        String::from_utf8_lossy(&buf),
        String::from_utf8_lossy(expected)
    );
}

async fn roundtrip(stream: &mut TcpStream, parts: &[&str], expected: &[u8]) {
    send(stream, parts).await;
    expect(stream, expected).await;
}

#[tokio::test]
async fn set_get_del_lifecycle() {
    let addr = start(Config::default()).await;
    let mut conn = connect(addr).await;

    roundtrip(&mut conn, &["SET", "foo", "bar"], b"+OK\r\n").await;
    roundtrip(&mut conn, &["GET", "foo"], b"$3\r\nbar\r\n").await;
    roundtrip(&mut conn, &["DEL", "foo"], b":1\r\n").await;
    roundtrip(&mut conn, &["GET", "foo"], b"$-1\r\n").await;
}

#[tokio::test]
async fn unknown_command_keeps_the_connection_alive() {
    let addr = start(Config::default()).await;
    let mut conn = connect(addr).await;

    roundtrip(&mut conn, &["WHAT"], b"-ERR invalid command\r\n").await;
    roundtrip(&mut conn, &["SET", "k", "v"], b"+OK\r\n").await;
}

#[tokio::test]
async fn pipelined_requests_get_pipelined_replies() {
    let addr = start(Config::default()).await;
    let mut conn = connect(addr).await;

    let mut batch = encode(&["SET", "a", "1"]);
    batch.extend_from_slice(&encode(&["GET", "a"]));
    batch.extend_from_slice(&encode(&["DBSIZE"]));
    conn.write_all(&batch).await.unwrap();

    expect(&mut conn, b"+OK\r\n$1\r\n1\r\n:1\r\n").await;
}

#[tokio::test]
async fn framing_error_closes_the_connection() {
    let addr = start(Config::default()).await;
    let mut conn = connect(addr).await;

    conn.write_all(b"GET foo\r\n").await.unwrap();
    let mut buf = [0u8; 64];
    let n = tokio::time::timeout(REPLY_TIMEOUT, conn.read(&mut buf))
        .await
        .expect("timed out waiting for close")
        .expect("read");
    assert_eq!(n, 0, "expected the server to close the connection");
}

#[tokio::test]
async fn memory_budget_with_noeviction_rejects_writes() {
    let mut config = Config::default();
    config.max_memory = 400;
    config.eviction = EvictionPolicy::NoEviction;
    let addr = start(config).await;
    let mut conn = connect(addr).await;

    let big = "x".repeat(150);
    roundtrip(&mut conn, &["SET", "a", &big], b"+OK\r\n").await;
    roundtrip(&mut conn, &["SET", "b", &big], b"-ERR maximum memory reached\r\n").await;
}

#[tokio::test]
async fn lru_eviction_drops_the_least_recently_read_key() {
    let mut config = Config::default();
    config.max_memory = 400;
    config.eviction = EvictionPolicy::AllKeysLru;
    config.mem_samples = 10;
    let addr = start(config).await;
    let mut conn = connect(addr).await;

    roundtrip(&mut conn, &["SET", "a", "x"], b"+OK\r\n").await;
    roundtrip(&mut conn, &["GET", "a"], b"$1\r\nx\r\n").await;
    roundtrip(&mut conn, &["SET", "b", "y"], b"+OK\r\n").await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    roundtrip(&mut conn, &["GET", "b"], b"$1\r\ny\r\n").await;

    let large = "z".repeat(200);
    roundtrip(&mut conn, &["SET", "c", &large], b"+OK\r\n").await;

    roundtrip(&mut conn, &["GET", "a"], b"$-1\r\n").await;
    roundtrip(&mut conn, &["GET", "b"], b"$1\r\ny\r\n").await;
}

#[tokio::test]
async fn expiry_removes_the_key_from_every_view() {
    let addr = start(Config::default()).await;
    let mut conn = connect(addr).await;

    roundtrip(&mut conn, &["SET", "k", "v"], b"+OK\r\n").await;
    roundtrip(&mut conn, &["EXPIRE", "k", "1"], b":1\r\n").await;

    tokio::time::sleep(Duration::from_millis(1200)).await;

    roundtrip(&mut conn, &["TTL", "k"], b":-2\r\n").await;
    roundtrip(&mut conn, &["GET", "k"], b"$-1\r\n").await;
    roundtrip(&mut conn, &["DBSIZE"], b":0\r\n").await;
}

#[tokio::test]
async fn multi_exec_applies_queued_commands() {
    let addr = start(Config::default()).await;
    let mut conn = connect(addr).await;

    roundtrip(&mut conn, &["MULTI"], b"+OK\r\n").await;
    roundtrip(&mut conn, &["SET", "x", "1"], b"+QUEUED\r\n").await;
    roundtrip(&mut conn, &["SET", "y", "2"], b"+QUEUED\r\n").await;
    roundtrip(&mut conn, &["EXEC"], b"*2\r\n+OK\r\n+OK\r\n").await;
    roundtrip(&mut conn, &["GET", "x"], b"$1\r\n1\r\n").await;
    roundtrip(&mut conn, &["GET", "y"], b"$1\r\n2\r\n").await;
}

#[tokio::test]
async fn transactions_do_not_block_other_connections() {
    let addr = start(Config::default()).await;
    let mut buffered = connect(addr).await;
    let mut direct = connect(addr).await;

    roundtrip(&mut buffered, &["MULTI"], b"+OK\r\n").await;
    roundtrip(&mut buffered, &["SET", "x", "1"], b"+QUEUED\r\n").await;

    // the other connection writes and reads freely meanwhile
    roundtrip(&mut direct, &["SET", "y", "2"], b"+OK\r\n").await;
    roundtrip(&mut direct, &["GET", "x"], b"$-1\r\n").await;

    roundtrip(&mut buffered, &["EXEC"], b"*1\r\n+OK\r\n").await;
    roundtrip(&mut direct, &["GET", "x"], b"$1\r\n1\r\n").await;
}

#[tokio::test]
async fn auth_gate_and_recovery() {
    let mut config = Config::default();
    config.require_pass = true;
    config.password = "sesame".into();
    let addr = start(config).await;
    let mut conn = connect(addr).await;

    roundtrip(&mut conn, &["AUTH", "wrong"], b"-ERR invalid password\r\n").await;
    roundtrip(&mut conn, &["GET", "k"], b"-NOAUTH authentication required\r\n").await;
    roundtrip(&mut conn, &["AUTH", "sesame"], b"+OK\r\n").await;
    roundtrip(&mut conn, &["SET", "k", "v"], b"+OK\r\n").await;
    roundtrip(&mut conn, &["GET", "k"], b"$1\r\nv\r\n").await;
}

#[tokio::test]
async fn aof_replay_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.dir = dir.path().to_path_buf();
    config.aof_enabled = true;
    config.aof_fsync = FsyncPolicy::Always;

    // first life
    {
        let addr = start(config.clone()).await;
        let mut conn = connect(addr).await;
        roundtrip(&mut conn, &["SET", "foo", "bar"], b"+OK\r\n").await;
        roundtrip(&mut conn, &["SET", "tmp", "x"], b"+OK\r\n").await;
        roundtrip(&mut conn, &["DEL", "tmp"], b":1\r\n").await;
    }

    // second life: the keyspace is rebuilt from the log
    let addr = start(config).await;
    let mut conn = connect(addr).await;
    roundtrip(&mut conn, &["GET", "foo"], b"$3\r\nbar\r\n").await;
    roundtrip(&mut conn, &["DBSIZE"], b":1\r\n").await;
}

#[tokio::test]
async fn save_and_snapshot_load_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.dir = dir.path().to_path_buf();

    {
        let addr = start(config.clone()).await;
        let mut conn = connect(addr).await;
        roundtrip(&mut conn, &["SET", "k", "v"], b"+OK\r\n").await;
        roundtrip(&mut conn, &["SAVE"], b"+OK\r\n").await;
    }

    let addr = start(config).await;
    let mut conn = connect(addr).await;
    roundtrip(&mut conn, &["GET", "k"], b"$1\r\nv\r\n").await;
    roundtrip(&mut conn, &["DBSIZE"], b":1\r\n").await;
}

#[tokio::test]
async fn bgsave_writes_the_snapshot_in_the_background() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.dir = dir.path().to_path_buf();
    let rdb_path = config.rdb_path();

    let addr = start(config).await;
    let mut conn = connect(addr).await;
    roundtrip(&mut conn, &["SET", "k", "v"], b"+OK\r\n").await;
    roundtrip(&mut conn, &["BGSAVE"], b"+OK\r\n").await;

    // poll until the background task lands the file
    for _ in 0..100 {
        if rdb_path.exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let entries = garnet_persistence::rdb::read_snapshot(&rdb_path).unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].key, "k");
}

#[tokio::test]
async fn bgrewriteaof_compacts_the_log() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.dir = dir.path().to_path_buf();
    config.aof_enabled = true;
    config.aof_fsync = FsyncPolicy::Always;

    {
        let addr = start(config.clone()).await;
        let mut conn = connect(addr).await;
        for _ in 0..10 {
            roundtrip(&mut conn, &["SET", "k", "v"], b"+OK\r\n").await;
        }
        roundtrip(
            &mut conn,
            &["BGREWRITEAOF"],
            b"+Background AOF rewriting started\r\n",
        )
        .await;

        // wait for the rewrite to shrink the log to a single record
        let aof_path = config.aof_path();
        let one_record = encode(&["SET", "k", "v"]).len() as u64;
        for _ in 0..100 {
            if std::fs::metadata(&aof_path).map(|m| m.len()).unwrap_or(0) == one_record {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(std::fs::metadata(&aof_path).unwrap().len(), one_record);
    }

    // the compacted log still replays to the same keyspace
    let addr = start(config).await;
    let mut conn = connect(addr).await;
    roundtrip(&mut conn, &["GET", "k"], b"$1\r\nv\r\n").await;
    roundtrip(&mut conn, &["DBSIZE"], b":1\r\n").await;
}
