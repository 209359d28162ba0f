// tests/integration/replication_test.rs

//! Replica-side replication tests: a real `ReplicaWorker` against a scripted
//! fake primary, verifying the handshake sequence, silent command
//! application, and byte-precise offset acknowledgement.

use bytes::{Bytes, BytesMut};
use citrine::config::Config;
use citrine::core::persistence::rdb::EMPTY_SNAPSHOT;
use citrine::core::protocol::resp_frame::read_frame;
use citrine::core::protocol::RespFrame;
use citrine::core::replication::worker::ReplicaWorker;
use citrine::core::state::ServerState;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

const SET_WIRE: &[u8] = b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n";
const GETACK_WIRE: &[u8] = b"*3\r\n$8\r\nREPLCONF\r\n$6\r\nGETACK\r\n$1\r\n*\r\n";

/// Reads one command array and returns its parts as strings.
async fn read_command(stream: &mut TcpStream, buffer: &mut BytesMut) -> Vec<String> {
    let (frame, _) = read_frame(stream, buffer).await.unwrap().unwrap();
    let RespFrame::Array(parts) = frame else {
        panic!("expected command array, got {frame:?}");
    };
    parts
        .into_iter()
        .map(|part| match part {
            RespFrame::BulkString(bytes) => String::from_utf8(bytes.to_vec()).unwrap(),
            other => panic!("expected bulk string, got {other:?}"),
        })
        .collect()
}

/// Plays the primary's side of the handshake and returns the established
/// link.
async fn accept_handshake(listener: &TcpListener) -> (TcpStream, BytesMut) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buffer = BytesMut::new();

    assert_eq!(read_command(&mut stream, &mut buffer).await, vec!["PING"]);
    stream.write_all(b"+PONG\r\n").await.unwrap();

    let replconf = read_command(&mut stream, &mut buffer).await;
    assert_eq!(replconf[0], "REPLCONF");
    assert_eq!(replconf[1], "listening-port");
    stream.write_all(b"+OK\r\n").await.unwrap();

    let capa = read_command(&mut stream, &mut buffer).await;
    assert_eq!(&capa[..2], &["REPLCONF".to_string(), "capa".to_string()]);
    stream.write_all(b"+OK\r\n").await.unwrap();

    let psync = read_command(&mut stream, &mut buffer).await;
    assert_eq!(psync, vec!["PSYNC", "?", "-1"]);
    stream
        .write_all(b"+FULLRESYNC 0123456789012345678901234567890123456789 0\r\n")
        .await
        .unwrap();
    let blob_header = format!("${}\r\n", EMPTY_SNAPSHOT.len());
    stream.write_all(blob_header.as_bytes()).await.unwrap();
    stream.write_all(EMPTY_SNAPSHOT).await.unwrap();
    stream.flush().await.unwrap();

    (stream, buffer)
}

fn replica_state(primary_port: u16) -> Arc<ServerState> {
    let config = Config {
        replica_of: Some(("127.0.0.1".to_string(), primary_port)),
        ..Config::default()
    };
    ServerState::new(config)
}

#[tokio::test]
async fn test_replica_applies_propagated_set_silently() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = replica_state(port);

    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(ReplicaWorker::new(state.clone()).run(shutdown_tx.subscribe()));

    let (mut link, mut buffer) = accept_handshake(&listener).await;
    link.write_all(SET_WIRE).await.unwrap();
    link.flush().await.unwrap();

    // The replica applies the write without replying.
    let mut applied = false;
    for _ in 0..100 {
        if state.strings.get(b"foo") == Some(Bytes::from_static(b"bar")) {
            applied = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(applied, "replica never applied the propagated SET");

    // Nothing must have been written back on the link for the SET. The next
    // thing the primary sees from the replica is the answer to a GETACK.
    link.write_all(GETACK_WIRE).await.unwrap();
    link.flush().await.unwrap();
    let ack = read_command(&mut link, &mut buffer).await;
    assert_eq!(&ack[..2], &["REPLCONF".to_string(), "ACK".to_string()]);
}

#[tokio::test]
async fn test_replica_offset_counts_exact_frame_bytes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = replica_state(port);

    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(ReplicaWorker::new(state.clone()).run(shutdown_tx.subscribe()));

    let (mut link, mut buffer) = accept_handshake(&listener).await;

    // First GETACK arrives before any command: the offset is still 0.
    link.write_all(GETACK_WIRE).await.unwrap();
    link.flush().await.unwrap();
    let ack = read_command(&mut link, &mut buffer).await;
    assert_eq!(ack, vec!["REPLCONF", "ACK", "0"]);

    // One SET later, the acknowledged offset covers the first GETACK frame
    // plus the SET frame, byte for byte.
    link.write_all(SET_WIRE).await.unwrap();
    link.write_all(GETACK_WIRE).await.unwrap();
    link.flush().await.unwrap();
    let ack = read_command(&mut link, &mut buffer).await;
    let expected = (GETACK_WIRE.len() + SET_WIRE.len()).to_string();
    assert_eq!(ack, vec!["REPLCONF".to_string(), "ACK".to_string(), expected]);
}

#[tokio::test]
async fn test_replica_reconnects_after_link_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let state = replica_state(port);

    let (shutdown_tx, _) = broadcast::channel(1);
    tokio::spawn(ReplicaWorker::new(state.clone()).run(shutdown_tx.subscribe()));

    let (link, _buffer) = accept_handshake(&listener).await;
    drop(link);

    // The worker backs off and dials again; the second handshake must
    // complete the same way.
    let handshake = tokio::time::timeout(Duration::from_secs(5), accept_handshake(&listener))
        .await
        .expect("replica did not reconnect in time");
    drop(handshake);
}
