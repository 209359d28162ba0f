// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests.

use bytes::{Bytes, BytesMut};
use citrine::config::Config;
use citrine::connection::ConnectionHandler;
use citrine::core::commands::command_trait::ExecutionContext;
use citrine::core::protocol::resp_frame::read_frame;
use citrine::core::protocol::{RespFrame, RespValue};
use citrine::core::state::{ConnectionKind, ServerState, SessionState};
use citrine::core::{CitrineError, Command};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// A complete test environment around a real server state, executing
/// commands the way a client connection's dispatcher would.
pub struct TestContext {
    pub state: Arc<ServerState>,
    session: SessionState,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            state: ServerState::new(config),
            session: SessionState::new(ConnectionKind::Client),
        }
    }

    /// Parses and executes one command given as its textual parts.
    pub async fn execute(&mut self, parts: &[&str]) -> Result<RespValue, CitrineError> {
        let command = Command::try_from(command_frame(parts))?;
        let mut ctx = ExecutionContext {
            state: &self.state,
            session: &mut self.session,
        };
        command.execute(&mut ctx).await
    }
}

/// Builds a command frame (an array of bulk strings) from textual parts.
pub fn command_frame(parts: &[&str]) -> RespFrame {
    RespFrame::command_array(parts.iter().map(|part| Bytes::copy_from_slice(part.as_bytes())))
}

/// Binds an ephemeral port and serves connections with real
/// `ConnectionHandler`s, exactly like the accept loop in the server
/// bootstrap. Returns the bound address and the shutdown sender keeping the
/// loop alive.
pub async fn spawn_server(state: Arc<ServerState>) -> (SocketAddr, broadcast::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, _) = broadcast::channel(1);

    let accept_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, peer)) = listener.accept().await else {
                return;
            };
            let handler =
                ConnectionHandler::new(stream, peer, state.clone(), accept_shutdown.subscribe());
            tokio::spawn(handler.run());
        }
    });

    (addr, shutdown_tx)
}

/// A raw RESP client over a real TCP connection.
pub struct WireClient {
    stream: TcpStream,
    buffer: BytesMut,
}

impl WireClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(addr).await.unwrap(),
            buffer: BytesMut::new(),
        }
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn send_command(&mut self, parts: &[&str]) {
        let encoded = command_frame(parts).encode_to_vec().unwrap();
        self.send_raw(&encoded).await;
    }

    /// Reads one reply frame.
    pub async fn read_reply(&mut self) -> RespFrame {
        read_frame(&mut self.stream, &mut self.buffer)
            .await
            .unwrap()
            .expect("connection closed while a reply was expected")
            .0
    }

    pub fn into_parts(self) -> (TcpStream, BytesMut) {
        (self.stream, self.buffer)
    }
}

pub fn bulk(value: &str) -> RespFrame {
    RespFrame::BulkString(Bytes::copy_from_slice(value.as_bytes()))
}

pub fn simple(value: &str) -> RespFrame {
    RespFrame::SimpleString(value.to_string())
}
