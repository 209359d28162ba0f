// src/core/replication/worker.rs

//! Implements the replication logic for a replica server.
//!
//! This worker owns the replica's connection to its primary: it dials,
//! performs the multi-step handshake, discards the full-resync snapshot, and
//! then consumes the continuous command stream. Replies on the link are
//! suppressed except for `REPLCONF GETACK *`, and the replica's processed
//! offset advances by the exact wire length of every consumed frame.
//! The worker reconnects with exponential backoff if the link drops.

use bytes::{Buf, BytesMut};
use rand::Rng;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::core::commands::command_trait::ExecutionContext;
use crate::core::commands::generic::Replconf;
use crate::core::commands::Command;
use crate::core::protocol::resp_frame::read_frame;
use crate::core::protocol::RespFrame;
use crate::core::state::{ConnectionKind, ServerState, SessionState};
use crate::core::CitrineError;

// The initial delay before the first reconnection attempt.
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
// The maximum delay for the exponential backoff reconnection strategy.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

const READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// The main worker task for a replica server.
pub struct ReplicaWorker {
    state: Arc<ServerState>,
}

impl ReplicaWorker {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    /// The main run loop: manages the connection lifecycle and reconnects
    /// with exponential backoff plus jitter when the link fails.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let Some((host, port)) = self.state.config.replica_of.clone() else {
            return;
        };
        info!("Replica worker started; primary is {host}:{port}.");
        let mut current_delay = INITIAL_RECONNECT_DELAY;

        loop {
            tokio::select! {
                result = self.handle_connection_cycle(&host, port) => {
                    match result {
                        Err(e) => warn!("Replication cycle failed: {e}. Reconnecting..."),
                        Ok(()) => {
                            info!("Connection to primary closed cleanly. Reconnecting...");
                            current_delay = INITIAL_RECONNECT_DELAY;
                        }
                    }

                    // Jitter avoids a thundering herd when the primary restarts.
                    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..500));
                    let wait_time = current_delay + jitter;
                    info!("Will try to reconnect to primary in {wait_time:?}");
                    tokio::select! {
                        _ = tokio::time::sleep(wait_time) => {}
                        _ = shutdown_rx.recv() => {
                            info!("Replica worker shutting down during backoff.");
                            return;
                        }
                    }
                    current_delay = (current_delay * 2).min(MAX_RECONNECT_DELAY);
                }
                _ = shutdown_rx.recv() => {
                    info!("Replica worker shutting down.");
                    return;
                }
            }
        }
    }

    /// One full connection cycle: dial, handshake, then stream commands
    /// until the link drops.
    async fn handle_connection_cycle(&self, host: &str, port: u16) -> Result<(), CitrineError> {
        let mut stream = TcpStream::connect((host, port)).await?;
        let mut buffer = BytesMut::with_capacity(READ_BUFFER_CAPACITY);

        self.perform_handshake(&mut stream, &mut buffer).await?;
        info!("Handshake with primary complete; consuming command stream.");

        // Offset accounting starts at the end of the snapshot.
        self.state
            .replication
            .replica_offset
            .store(0, Ordering::SeqCst);

        self.run_link_loop(stream, buffer).await
    }

    /// The outbound handshake:
    /// `PING` → `REPLCONF listening-port` → `REPLCONF capa psync2` →
    /// `PSYNC ? -1` → `+FULLRESYNC` → snapshot blob (discarded).
    async fn perform_handshake(
        &self,
        stream: &mut TcpStream,
        buffer: &mut BytesMut,
    ) -> Result<(), CitrineError> {
        send_command(stream, &["PING"]).await?;
        expect_simple_string(stream, buffer, "PONG").await?;

        let listening_port = self.state.config.port.to_string();
        send_command(stream, &["REPLCONF", "listening-port", &listening_port]).await?;
        expect_simple_string(stream, buffer, "OK").await?;

        send_command(stream, &["REPLCONF", "capa", "psync2"]).await?;
        expect_simple_string(stream, buffer, "OK").await?;

        send_command(stream, &["PSYNC", "?", "-1"]).await?;
        let reply = read_simple_string(stream, buffer).await?;
        if !reply.starts_with("FULLRESYNC ") {
            return Err(CitrineError::ReplicationError(format!(
                "expected FULLRESYNC from primary, got '{reply}'"
            )));
        }

        let snapshot_len = discard_snapshot_blob(stream, buffer).await?;
        debug!("Discarded {snapshot_len} byte full-resync snapshot.");
        Ok(())
    }

    /// Consumes the primary's command stream. Every decoded frame advances
    /// the replica offset by its wire length after it has been handled, so
    /// a `GETACK` reply reports the bytes processed before it.
    async fn run_link_loop(
        &self,
        mut stream: TcpStream,
        mut buffer: BytesMut,
    ) -> Result<(), CitrineError> {
        let mut session = SessionState::new(ConnectionKind::PrimaryLink);

        loop {
            let Some((frame, frame_len)) = read_frame(&mut stream, &mut buffer).await? else {
                return Ok(());
            };

            // Inline simple strings from the primary are legal; they carry
            // no command, only bytes.
            if matches!(frame, RespFrame::Array(_)) {
                match Command::try_from(frame) {
                    Ok(command) => {
                        let is_getack =
                            matches!(&command, Command::Replconf(Replconf::GetAck));
                        let mut ctx = ExecutionContext {
                            state: &self.state,
                            session: &mut session,
                        };
                        match command.execute(&mut ctx).await {
                            Ok(value) if is_getack => {
                                let reply: RespFrame = value.into();
                                stream.write_all(&reply.encode_to_vec()?).await?;
                                stream.flush().await?;
                            }
                            // All other replies are suppressed on the link.
                            Ok(_) => {}
                            Err(e) => {
                                warn!("Error applying replicated command: {e}");
                            }
                        }
                    }
                    Err(e) => warn!("Undecodable command on primary link: {e}"),
                }
            }

            session.bytes_consumed += frame_len as u64;
            self.state
                .replication
                .advance_replica_offset(frame_len as u64);
        }
    }
}

/// Writes one command as a RESP array of bulk strings.
async fn send_command(stream: &mut TcpStream, parts: &[&str]) -> Result<(), CitrineError> {
    let frame = RespFrame::command_array(
        parts
            .iter()
            .map(|part| bytes::Bytes::copy_from_slice(part.as_bytes())),
    );
    stream.write_all(&frame.encode_to_vec()?).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one frame and requires it to be a simple string.
async fn read_simple_string(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
) -> Result<String, CitrineError> {
    match read_frame(stream, buffer).await? {
        Some((RespFrame::SimpleString(s), _)) => Ok(s),
        Some((other, _)) => Err(CitrineError::ReplicationError(format!(
            "unexpected handshake reply: {other:?}"
        ))),
        None => Err(CitrineError::ReplicationError(
            "primary closed during handshake".to_string(),
        )),
    }
}

/// Requires the next frame to be the given simple string.
async fn expect_simple_string(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
    expected: &str,
) -> Result<(), CitrineError> {
    let reply = read_simple_string(stream, buffer).await?;
    if reply != expected {
        return Err(CitrineError::ReplicationError(format!(
            "expected +{expected} from primary, got '{reply}'"
        )));
    }
    Ok(())
}

/// Reads and discards the full-resync snapshot blob: `$<len>\r\n` followed
/// by exactly `len` raw bytes, with no trailing CRLF. Returns the length.
async fn discard_snapshot_blob(
    stream: &mut TcpStream,
    buffer: &mut BytesMut,
) -> Result<usize, CitrineError> {
    // Wait for the complete length header line.
    let header_end = loop {
        if let Some(pos) = buffer.windows(2).position(|window| window == b"\r\n") {
            break pos;
        }
        if stream.read_buf(buffer).await? == 0 {
            return Err(CitrineError::ReplicationError(
                "primary closed before snapshot".to_string(),
            ));
        }
    };

    if buffer.first() != Some(&b'$') {
        return Err(CitrineError::ReplicationError(
            "expected snapshot blob after FULLRESYNC".to_string(),
        ));
    }
    let len: usize = std::str::from_utf8(&buffer[1..header_end])?
        .parse()
        .map_err(|_| CitrineError::ReplicationError("bad snapshot length".to_string()))?;
    buffer.advance(header_end + 2);

    while buffer.len() < len {
        if stream.read_buf(buffer).await? == 0 {
            return Err(CitrineError::ReplicationError(
                "primary closed mid-snapshot".to_string(),
            ));
        }
    }
    buffer.advance(len);
    Ok(len)
}
