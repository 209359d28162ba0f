// src/connection/handler.rs

//! Defines the `ConnectionHandler` which manages the full lifecycle of a
//! client connection: decode a frame, route it, write the reply, and advance
//! the connection's byte counter by the frame's exact wire length.
//!
//! `PSYNC` is the one protocol switch: the connection stops being a
//! request/response client and becomes a replica link. The write half joins
//! the replica registry for propagation; the read half keeps running here,
//! reduced to feeding `REPLCONF ACK` offsets into the acknowledgement
//! channel.

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::core::commands::command_trait::ExecutionContext;
use crate::core::commands::generic::Replconf;
use crate::core::persistence::rdb::EMPTY_SNAPSHOT;
use crate::core::protocol::resp_frame::read_frame;
use crate::core::protocol::RespFrame;
use crate::core::replication::propagate::propagate_frame;
use crate::core::state::{ConnectionKind, Role, ServerState, SessionState};
use crate::core::{CitrineError, Command};

const READ_BUFFER_CAPACITY: usize = 16 * 1024;

/// The next step for the connection's main loop to take.
enum NextAction {
    Continue,
    /// The connection was promoted to a replica link by `PSYNC`.
    BecomeReplica,
}

/// Manages the full lifecycle of one accepted connection.
pub struct ConnectionHandler {
    stream: TcpStream,
    buffer: BytesMut,
    addr: SocketAddr,
    state: Arc<ServerState>,
    session: SessionState,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        state: Arc<ServerState>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            addr,
            state,
            session: SessionState::new(ConnectionKind::Client),
            shutdown_rx,
        }
    }

    /// The main event loop for the connection.
    pub async fn run(mut self) -> Result<(), CitrineError> {
        loop {
            let next = tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    debug!("Connection handler for {} received shutdown signal.", self.addr);
                    return Ok(());
                }
                result = read_frame(&mut self.stream, &mut self.buffer) => match result {
                    Ok(Some((frame, frame_len))) => self.process_frame(frame, frame_len).await?,
                    Ok(None) => {
                        debug!("Connection from {} closed by peer.", self.addr);
                        return Ok(());
                    }
                    Err(e) if is_normal_disconnect(&e) => {
                        debug!("Connection from {} closed by peer: {e}", self.addr);
                        return Ok(());
                    }
                    Err(e) => {
                        warn!("Connection error for {}: {e}", self.addr);
                        return Err(e);
                    }
                },
            };

            if let NextAction::BecomeReplica = next {
                return self.run_replica_ack_loop().await;
            }
        }
    }

    /// Routes one decoded frame and writes the reply. Peer-level mistakes
    /// (bad arity, bad arguments, unknown commands) become `-ERR` frames and
    /// the connection continues; protocol and IO failures propagate up and
    /// close it.
    async fn process_frame(
        &mut self,
        frame: RespFrame,
        frame_len: usize,
    ) -> Result<NextAction, CitrineError> {
        let outcome = match Command::try_from(frame) {
            Ok(Command::Psync(_)) => {
                self.promote_to_replica().await?;
                // The counter still accounts for the PSYNC frame itself.
                self.session.bytes_consumed += frame_len as u64;
                return Ok(NextAction::BecomeReplica);
            }
            Ok(command) => {
                debug!("Session {}: routing command '{}'", self.addr, command.name());
                self.route(command).await
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(reply) => self.write_frame(reply).await?,
            Err(e) if e.is_recoverable() => {
                debug!("Session {}: command error: {e}", self.addr);
                self.write_frame(RespFrame::Error(e.to_string())).await?;
            }
            Err(e) => return Err(e),
        }

        self.session.bytes_consumed += frame_len as u64;
        Ok(NextAction::Continue)
    }

    /// Executes a command. On a primary, a propagated write is fanned out to
    /// every replica before the client sees its reply.
    async fn route(&mut self, command: Command) -> Result<RespFrame, CitrineError> {
        let mut ctx = ExecutionContext {
            state: &self.state,
            session: &mut self.session,
        };
        let value = command.execute(&mut ctx).await?;

        if self.state.role == Role::Primary {
            if let Some(frame) = command.propagation_frame() {
                propagate_frame(&self.state, &frame).await?;
            }
        }

        Ok(value.into())
    }

    async fn write_frame(&mut self, frame: RespFrame) -> Result<(), CitrineError> {
        self.stream.write_all(&frame.encode_to_vec()?).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Answers `PSYNC` with a full resync: the `+FULLRESYNC` header followed
    /// by the empty snapshot blob (`$<len>\r\n<bytes>`, no trailing CRLF),
    /// then registers the connection's write half as a replica.
    async fn promote_to_replica(&mut self) -> Result<(), CitrineError> {
        let header = format!(
            "+FULLRESYNC {} 0\r\n",
            self.state.replication.master_replid
        );
        self.stream.write_all(header.as_bytes()).await?;

        let blob_header = format!("${}\r\n", EMPTY_SNAPSHOT.len());
        self.stream.write_all(blob_header.as_bytes()).await?;
        self.stream.write_all(EMPTY_SNAPSHOT).await?;
        self.stream.flush().await?;

        info!("Promoted connection {} to replica.", self.addr);
        Ok(())
    }

    /// The post-promotion read loop: the replica sends nothing on this
    /// connection except `REPLCONF ACK <offset>`, which feeds the
    /// acknowledgement channel consumed by `WAIT`. The write half has been
    /// handed to the replica registry by the time this runs.
    async fn run_replica_ack_loop(self) -> Result<(), CitrineError> {
        let ConnectionHandler {
            stream,
            buffer,
            addr,
            state,
            mut shutdown_rx,
            ..
        } = self;
        let (read_half, write_half) = stream.into_split();
        let handle = state.replication.register_replica(addr, write_half);
        let replica_id = handle.id;

        let result = tokio::select! {
            _ = shutdown_rx.recv() => Ok(()),
            result = ack_read_loop(read_half, buffer, &state) => result,
        };

        state.replication.unregister_replica(replica_id);
        info!("Replica {addr} disconnected.");
        result
    }
}

async fn ack_read_loop(
    mut read_half: OwnedReadHalf,
    mut buffer: BytesMut,
    state: &Arc<ServerState>,
) -> Result<(), CitrineError> {
    loop {
        let Some((frame, _)) = read_frame(&mut read_half, &mut buffer).await? else {
            return Ok(());
        };
        match Command::try_from(frame) {
            Ok(Command::Replconf(Replconf::Ack(offset))) => {
                debug!("Replica acknowledged offset {offset}.");
                state.replication.notify_ack(offset);
            }
            Ok(command) => {
                debug!("Ignoring '{}' from replica connection.", command.name());
            }
            Err(e) => {
                debug!("Ignoring undecodable frame from replica: {e}");
            }
        }
    }
}

/// Helper function to check for non-critical disconnection errors.
fn is_normal_disconnect(e: &CitrineError) -> bool {
    matches!(e, CitrineError::Io(arc_err) if matches!(
        arc_err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionAborted
    ))
}
