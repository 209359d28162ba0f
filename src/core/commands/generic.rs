// src/core/commands/generic.rs

//! Connection, introspection and replication control commands.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::core::commands::command_trait::{ExecutableCommand, ExecutionContext, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_string};
use crate::core::protocol::{RespFrame, RespValue};
use crate::core::replication::propagate::broadcast_getack;
use crate::core::state::Role;
use crate::core::CitrineError;

// --- PING ---

#[derive(Debug, Clone, Default)]
pub struct Ping;

impl ParseCommand for Ping {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if !args.is_empty() {
            return Err(CitrineError::WrongArgumentCount("ping".to_string()));
        }
        Ok(Ping)
    }
}

#[async_trait]
impl ExecutableCommand for Ping {
    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        Ok(RespValue::SimpleString("PONG".to_string()))
    }
}

// --- ECHO ---

#[derive(Debug, Clone)]
pub struct Echo {
    pub message: Bytes,
}

impl ParseCommand for Echo {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() != 1 {
            return Err(CitrineError::WrongArgumentCount("echo".to_string()));
        }
        Ok(Echo {
            message: extract_bytes(&args[0])?,
        })
    }
}

#[async_trait]
impl ExecutableCommand for Echo {
    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        Ok(RespValue::BulkString(self.message.clone()))
    }
}

// --- KEYS ---

#[derive(Debug, Clone)]
pub struct Keys {
    pub pattern: String,
}

impl ParseCommand for Keys {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() != 1 {
            return Err(CitrineError::WrongArgumentCount("keys".to_string()));
        }
        Ok(Keys {
            pattern: extract_string(&args[0])?,
        })
    }
}

#[async_trait]
impl ExecutableCommand for Keys {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        let keys = ctx.state.strings.keys(&self.pattern);
        Ok(RespValue::Array(
            keys.into_iter().map(RespValue::BulkString).collect(),
        ))
    }
}

// --- INFO ---

#[derive(Debug, Clone)]
pub struct Info {
    pub section: String,
}

impl ParseCommand for Info {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() != 1 {
            return Err(CitrineError::WrongArgumentCount("info".to_string()));
        }
        Ok(Info {
            section: extract_string(&args[0])?.to_ascii_lowercase(),
        })
    }
}

#[async_trait]
impl ExecutableCommand for Info {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        if self.section != "replication" {
            return Err(CitrineError::InvalidState(format!(
                "unsupported INFO section '{}'",
                self.section
            )));
        }
        let replication = &ctx.state.replication;
        let offset = match ctx.state.role {
            Role::Primary => replication.master_offset(),
            Role::Replica => replication.replica_processed_offset(),
        };
        let info = format!(
            "role:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}",
            ctx.state.role.as_str(),
            replication.master_replid,
            offset,
        );
        Ok(RespValue::BulkString(info.into()))
    }
}

// --- CONFIG GET ---

#[derive(Debug, Clone)]
pub struct ConfigGet {
    pub parameter: String,
}

impl ParseCommand for ConfigGet {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() != 2 {
            return Err(CitrineError::WrongArgumentCount("config".to_string()));
        }
        if !extract_string(&args[0])?.eq_ignore_ascii_case("get") {
            return Err(CitrineError::SyntaxError);
        }
        Ok(ConfigGet {
            parameter: extract_string(&args[1])?.to_ascii_lowercase(),
        })
    }
}

#[async_trait]
impl ExecutableCommand for ConfigGet {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        let value = match self.parameter.as_str() {
            "dir" => Some(ctx.state.config.dir.clone()),
            "dbfilename" => Some(ctx.state.config.dbfilename.clone()),
            _ => None,
        };
        Ok(match value {
            Some(value) => RespValue::Array(vec![
                RespValue::BulkString(self.parameter.clone().into()),
                RespValue::BulkString(value.into()),
            ]),
            None => RespValue::Array(vec![]),
        })
    }
}

// --- REPLCONF ---

#[derive(Debug, Clone)]
pub enum Replconf {
    /// `REPLCONF listening-port <port>` from a replica during the handshake.
    ListeningPort(u16),
    /// `REPLCONF capa ...` capability advertisements.
    Capa,
    /// `REPLCONF GETACK *` from the primary, answered with the replica's
    /// processed offset.
    GetAck,
    /// `REPLCONF ACK <offset>` from a replica, consumed by `WAIT`.
    Ack(u64),
}

impl ParseCommand for Replconf {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.is_empty() {
            return Err(CitrineError::WrongArgumentCount("replconf".to_string()));
        }
        let subcommand = extract_string(&args[0])?.to_ascii_lowercase();
        match subcommand.as_str() {
            "listening-port" => {
                if args.len() != 2 {
                    return Err(CitrineError::WrongArgumentCount("replconf".to_string()));
                }
                Ok(Replconf::ListeningPort(extract_string(&args[1])?.parse()?))
            }
            "capa" => Ok(Replconf::Capa),
            "getack" => {
                if args.len() != 2 {
                    return Err(CitrineError::WrongArgumentCount("replconf".to_string()));
                }
                Ok(Replconf::GetAck)
            }
            "ack" => {
                if args.len() != 2 {
                    return Err(CitrineError::WrongArgumentCount("replconf".to_string()));
                }
                Ok(Replconf::Ack(extract_string(&args[1])?.parse()?))
            }
            _ => Ok(Replconf::Capa),
        }
    }
}

#[async_trait]
impl ExecutableCommand for Replconf {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        match self {
            Replconf::GetAck => {
                if ctx.state.role == Role::Primary {
                    return Err(CitrineError::RoleViolation(
                        "REPLCONF GETACK is only valid on a replica".to_string(),
                    ));
                }
                // The offset reported excludes the GETACK frame itself; the
                // dispatcher advances the counter after the handler runs.
                let offset = ctx.state.replication.replica_processed_offset();
                Ok(RespValue::Array(vec![
                    RespValue::BulkString(Bytes::from_static(b"REPLCONF")),
                    RespValue::BulkString(Bytes::from_static(b"ACK")),
                    RespValue::BulkString(offset.to_string().into()),
                ]))
            }
            Replconf::Ack(acked_offset) => {
                if ctx.state.role == Role::Replica {
                    return Err(CitrineError::RoleViolation(
                        "REPLCONF ACK is only valid on a primary".to_string(),
                    ));
                }
                debug!("Received replica ACK at offset {acked_offset}");
                ctx.state.replication.notify_ack(*acked_offset);
                Ok(RespValue::SimpleString("OK".to_string()))
            }
            Replconf::ListeningPort(_) | Replconf::Capa => {
                Ok(RespValue::SimpleString("OK".to_string()))
            }
        }
    }
}

// --- PSYNC ---

/// `PSYNC ? -1`. Parsed like any command, but never routed: the connection
/// handler intercepts it and promotes the connection to a replica link.
#[derive(Debug, Clone)]
pub struct Psync {
    pub replication_id: String,
    pub offset: i64,
}

impl ParseCommand for Psync {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() != 2 {
            return Err(CitrineError::WrongArgumentCount("psync".to_string()));
        }
        let replication_id = extract_string(&args[0])?;
        let offset_str = extract_string(&args[1])?;
        let offset = if offset_str == "-1" {
            -1
        } else {
            offset_str.parse().map_err(|_| CitrineError::NotAnInteger)?
        };
        Ok(Psync {
            replication_id,
            offset,
        })
    }
}

// --- WAIT ---

#[derive(Debug, Clone)]
pub struct Wait {
    pub num_replicas: usize,
    pub timeout_ms: u64,
}

impl ParseCommand for Wait {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() != 2 {
            return Err(CitrineError::WrongArgumentCount("wait".to_string()));
        }
        Ok(Wait {
            num_replicas: extract_string(&args[0])?.parse()?,
            timeout_ms: extract_string(&args[1])?.parse()?,
        })
    }
}

#[async_trait]
impl ExecutableCommand for Wait {
    /// Broadcasts `REPLCONF GETACK *`, then counts acknowledgements until
    /// enough arrive or the deadline fires. Acknowledgements are counted,
    /// not correlated to offsets.
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        if ctx.state.role != Role::Primary {
            return Err(CitrineError::RoleViolation(
                "WAIT is only valid on a primary".to_string(),
            ));
        }
        if self.num_replicas == 0 {
            return Ok(RespValue::Integer(0));
        }

        broadcast_getack(ctx.state).await?;

        let deadline = Instant::now() + Duration::from_millis(self.timeout_ms);
        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        // One WAIT consumes the channel at a time.
        let mut ack_rx = ctx.state.replication.ack_rx.lock().await;
        let mut acks = 0usize;
        loop {
            tokio::select! {
                received = ack_rx.recv() => {
                    if received.is_some() {
                        acks += 1;
                        if acks >= self.num_replicas {
                            return Ok(RespValue::Integer(acks as i64));
                        }
                    }
                }
                _ = &mut timer => {
                    let result = if acks > 0 {
                        acks as i64
                    } else {
                        ctx.state.replication.replica_count() as i64
                    };
                    return Ok(RespValue::Integer(result));
                }
            }
        }
    }
}
