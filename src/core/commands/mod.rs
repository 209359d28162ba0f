// src/core/commands/mod.rs

//! This module defines all supported commands and the central `Command` enum
//! that encapsulates their parsed state. A command arrives as a RESP array of
//! bulk strings; the first element names the command (case-insensitively)
//! and the rest are its arguments.

pub mod command_trait;
pub mod generic;
pub mod helpers;
pub mod streams;
pub mod string;

use crate::core::protocol::{RespFrame, RespValue};
use crate::core::CitrineError;

pub use command_trait::{ExecutableCommand, ExecutionContext, ParseCommand};
use generic::{ConfigGet, Echo, Info, Keys, Ping, Psync, Replconf, Wait};
use streams::{XAdd, XRange, XRead};
use string::{Get, Set};

/// A fully parsed command, ready to execute.
#[derive(Debug, Clone)]
pub enum Command {
    Ping(Ping),
    Echo(Echo),
    Get(Get),
    Set(Set),
    Keys(Keys),
    Info(Info),
    ConfigGet(ConfigGet),
    Replconf(Replconf),
    Psync(Psync),
    Wait(Wait),
    XAdd(XAdd),
    XRange(XRange),
    XRead(XRead),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "ping",
            Command::Echo(_) => "echo",
            Command::Get(_) => "get",
            Command::Set(_) => "set",
            Command::Keys(_) => "keys",
            Command::Info(_) => "info",
            Command::ConfigGet(_) => "config",
            Command::Replconf(_) => "replconf",
            Command::Psync(_) => "psync",
            Command::Wait(_) => "wait",
            Command::XAdd(_) => "xadd",
            Command::XRange(_) => "xrange",
            Command::XRead(_) => "xread",
        }
    }

    /// The frame a primary fans out to its replicas for this command, or
    /// `None` when the command is not part of the replicated stream.
    /// Only `SET` is propagated.
    pub fn propagation_frame(&self) -> Option<RespFrame> {
        match self {
            Command::Set(set) => Some(set.to_frame()),
            _ => None,
        }
    }

    /// Executes the command against the shared state.
    pub async fn execute(
        &self,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<RespValue, CitrineError> {
        match self {
            Command::Ping(cmd) => cmd.execute(ctx).await,
            Command::Echo(cmd) => cmd.execute(ctx).await,
            Command::Get(cmd) => cmd.execute(ctx).await,
            Command::Set(cmd) => cmd.execute(ctx).await,
            Command::Keys(cmd) => cmd.execute(ctx).await,
            Command::Info(cmd) => cmd.execute(ctx).await,
            Command::ConfigGet(cmd) => cmd.execute(ctx).await,
            Command::Replconf(cmd) => cmd.execute(ctx).await,
            Command::Wait(cmd) => cmd.execute(ctx).await,
            Command::XAdd(cmd) => cmd.execute(ctx).await,
            Command::XRange(cmd) => cmd.execute(ctx).await,
            Command::XRead(cmd) => cmd.execute(ctx).await,
            // PSYNC switches the connection's protocol; the connection
            // handler intercepts it before routing.
            Command::Psync(_) => Err(CitrineError::Internal(
                "PSYNC cannot be routed as a regular command".to_string(),
            )),
        }
    }
}

impl TryFrom<RespFrame> for Command {
    type Error = CitrineError;

    fn try_from(frame: RespFrame) -> Result<Self, Self::Error> {
        let RespFrame::Array(parts) = frame else {
            return Err(CitrineError::ProtocolError(
                "expected a command array".to_string(),
            ));
        };
        let Some((name_frame, args)) = parts.split_first() else {
            return Err(CitrineError::ProtocolError("empty command array".to_string()));
        };
        let name = helpers::extract_string(name_frame)?.to_ascii_lowercase();

        match name.as_str() {
            "ping" => Ok(Command::Ping(Ping::parse(args)?)),
            "echo" => Ok(Command::Echo(Echo::parse(args)?)),
            "get" => Ok(Command::Get(Get::parse(args)?)),
            "set" => Ok(Command::Set(Set::parse(args)?)),
            "keys" => Ok(Command::Keys(Keys::parse(args)?)),
            "info" => Ok(Command::Info(Info::parse(args)?)),
            "config" => Ok(Command::ConfigGet(ConfigGet::parse(args)?)),
            "replconf" => Ok(Command::Replconf(Replconf::parse(args)?)),
            "psync" => Ok(Command::Psync(Psync::parse(args)?)),
            "wait" => Ok(Command::Wait(Wait::parse(args)?)),
            "xadd" => Ok(Command::XAdd(XAdd::parse(args)?)),
            "xrange" => Ok(Command::XRange(XRange::parse(args)?)),
            "xread" => Ok(Command::XRead(XRead::parse(args)?)),
            _ => Err(CitrineError::UnknownCommand(name)),
        }
    }
}
