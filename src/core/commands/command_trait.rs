// src/core/commands/command_trait.rs

//! The traits every command implements, and the context commands execute in.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::protocol::{RespFrame, RespValue};
use crate::core::state::{ServerState, SessionState};
use crate::core::CitrineError;

/// Parses a command's arguments (everything after the command name) from a
/// slice of `RespFrame`s.
pub trait ParseCommand: Sized {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError>;
}

/// Everything a command can touch while executing: the shared server state
/// and the session of the connection that issued it.
pub struct ExecutionContext<'a> {
    pub state: &'a Arc<ServerState>,
    pub session: &'a mut SessionState,
}

#[async_trait]
pub trait ExecutableCommand {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError>;
}
