// src/core/commands/string.rs

//! The string keyspace commands: `GET` and `SET`.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

use crate::core::commands::command_trait::{ExecutableCommand, ExecutionContext, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_string};
use crate::core::protocol::{RespFrame, RespValue};
use crate::core::CitrineError;

// --- GET ---

#[derive(Debug, Clone)]
pub struct Get {
    pub key: Bytes,
}

impl ParseCommand for Get {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() != 1 {
            return Err(CitrineError::WrongArgumentCount("get".to_string()));
        }
        Ok(Get {
            key: extract_bytes(&args[0])?,
        })
    }
}

#[async_trait]
impl ExecutableCommand for Get {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        Ok(match ctx.state.strings.get(&self.key) {
            Some(value) => RespValue::BulkString(value),
            None => RespValue::Null,
        })
    }
}

// --- SET ---

#[derive(Debug, Clone)]
pub struct Set {
    pub key: Bytes,
    pub value: Bytes,
    /// Relative time-to-live from the `PX <ms>` option.
    pub ttl: Option<Duration>,
}

impl ParseCommand for Set {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() < 2 {
            return Err(CitrineError::WrongArgumentCount("set".to_string()));
        }
        let key = extract_bytes(&args[0])?;
        let value = extract_bytes(&args[1])?;

        let ttl = match &args[2..] {
            [] => None,
            [px, ms] => {
                if !extract_string(px)?.eq_ignore_ascii_case("px") {
                    return Err(CitrineError::SyntaxError);
                }
                let millis: u64 = extract_string(ms)?.parse()?;
                Some(Duration::from_millis(millis))
            }
            _ => return Err(CitrineError::SyntaxError),
        };

        Ok(Set { key, value, ttl })
    }
}

impl Set {
    /// Re-encodes the command as the RESP array propagated to replicas,
    /// preserving the `PX` option verbatim.
    pub fn to_frame(&self) -> RespFrame {
        let mut parts = vec![Bytes::from_static(b"SET"), self.key.clone(), self.value.clone()];
        if let Some(ttl) = self.ttl {
            parts.push(Bytes::from_static(b"PX"));
            parts.push(ttl.as_millis().to_string().into());
        }
        RespFrame::command_array(parts)
    }
}

#[async_trait]
impl ExecutableCommand for Set {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        ctx.state
            .strings
            .set(self.key.clone(), self.value.clone(), self.ttl);
        Ok(RespValue::SimpleString("OK".to_string()))
    }
}
