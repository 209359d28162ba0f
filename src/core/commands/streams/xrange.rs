// src/core/commands/streams/xrange.rs

//! Implements the `XRANGE` command: an inclusive id-range read of a stream.
//!
//! `-` and `+` map to the smallest and largest possible ids. A boundary
//! without an explicit sequence expands to `<ms>-0` on the start side and
//! `<ms>-<MAX>` on the end side.

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::commands::command_trait::{ExecutableCommand, ExecutionContext, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_string};
use crate::core::commands::streams::entry_to_value;
use crate::core::protocol::{RespFrame, RespValue};
use crate::core::storage::StreamId;
use crate::core::CitrineError;

#[derive(Debug, Clone)]
pub struct XRange {
    pub key: Bytes,
    pub start: StreamId,
    pub end: StreamId,
}

fn parse_range_boundary(token: &str, default_seq: u64) -> Result<StreamId, CitrineError> {
    match token {
        "-" => Ok(StreamId::ZERO),
        "+" => Ok(StreamId::MAX),
        _ => StreamId::parse_bound(token, default_seq),
    }
}

impl ParseCommand for XRange {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        if args.len() != 3 {
            return Err(CitrineError::WrongArgumentCount("xrange".to_string()));
        }
        let key = extract_bytes(&args[0])?;
        let start = parse_range_boundary(&extract_string(&args[1])?, 0)?;
        let end = parse_range_boundary(&extract_string(&args[2])?, u64::MAX)?;
        Ok(XRange { key, start, end })
    }
}

#[async_trait]
impl ExecutableCommand for XRange {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        let entries = ctx.state.streams.range(&self.key, self.start, self.end);
        Ok(RespValue::Array(
            entries.iter().map(entry_to_value).collect(),
        ))
    }
}
