// src/core/commands/streams/xadd.rs

//! Implements the `XADD` command for appending entries to a stream.
//!
//! `XADD stream <* | ms-* | ms-seq> field value [field value ...]`
//!
//! The entry id is either fully auto-generated (`*`), auto-sequenced within
//! a fixed millisecond part (`<ms>-*`), or explicit. Explicit ids must be
//! strictly greater than the stream's last id; `0-0` is always rejected.
//! Every successful append notifies blocked tail readers of the stream.

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;

use crate::core::commands::command_trait::{ExecutableCommand, ExecutionContext, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_string};
use crate::core::events::xadd_topic;
use crate::core::protocol::{RespFrame, RespValue};
use crate::core::storage::{IdSpec, StreamId};
use crate::core::CitrineError;

#[derive(Debug, Clone)]
pub struct XAdd {
    pub key: Bytes,
    pub id_spec: IdSpec,
    pub fields: IndexMap<Bytes, Bytes>,
}

fn parse_id_spec(token: &str) -> Result<IdSpec, CitrineError> {
    if token == "*" {
        return Ok(IdSpec::Auto);
    }
    if let Some(ms_part) = token.strip_suffix("-*") {
        let timestamp_ms = ms_part.parse().map_err(|_| {
            CitrineError::InvalidStreamId(
                "ERR Invalid stream ID specified as stream command argument".into(),
            )
        })?;
        return Ok(IdSpec::AutoSeq(timestamp_ms));
    }
    Ok(IdSpec::Explicit(StreamId::parse_bound(token, 0)?))
}

impl ParseCommand for XAdd {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        // Key, id, and at least one field/value pair.
        if args.len() < 4 {
            return Err(CitrineError::WrongArgumentCount("xadd".to_string()));
        }
        let key = extract_bytes(&args[0])?;
        let id_spec = parse_id_spec(&extract_string(&args[1])?)?;

        let field_args = &args[2..];
        if field_args.len() % 2 != 0 {
            return Err(CitrineError::WrongArgumentCount("xadd".to_string()));
        }
        let fields = field_args
            .chunks_exact(2)
            .map(|chunk| Ok((extract_bytes(&chunk[0])?, extract_bytes(&chunk[1])?)))
            .collect::<Result<IndexMap<_, _>, CitrineError>>()?;

        Ok(XAdd {
            key,
            id_spec,
            fields,
        })
    }
}

#[async_trait]
impl ExecutableCommand for XAdd {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        let new_id = ctx
            .state
            .streams
            .add(&self.key, self.id_spec, self.fields.clone())?;

        // The append is visible to readers before anyone is woken.
        ctx.state
            .bus
            .publish(&xadd_topic(&self.key), self.key.clone());

        Ok(RespValue::BulkString(new_id.to_string().into()))
    }
}
