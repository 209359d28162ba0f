// src/core/commands/streams/xread.rs

//! Implements the `XREAD` command: strictly-greater tail reads across one or
//! more streams, optionally blocking until data arrives.
//!
//! `XREAD [BLOCK ms] STREAMS <key...> <id...>`
//!
//! The blocking path is race-free against concurrent appends: the handler
//! subscribes to every watched stream's append topic first, re-checks the
//! streams, and only then waits. A notification published between arrival
//! and subscription is therefore never load-bearing.

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::{select_all, FutureExt};
use std::time::Duration;

use crate::core::commands::command_trait::{ExecutableCommand, ExecutionContext, ParseCommand};
use crate::core::commands::helpers::{extract_bytes, extract_string};
use crate::core::commands::streams::entry_to_value;
use crate::core::events::{xadd_topic, Subscription};
use crate::core::protocol::{RespFrame, RespValue};
use crate::core::storage::StreamId;
use crate::core::CitrineError;

/// The starting id for a tail read on a specific stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamIdSpec {
    /// An explicit id; entries strictly greater are returned.
    Exact(StreamId),
    /// `$`: the stream's last id at command arrival, i.e. only entries
    /// appended after the read began.
    Last,
}

#[derive(Debug, Clone)]
pub struct XRead {
    pub streams: Vec<(Bytes, StreamIdSpec)>,
    pub block_timeout: Option<Duration>,
}

impl ParseCommand for XRead {
    fn parse(args: &[RespFrame]) -> Result<Self, CitrineError> {
        let mut block_timeout = None;
        let mut i = 0;

        while i < args.len() {
            match extract_string(&args[i])?.to_ascii_lowercase().as_str() {
                "block" => {
                    i += 1;
                    if i >= args.len() {
                        return Err(CitrineError::SyntaxError);
                    }
                    let ms: u64 = extract_string(&args[i])?.parse()?;
                    block_timeout = Some(Duration::from_millis(ms));
                    i += 1;
                }
                "streams" => {
                    i += 1;
                    break;
                }
                _ => return Err(CitrineError::SyntaxError),
            }
        }

        let remaining = &args[i..];
        if remaining.is_empty() || remaining.len() % 2 != 0 {
            return Err(CitrineError::WrongArgumentCount("xread".to_string()));
        }

        let num_streams = remaining.len() / 2;
        let mut streams = Vec::with_capacity(num_streams);
        for (key_frame, id_frame) in remaining[..num_streams]
            .iter()
            .zip(remaining[num_streams..].iter())
        {
            let key = extract_bytes(key_frame)?;
            let id_str = extract_string(id_frame)?;
            let id_spec = if id_str == "$" {
                StreamIdSpec::Last
            } else {
                StreamIdSpec::Exact(StreamId::parse_bound(&id_str, 0)?)
            };
            streams.push((key, id_spec));
        }

        Ok(XRead {
            streams,
            block_timeout,
        })
    }
}

impl XRead {
    /// One read pass over the resolved (key, after-id) pairs. Streams that
    /// yield nothing are omitted from the result.
    fn read_streams(
        ctx: &ExecutionContext<'_>,
        resolved: &[(Bytes, StreamId)],
    ) -> Vec<RespValue> {
        resolved
            .iter()
            .filter_map(|(key, after)| {
                let entries = ctx.state.streams.entries_after(key, *after);
                if entries.is_empty() {
                    return None;
                }
                Some(RespValue::Array(vec![
                    RespValue::BulkString(key.clone()),
                    RespValue::Array(entries.iter().map(entry_to_value).collect()),
                ]))
            })
            .collect()
    }

    fn into_response(results: Vec<RespValue>) -> RespValue {
        if results.is_empty() {
            RespValue::Null
        } else {
            RespValue::Array(results)
        }
    }
}

/// Waits until any of the subscriptions receives a publish.
async fn wait_for_any(subscriptions: &mut [Subscription]) {
    let receivers = subscriptions
        .iter_mut()
        .map(|subscription| subscription.recv().boxed());
    let _ = select_all(receivers).await;
}

#[async_trait]
impl ExecutableCommand for XRead {
    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> Result<RespValue, CitrineError> {
        // `$` resolves against the stream state at arrival, before any wait.
        let resolved: Vec<(Bytes, StreamId)> = self
            .streams
            .iter()
            .map(|(key, spec)| {
                let after = match spec {
                    StreamIdSpec::Exact(id) => *id,
                    StreamIdSpec::Last => ctx.state.streams.last_id(key),
                };
                (key.clone(), after)
            })
            .collect();

        let results = Self::read_streams(ctx, &resolved);
        if !results.is_empty() || self.block_timeout.is_none() {
            return Ok(Self::into_response(results));
        }

        // Subscribe before the re-check so an append between the first read
        // and here cannot be missed.
        let mut subscriptions: Vec<Subscription> = resolved
            .iter()
            .map(|(key, _)| ctx.state.bus.subscribe(&xadd_topic(key)))
            .collect();

        let results = Self::read_streams(ctx, &resolved);
        if !results.is_empty() {
            return Ok(Self::into_response(results));
        }

        let timeout = self.block_timeout.unwrap_or_default();
        let woken = if timeout.is_zero() {
            // BLOCK 0: wait indefinitely for the next append.
            wait_for_any(&mut subscriptions).await;
            true
        } else {
            tokio::time::timeout(timeout, wait_for_any(&mut subscriptions))
                .await
                .is_ok()
        };

        if !woken {
            return Ok(RespValue::Null);
        }

        Ok(Self::into_response(Self::read_streams(ctx, &resolved)))
    }
}
