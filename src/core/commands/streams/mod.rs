// src/core/commands/streams/mod.rs

//! The stream keyspace commands: `XADD`, `XRANGE` and `XREAD`.

pub mod xadd;
pub mod xrange;
pub mod xread;

pub use xadd::XAdd;
pub use xrange::XRange;
pub use xread::{StreamIdSpec, XRead};

use crate::core::protocol::RespValue;
use crate::core::storage::StreamEntry;

/// Renders a stream entry as the two-element array `[id, [f1, v1, f2, v2, ...]]`.
pub(crate) fn entry_to_value(entry: &StreamEntry) -> RespValue {
    let fields = entry
        .fields
        .iter()
        .flat_map(|(field, value)| {
            [
                RespValue::BulkString(field.clone()),
                RespValue::BulkString(value.clone()),
            ]
        })
        .collect();
    RespValue::Array(vec![
        RespValue::BulkString(entry.id.to_string().into()),
        RespValue::Array(fields),
    ])
}
