// src/core/storage/stream.rs

use bytes::Bytes;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::CitrineError;

// --- Stream ID ---

/// A stream entry id, ordered lexicographically on the (ms, seq) pair.
/// The id `0-0` is reserved and never accepted by an append.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Copy, Default)]
pub struct StreamId {
    pub timestamp_ms: u64,
    pub sequence: u64,
}

impl StreamId {
    pub const ZERO: StreamId = StreamId {
        timestamp_ms: 0,
        sequence: 0,
    };
    pub const MAX: StreamId = StreamId {
        timestamp_ms: u64::MAX,
        sequence: u64::MAX,
    };

    pub fn new(timestamp_ms: u64, sequence: u64) -> Self {
        Self {
            timestamp_ms,
            sequence,
        }
    }
}

impl FromStr for StreamId {
    type Err = CitrineError;

    /// Parses `"<ms>-<seq>"`. A bare `"<ms>"` defaults the sequence to 0;
    /// range queries that need a different default use [`StreamId::parse_bound`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamId::parse_bound(s, 0)
    }
}

impl StreamId {
    /// Parses an id, filling in `default_seq` when the `-<seq>` part is
    /// absent. Both halves are parsed as unsigned integers; the textual form
    /// is never compared lexicographically.
    pub fn parse_bound(s: &str, default_seq: u64) -> Result<Self, CitrineError> {
        let mut parts = s.splitn(2, '-');
        let ms_part = parts.next().unwrap_or("");
        let timestamp_ms = ms_part.parse().map_err(|_| {
            CitrineError::InvalidStreamId("ERR Invalid stream ID specified as stream command argument".into())
        })?;
        let sequence = match parts.next() {
            Some(seq_part) => seq_part.parse().map_err(|_| {
                CitrineError::InvalidStreamId(
                    "ERR Invalid stream ID specified as stream command argument".into(),
                )
            })?,
            None => default_seq,
        };
        Ok(StreamId::new(timestamp_ms, sequence))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.timestamp_ms, self.sequence)
    }
}

/// The id requested by an append: fully automatic (`*`), a fixed millisecond
/// part with an automatic sequence (`<ms>-*`), or fully explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpec {
    Auto,
    AutoSeq(u64),
    Explicit(StreamId),
}

// --- Stream Entry ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: StreamId,
    pub fields: IndexMap<Bytes, Bytes>,
}

// --- Main Stream Struct ---

/// An append-only stream: an ordered map from entry id to field/value pairs.
/// Ids strictly increase in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Stream {
    pub entries: BTreeMap<StreamId, StreamEntry>,
    pub last_generated_id: StreamId,
}

impl Stream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, resolving the requested [`IdSpec`] against the
    /// stream's last generated id. Validation failures leave the stream
    /// untouched.
    pub fn add_entry(
        &mut self,
        id_spec: IdSpec,
        fields: IndexMap<Bytes, Bytes>,
    ) -> Result<StreamId, CitrineError> {
        let new_id = match id_spec {
            IdSpec::Explicit(id) => {
                if id == StreamId::ZERO {
                    return Err(CitrineError::InvalidStreamId(
                        "ERR The ID specified in XADD must be greater than 0-0".into(),
                    ));
                }
                if id <= self.last_generated_id {
                    return Err(CitrineError::InvalidStreamId(
                        "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                            .into(),
                    ));
                }
                id
            }
            IdSpec::AutoSeq(timestamp_ms) => self.next_id_for_ms(timestamp_ms)?,
            IdSpec::Auto => {
                let mut timestamp_ms = now_unix_ms();
                if timestamp_ms < self.last_generated_id.timestamp_ms {
                    timestamp_ms = self.last_generated_id.timestamp_ms;
                }
                self.next_id_for_ms(timestamp_ms)?
            }
        };

        self.entries.insert(new_id, StreamEntry {
            id: new_id,
            fields,
        });
        self.last_generated_id = new_id;

        Ok(new_id)
    }

    /// The smallest id with the given millisecond part that is strictly
    /// greater than the last generated id. For ms = 0 the sequence starts at
    /// 1, so the reserved `0-0` is never produced.
    fn next_id_for_ms(&self, timestamp_ms: u64) -> Result<StreamId, CitrineError> {
        if timestamp_ms < self.last_generated_id.timestamp_ms {
            return Err(CitrineError::InvalidStreamId(
                "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                    .into(),
            ));
        }
        let sequence = if timestamp_ms == self.last_generated_id.timestamp_ms
            && (self.last_generated_id != StreamId::ZERO || !self.entries.is_empty())
        {
            self.last_generated_id
                .sequence
                .checked_add(1)
                .ok_or_else(|| {
                    CitrineError::InvalidStreamId(
                        "ERR The stream has exhausted the last possible ID".into(),
                    )
                })?
        } else if timestamp_ms == 0 {
            1
        } else {
            0
        };
        Ok(StreamId::new(timestamp_ms, sequence))
    }

    /// Entries with `start <= id <= end`, ascending.
    pub fn range(&self, start: StreamId, end: StreamId) -> Vec<StreamEntry> {
        if start > end {
            return Vec::new();
        }
        self.entries.range(start..=end).map(|(_, e)| e.clone()).collect()
    }

    /// Entries with `id > after`, ascending. This is the tail-read primitive
    /// behind `XREAD`.
    pub fn entries_after(&self, after: StreamId) -> Vec<StreamEntry> {
        use std::ops::Bound;
        self.entries
            .range((Bound::Excluded(after), Bound::Unbounded))
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Milliseconds since the UNIX epoch.
pub fn now_unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
