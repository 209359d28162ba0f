// src/core/storage/stream_store.rs

//! The stream keyspace: a mutex-protected table of named streams.
//!
//! Every operation takes the table lock for its duration and clones results
//! out, so no lock is ever held across an await point. Appends become
//! visible to subsequent reads before the caller publishes any
//! notification.

use bytes::Bytes;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;

use super::stream::{IdSpec, Stream, StreamEntry, StreamId};
use crate::core::CitrineError;

#[derive(Debug, Default)]
pub struct StreamStore {
    streams: Mutex<HashMap<Bytes, Stream>>,
}

impl StreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry, creating the stream on first use. Validation errors
    /// leave the table unchanged.
    pub fn add(
        &self,
        key: &Bytes,
        id_spec: IdSpec,
        fields: IndexMap<Bytes, Bytes>,
    ) -> Result<StreamId, CitrineError> {
        let mut streams = self.streams.lock();
        let stream = streams.entry(key.clone()).or_insert_with(Stream::new);
        let new_id = stream.add_entry(id_spec, fields);
        // Do not keep a stream that only ever saw rejected appends.
        if new_id.is_err() && stream.is_empty() {
            streams.remove(key);
        }
        new_id
    }

    /// Entries with `start <= id <= end`, ascending. A missing stream yields
    /// an empty result, not an error.
    pub fn range(&self, key: &[u8], start: StreamId, end: StreamId) -> Vec<StreamEntry> {
        self.streams
            .lock()
            .get(key)
            .map(|stream| stream.range(start, end))
            .unwrap_or_default()
    }

    /// Entries strictly greater than `after`, ascending.
    pub fn entries_after(&self, key: &[u8], after: StreamId) -> Vec<StreamEntry> {
        self.streams
            .lock()
            .get(key)
            .map(|stream| stream.entries_after(after))
            .unwrap_or_default()
    }

    /// The last generated id of a stream, or `0-0` when the stream does not
    /// exist yet. Used to resolve the `$` id of a tail read at arrival time.
    pub fn last_id(&self, key: &[u8]) -> StreamId {
        self.streams
            .lock()
            .get(key)
            .map(|stream| stream.last_generated_id)
            .unwrap_or(StreamId::ZERO)
    }
}
