// src/core/events.rs

//! A topic-keyed notification bus used by blocking stream reads.
//!
//! `XADD` publishes on topic `xadd:<stream>`; a blocked `XREAD` subscribes to
//! the topics of every stream it watches before re-checking them, so a
//! publish between arrival and subscription is never load-bearing.
//!
//! The bus is a constructed service owned by `ServerState` — there is no
//! process-wide singleton, so parallel tests each get their own bus.

use bytes::Bytes;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Per-subscriber queue depth. Subscribers only need an edge to wake up and
/// re-check; a full queue already guarantees a pending wakeup.
const SUBSCRIBER_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Default)]
pub struct NotificationBus {
    topics: DashMap<String, HashMap<u64, mpsc::Sender<Bytes>>>,
    next_subscriber_id: AtomicU64,
}

/// A live subscription handle. Receives one message per publish to its topic
/// for as long as it is held; dropping it deregisters the subscriber.
pub struct Subscription {
    bus: Arc<NotificationBus>,
    topic: String,
    id: u64,
    rx: mpsc::Receiver<Bytes>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber on `topic`. Every publish to the topic from
    /// this point on is delivered to the returned handle until it is dropped.
    pub fn subscribe(self: &Arc<Self>, topic: &str) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(id, tx);
        Subscription {
            bus: Arc::clone(self),
            topic: topic.to_string(),
            id,
            rx,
        }
    }

    /// Delivers `payload` to every current subscriber of `topic`. Never
    /// blocks: a subscriber whose queue is full already has a wakeup pending,
    /// and an absent topic is a no-op.
    pub fn publish(&self, topic: &str, payload: Bytes) {
        let Some(subscribers) = self.topics.get(topic) else {
            return;
        };
        debug!(
            "Notifying {} subscriber(s) on topic '{}'",
            subscribers.len(),
            topic
        );
        for tx in subscribers.values() {
            let _ = tx.try_send(payload.clone());
        }
    }

    fn unsubscribe(&self, topic: &str, id: u64) {
        if let Some(mut subscribers) = self.topics.get_mut(topic) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                drop(subscribers);
                self.topics.remove_if(topic, |_, subs| subs.is_empty());
            }
        }
    }
}

impl Subscription {
    /// Waits for the next publish on the subscribed topic.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.topic, self.id);
    }
}

/// The topic a stream append publishes on.
pub fn xadd_topic(stream_key: &[u8]) -> String {
    format!("xadd:{}", String::from_utf8_lossy(stream_key))
}
