// src/core/replication/state.rs

//! Contains state definitions related to replication.

use parking_lot::Mutex;
use rand::RngCore;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

/// A replica connected to this primary.
///
/// The write half of the promoted connection lives behind the handle's own
/// lock, so frames written to one replica arrive intact and in command-issue
/// order. A slow replica slows down only its own propagation.
#[derive(Debug)]
pub struct ReplicaHandle {
    pub id: u64,
    pub addr: SocketAddr,
    writer: tokio::sync::Mutex<BufWriter<OwnedWriteHalf>>,
}

impl ReplicaHandle {
    pub fn new(id: u64, addr: SocketAddr, write_half: OwnedWriteHalf) -> Self {
        Self {
            id,
            addr,
            writer: tokio::sync::Mutex::new(BufWriter::new(write_half)),
        }
    }

    /// Writes one already-encoded frame, holding the writer lock for the
    /// whole write + flush.
    pub async fn send_bytes(&self, frame: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(frame).await?;
        writer.flush().await
    }
}

/// The central struct holding all replication-related state.
///
/// `master_repl_offset` counts bytes of the replicated command stream
/// produced by this node as a primary. `replica_offset` counts bytes of the
/// stream consumed from the primary when this node is a replica, starting
/// from the end of the initial snapshot. Only the counter matching the
/// process role ever advances.
#[derive(Debug)]
pub struct ReplicationState {
    /// The unique run id of this node, 40 hex characters.
    pub master_replid: String,
    pub master_repl_offset: AtomicU64,
    pub replica_offset: AtomicU64,
    replicas: Mutex<Vec<Arc<ReplicaHandle>>>,
    next_replica_id: AtomicU64,
    /// Acknowledgements from replicas (`REPLCONF ACK <offset>`) are pushed
    /// here by the promoted connections' readers and consumed by `WAIT`.
    ack_tx: mpsc::UnboundedSender<u64>,
    pub ack_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<u64>>,
}

impl ReplicationState {
    pub fn new() -> Self {
        let (ack_tx, ack_rx) = mpsc::unbounded_channel();
        Self {
            master_replid: generate_replid(),
            master_repl_offset: AtomicU64::new(0),
            replica_offset: AtomicU64::new(0),
            replicas: Mutex::new(Vec::new()),
            next_replica_id: AtomicU64::new(0),
            ack_tx,
            ack_rx: tokio::sync::Mutex::new(ack_rx),
        }
    }

    /// Registers a promoted connection's write half as a replica and returns
    /// its handle.
    pub fn register_replica(&self, addr: SocketAddr, write_half: OwnedWriteHalf) -> Arc<ReplicaHandle> {
        let id = self.next_replica_id.fetch_add(1, Ordering::Relaxed);
        let handle = Arc::new(ReplicaHandle::new(id, addr, write_half));
        self.replicas.lock().push(handle.clone());
        handle
    }

    /// Drops a replica from the registry, normally because its connection
    /// closed.
    pub fn unregister_replica(&self, id: u64) {
        self.replicas.lock().retain(|handle| handle.id != id);
    }

    /// A snapshot of the currently registered replicas.
    pub fn replicas(&self) -> Vec<Arc<ReplicaHandle>> {
        self.replicas.lock().clone()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.lock().len()
    }

    pub fn master_offset(&self) -> u64 {
        self.master_repl_offset.load(Ordering::SeqCst)
    }

    /// Advances the primary-side offset by the wire length of a propagated
    /// frame.
    pub fn advance_master_offset(&self, frame_len: u64) {
        self.master_repl_offset.fetch_add(frame_len, Ordering::SeqCst);
    }

    pub fn replica_processed_offset(&self) -> u64 {
        self.replica_offset.load(Ordering::SeqCst)
    }

    /// Advances the replica-side offset by the wire length of a frame
    /// consumed from the primary link.
    pub fn advance_replica_offset(&self, frame_len: u64) {
        self.replica_offset.fetch_add(frame_len, Ordering::SeqCst);
    }

    /// Delivers one replica acknowledgement to a pending `WAIT`, if any.
    pub fn notify_ack(&self, acked_offset: u64) {
        let _ = self.ack_tx.send(acked_offset);
    }
}

impl Default for ReplicationState {
    fn default() -> Self {
        Self::new()
    }
}

/// A fresh 40-hex-character replication id, generated once at startup.
fn generate_replid() -> String {
    let mut raw = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut raw);
    hex::encode(raw)
}
