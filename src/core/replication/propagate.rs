// src/core/replication/propagate.rs

//! Primary-side fan-out of the replicated command stream.

use bytes::Bytes;
use futures::future::join_all;
use tracing::{debug, warn};

use crate::core::protocol::RespFrame;
use crate::core::state::ServerState;
use crate::core::CitrineError;

/// Encodes `frame` once and writes it to every registered replica, then
/// advances the primary's replication offset by the frame's wire length.
///
/// Writes to a broken replica connection are logged and skipped; the replica
/// is unregistered when its reader task notices the close. The caller is not
/// failed by any individual replica.
pub async fn propagate_frame(state: &ServerState, frame: &RespFrame) -> Result<(), CitrineError> {
    let encoded = frame.encode_to_vec()?;
    let replicas = state.replication.replicas();

    if !replicas.is_empty() {
        debug!(
            "Propagating {} byte frame to {} replica(s)",
            encoded.len(),
            replicas.len()
        );
        let sends = replicas.iter().map(|replica| {
            let payload = &encoded;
            async move {
                if let Err(e) = replica.send_bytes(payload).await {
                    warn!("Failed to propagate to replica {}: {}", replica.addr, e);
                }
            }
        });
        join_all(sends).await;
    }

    state.replication.advance_master_offset(encoded.len() as u64);
    Ok(())
}

/// Broadcasts `REPLCONF GETACK *` to every replica. Issued by `WAIT` before
/// it starts counting acknowledgements. The broadcast itself is part of the
/// replicated stream, so it advances the primary offset too.
pub async fn broadcast_getack(state: &ServerState) -> Result<(), CitrineError> {
    let frame = RespFrame::command_array([
        Bytes::from_static(b"REPLCONF"),
        Bytes::from_static(b"GETACK"),
        Bytes::from_static(b"*"),
    ]);
    propagate_frame(state, &frame).await
}
