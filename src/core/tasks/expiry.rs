// src/core/tasks/expiry.rs

//! The background expiry sweeper for the string keyspace.
//!
//! The sweeper is an eager complement to lazy expiry: readers already treat
//! past-deadline keys as absent, so a key leaking here for one cycle is
//! invisible to clients.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::core::state::ServerState;

const SWEEP_INTERVAL: Duration = Duration::from_millis(100);

pub struct ExpirySweeperTask {
    state: Arc<ServerState>,
}

impl ExpirySweeperTask {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self { state }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Expiry sweeper task is running.");
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.state.strings.sweep_expired();
                    if removed > 0 {
                        debug!("Expiry sweeper removed {removed} key(s).");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Expiry sweeper shutting down.");
                    return;
                }
            }
        }
    }
}
