// src/server/mod.rs

//! Server bootstrap: build the shared state, warm-load the snapshot, spawn
//! the background tasks, and run the accept loop until shutdown.

use anyhow::Result;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::Config;
use crate::connection::ConnectionHandler;
use crate::core::persistence::rdb;
use crate::core::replication::worker::ReplicaWorker;
use crate::core::state::{Role, ServerState};
use crate::core::tasks::expiry::ExpirySweeperTask;

/// The main server startup function, orchestrating all setup phases. Runs
/// until ctrl-c.
pub async fn run(config: Config) -> Result<()> {
    let state = ServerState::new(config);
    info!(
        "Starting in {} mode, replid {}.",
        state.role.as_str(),
        state.replication.master_replid
    );

    load_snapshot(&state);

    let (shutdown_tx, _) = broadcast::channel(1);

    let sweeper = ExpirySweeperTask::new(state.clone());
    tokio::spawn(sweeper.run(shutdown_tx.subscribe()));

    if state.role == Role::Replica {
        let worker = ReplicaWorker::new(state.clone());
        tokio::spawn(worker.run(shutdown_tx.subscribe()));
    }

    let listener = TcpListener::bind(("0.0.0.0", state.config.port)).await?;
    info!("Listening on port {}.", state.config.port);

    accept_loop(listener, state, &shutdown_tx).await;

    info!("Shutting down.");
    let _ = shutdown_tx.send(());
    Ok(())
}

/// Warm-loads the string keyspace from the optional snapshot file. A missing
/// or malformed snapshot is a warning, never fatal.
fn load_snapshot(state: &Arc<ServerState>) {
    let path = state.config.snapshot_path();
    match rdb::load_file(&path, &state.strings) {
        Ok(loaded) => info!("Loaded {loaded} key(s) from snapshot {}.", path.display()),
        Err(e) => warn!(
            "Could not load snapshot {}: {e}. Starting with an empty keyspace.",
            path.display()
        ),
    }
}

/// Accepts connections until ctrl-c, spawning one handler task each.
async fn accept_loop(
    listener: TcpListener,
    state: Arc<ServerState>,
    shutdown_tx: &broadcast::Sender<()>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("Error accepting connection: {e}");
                        continue;
                    }
                };
                info!("Accepted connection from {addr}.");
                let handler = ConnectionHandler::new(
                    stream,
                    addr,
                    state.clone(),
                    shutdown_tx.subscribe(),
                );
                tokio::spawn(async move {
                    if let Err(e) = handler.run().await {
                        warn!("Connection {addr} terminated with error: {e}");
                    }
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c.");
                return;
            }
        }
    }
}
