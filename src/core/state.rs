// src/core/state.rs

//! The shared server state handed to every connection handler, plus the
//! per-connection session bookkeeping.

use std::sync::Arc;

use crate::config::Config;
use crate::core::events::NotificationBus;
use crate::core::replication::ReplicationState;
use crate::core::storage::{StreamStore, StringStore};

/// The process-wide replication role, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Replica,
}

impl Role {
    /// The role name as reported by `INFO replication`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Primary => "master",
            Role::Replica => "slave",
        }
    }
}

/// All shared services: configuration, the two keyspaces, the notification
/// bus and the replication state. Handlers hold an `Arc<ServerState>` and
/// borrow services from it; no service holds a reference back.
#[derive(Debug)]
pub struct ServerState {
    pub config: Config,
    pub role: Role,
    pub strings: StringStore,
    pub streams: StreamStore,
    pub bus: Arc<NotificationBus>,
    pub replication: ReplicationState,
}

impl ServerState {
    pub fn new(config: Config) -> Arc<Self> {
        let role = if config.replica_of.is_some() {
            Role::Replica
        } else {
            Role::Primary
        };
        Arc::new(Self {
            config,
            role,
            strings: StringStore::new(),
            streams: StreamStore::new(),
            bus: Arc::new(NotificationBus::new()),
            replication: ReplicationState::new(),
        })
    }
}

/// What kind of peer sits on the other end of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// A regular client connection.
    Client,
    /// The replica's inbound link to its primary: replicated commands are
    /// applied silently, and only `REPLCONF GETACK *` is answered.
    PrimaryLink,
}

/// Per-connection state owned by its handler task.
#[derive(Debug)]
pub struct SessionState {
    pub kind: ConnectionKind,
    /// Wire bytes of every frame decoded on this connection.
    pub bytes_consumed: u64,
}

impl SessionState {
    pub fn new(kind: ConnectionKind) -> Self {
        Self {
            kind,
            bytes_consumed: 0,
        }
    }
}
