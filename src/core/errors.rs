// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::num::ParseIntError;
use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug)]
pub enum CitrineError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Incomplete data in stream")]
    IncompleteData,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("ERR syntax error")]
    SyntaxError,

    #[error("ERR wrong number of arguments for '{0}' command")]
    WrongArgumentCount(String),

    #[error("ERR value is not an integer or out of range")]
    NotAnInteger,

    #[error("{0}")]
    InvalidStreamId(String),

    #[error("ERR {0}")]
    RoleViolation(String),

    #[error("Replication Error: {0}")]
    ReplicationError(String),

    #[error("Snapshot Error: {0}")]
    SnapshotError(String),

    #[error("ERR {0}")]
    InvalidState(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl CitrineError {
    /// `true` when the error is a peer-level mistake that should be reported
    /// as an error frame while the connection keeps running. Protocol and IO
    /// failures terminate the connection instead.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            CitrineError::Io(_) | CitrineError::IncompleteData | CitrineError::ProtocolError(_)
        )
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for CitrineError {
    fn from(e: std::io::Error) -> Self {
        CitrineError::Io(Arc::new(e))
    }
}

impl From<ParseIntError> for CitrineError {
    fn from(_: ParseIntError) -> Self {
        CitrineError::NotAnInteger
    }
}

impl From<std::string::FromUtf8Error> for CitrineError {
    fn from(_: std::string::FromUtf8Error) -> Self {
        CitrineError::SyntaxError
    }
}

impl From<std::str::Utf8Error> for CitrineError {
    fn from(_: std::str::Utf8Error) -> Self {
        CitrineError::SyntaxError
    }
}
