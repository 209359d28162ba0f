// src/core/commands/helpers.rs

//! Provides helper functions for parsing command arguments from `RespFrame`s.

use bytes::Bytes;

use crate::core::protocol::RespFrame;
use crate::core::CitrineError;

/// Extracts the raw bytes of a bulk-string argument.
pub fn extract_bytes(frame: &RespFrame) -> Result<Bytes, CitrineError> {
    match frame {
        RespFrame::BulkString(bs) => Ok(bs.clone()),
        _ => Err(CitrineError::SyntaxError),
    }
}

/// Extracts a bulk-string argument as UTF-8 text.
pub fn extract_string(frame: &RespFrame) -> Result<String, CitrineError> {
    if let RespFrame::BulkString(bs) = frame {
        String::from_utf8(bs.to_vec()).map_err(|_| CitrineError::SyntaxError)
    } else {
        Err(CitrineError::SyntaxError)
    }
}
