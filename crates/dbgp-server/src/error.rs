//! Transport and bridge error types.

use dbgp_proto::SessionId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a bridge request, reported in `BridgeEvent::Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportError {
    /// No session with this id was ever accepted, or it was forgotten.
    #[error("session {session} not found")]
    SessionNotFound {
        /// Requested session.
        session: SessionId,
    },

    /// The session exists but its socket is closed.
    #[error("socket of session {session} is closed")]
    SocketClosed {
        /// Requested session.
        session: SessionId,
    },

    /// The listener could not be bound.
    #[error("cannot listen on {address}: {message}")]
    Bind {
        /// Address that was requested.
        address: String,
        /// OS error text.
        message: String,
    },

    /// The other side of the bridge went away.
    #[error("bridge channel closed")]
    ChannelClosed,

    /// Socket I/O failed.
    #[error("I/O error: {message}")]
    Io {
        /// OS error text.
        message: String,
    },
}

/// Errors of the line-based bridge codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The line is not a valid bridge message.
    #[error("invalid bridge message: {0}")]
    Json(#[from] serde_json::Error),
}
