//! Event bridge between the controller and the transport.
//!
//! Requests flow controller → transport, events flow back. Both
//! directions are bounded tokio channels; the same messages can also be
//! written one JSON object per line when the two halves run in
//! separate processes.

use std::fmt;

use dbgp_proto::SessionId;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{CodecError, TransportError};

/// Default capacity of each bridge channel.
pub const DEFAULT_BRIDGE_CAPACITY: usize = 256;

/// Correlates a request with its `Completed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw counter value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r-{}", self.0)
    }
}

/// A request to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRequest {
    /// Echoed in the matching `Completed` event.
    pub id: RequestId,
    /// What to do.
    pub kind: RequestKind,
}

/// The operations the transport understands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RequestKind {
    /// Drop any listener and all sessions, then listen on `port`.
    StartServer {
        /// TCP port; 0 picks a free one.
        port: u16,
    },
    /// Stop accepting connections; sessions stay open.
    StopServer,
    /// Close every session.
    Disconnect,
    /// Write one command line to a session.
    Send {
        /// Target session.
        session: SessionId,
        /// Command text without the NUL terminator.
        text: String,
    },
    /// Close one session.
    CloseSession {
        /// Target session.
        session: SessionId,
    },
}

impl RequestKind {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartServer { .. } => "start_server",
            Self::StopServer => "stop_server",
            Self::Disconnect => "disconnect",
            Self::Send { .. } => "send",
            Self::CloseSession { .. } => "close_session",
        }
    }
}

/// A notification from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// The listener is bound.
    Listening {
        /// Local socket address.
        address: String,
    },
    /// An engine connected.
    Connect {
        /// New session id.
        session: SessionId,
    },
    /// A session ended; sent exactly once per session.
    Disconnect {
        /// Closed session id.
        session: SessionId,
    },
    /// One complete packet arrived.
    Data {
        /// Originating session.
        session: SessionId,
        /// XML document text.
        text: String,
    },
    /// A request finished.
    Completed {
        /// The request this answers.
        request: RequestId,
        /// Outcome.
        result: Result<(), TransportError>,
    },
}

/// The controller's half of the bridge.
#[derive(Debug)]
pub struct ControllerSide {
    /// Outbound requests.
    pub requests: mpsc::Sender<BridgeRequest>,
    /// Inbound events.
    pub events: mpsc::Receiver<BridgeEvent>,
}

/// The transport's half of the bridge.
#[derive(Debug)]
pub struct TransportSide {
    /// Inbound requests.
    pub requests: mpsc::Receiver<BridgeRequest>,
    /// Outbound events.
    pub events: mpsc::Sender<BridgeEvent>,
}

/// Create both halves of a bridge with `capacity` slots per direction.
pub fn channel(capacity: usize) -> (ControllerSide, TransportSide) {
    let (req_tx, req_rx) = mpsc::channel(capacity.max(1));
    let (evt_tx, evt_rx) = mpsc::channel(capacity.max(1));
    (
        ControllerSide {
            requests: req_tx,
            events: evt_rx,
        },
        TransportSide {
            requests: req_rx,
            events: evt_tx,
        },
    )
}

/// Encode a bridge message as one JSON line, including the newline.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Decode one JSON line produced by [`encode_line`].
pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(line.trim_end())?)
}
