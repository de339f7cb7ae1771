//! Engine-facing transport and the event bridge.
//!
//! The transport accepts engine connections, frames their packet streams
//! and writes command lines; the controller talks to it exclusively
//! through [`bridge`] messages.

pub mod bridge;
pub mod error;
mod session;
pub mod transport;

pub use bridge::{
    channel, decode_line, encode_line, BridgeEvent, BridgeRequest, ControllerSide, RequestId,
    RequestKind, TransportSide, DEFAULT_BRIDGE_CAPACITY,
};
pub use error::{CodecError, TransportError};
pub use transport::{Transport, TransportConfig, DEFAULT_MAX_SESSIONS};
