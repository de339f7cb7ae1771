//! DBGP wire protocol for the debugger engine controller.
//!
//! This crate implements the engine-facing half of the DBGP protocol:
//! packet framing, typed packet decoding, command serialization,
//! transaction correlation, path conversion and breakpoint bookkeeping.
//! It performs no I/O of its own.

pub mod breakpoint;
pub mod command;
pub mod error;
pub mod framer;
pub mod ids;
pub mod packet;
pub mod path;
pub mod registry;

// Re-export key types for convenience.
pub use breakpoint::{Breakpoint, BreakpointStore};
pub use command::Command;
pub use error::{DecodeError, FramingError, TransactionError};
pub use framer::{encode_command, frame_packet, PacketFramer, DEFAULT_MAX_PACKET_LEN};
pub use ids::{SessionId, TransactionId};
pub use packet::{
    BreakMessage, Context, ContextName, EngineError, EngineStatus, InitPacket, Packet, Property,
    PropertyValue, ResponsePacket, StackFrame, StatusPacket,
};
pub use path::{paths_equal, to_editor_path, to_engine_path};
pub use registry::{PendingResponse, TransactionRegistry, TransactionResult, DEFAULT_MAX_PENDING};
