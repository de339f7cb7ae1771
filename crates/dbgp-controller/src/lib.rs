//! The debugging session state machine.
//!
//! Drives one engine session at a time through handshake, breakpoint
//! synchronization, run/break cycles and teardown, and reports what
//! happens as [`DebuggerEvent`]s.

pub mod controller;
pub mod error;
pub mod event;
pub mod input;
pub mod state;

pub use controller::{Controller, ControllerOptions, DEFAULT_PORT};
pub use error::{ControllerError, HandshakeError, ParseError};
pub use event::DebuggerEvent;
pub use input::UserCommand;
pub use state::{ActiveSession, ControllerState, SessionStatus};
