//! Events sent from the controller to its collaborator.

use dbgp_proto::{Breakpoint, Context, Property, SessionId, StackFrame};
use serde::{Deserialize, Serialize};

use crate::state::SessionStatus;

/// What the collaborator renders.
///
/// Line numbers are zero-based, file names are editor paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DebuggerEvent {
    /// The listener is bound.
    ServerStarted {
        /// Local socket address.
        address: String,
    },
    /// The listener was closed.
    ServerStopped,
    /// A session became active.
    Connected {
        /// Session id.
        session: SessionId,
    },
    /// The active session ended.
    Disconnected {
        /// Session id.
        session: SessionId,
    },
    /// A connection arrived while another session was active.
    SessionIgnored {
        /// Ignored session id.
        session: SessionId,
    },
    /// Execution stopped at a line.
    Paused {
        /// Editor path.
        file: String,
        /// Zero-based line.
        line: u32,
    },
    /// Fresh call stack, innermost frame first.
    StackUpdated {
        /// Frames with editor paths.
        frames: Vec<StackFrame>,
    },
    /// Local variables of a stack depth.
    LocalsUpdated {
        /// Stack depth the context belongs to.
        depth: u32,
        /// Variables.
        context: Context,
    },
    /// Superglobal variables.
    SuperglobalsUpdated {
        /// Variables.
        context: Context,
    },
    /// A breakpoint was added.
    BreakpointAdded {
        /// The new breakpoint.
        breakpoint: Breakpoint,
    },
    /// A breakpoint was removed.
    BreakpointRemoved {
        /// The removed breakpoint.
        breakpoint: Breakpoint,
    },
    /// Answer to a breakpoint listing.
    BreakpointsListed {
        /// All breakpoints in insertion order.
        breakpoints: Vec<Breakpoint>,
    },
    /// Result of a console evaluation.
    EvalResult {
        /// The evaluated expression.
        expression: String,
        /// The resulting value, if the engine returned one.
        value: Option<Property>,
    },
    /// Children of an expanded property.
    PropertyExpanded {
        /// Full name that was expanded.
        name: String,
        /// The property with its children.
        property: Option<Property>,
    },
    /// The engine reported an error.
    EngineError {
        /// DBGP error code.
        code: Option<i64>,
        /// Engine message.
        message: String,
    },
    /// Something went wrong on our side.
    Error {
        /// Human readable message.
        message: String,
    },
    /// Answer to a session listing.
    Sessions {
        /// Active session.
        active: Option<SessionId>,
        /// Status of the active session.
        status: Option<SessionStatus>,
        /// Connections that are not driven.
        ignored: Vec<SessionId>,
    },
}

impl DebuggerEvent {
    /// Shorthand for [`DebuggerEvent::Error`].
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
