//! Controller error types.

use dbgp_proto::TransactionError;
use thiserror::Error;

/// Errors from controller operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    /// The command needs a connected debugging session.
    #[error("an active debugging session is required")]
    NoActiveSession,

    /// A transaction could not be issued or completed.
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// The transport side of the bridge is gone.
    #[error("bridge to the transport is closed")]
    BridgeClosed,
}

/// Reasons an engine is turned away during the `init` handshake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// The engine debugs a different language.
    #[error("language isn't {expected}: {actual}")]
    WrongLanguage {
        /// Configured language.
        expected: String,
        /// Language announced by the engine.
        actual: String,
    },

    /// None of the engine's IDE keys matches ours.
    #[error("IDE key doesn't match: {offered}")]
    WrongIdeKey {
        /// Keys announced by the engine.
        offered: String,
    },

    /// There is nothing to stop at.
    #[error("no breakpoints set, disconnecting")]
    NoBreakpoints,
}

/// Errors parsing a console command line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line is blank.
    #[error("empty command")]
    Empty,

    /// A required argument is absent.
    #[error("`{command}` needs {argument}")]
    MissingArgument {
        /// Command name.
        command: &'static str,
        /// Human readable argument description.
        argument: &'static str,
    },

    /// An argument could not be interpreted.
    #[error("`{command}`: invalid argument {value:?}")]
    InvalidArgument {
        /// Command name.
        command: &'static str,
        /// The offending value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbgp_proto::SessionId;

    #[test]
    fn error_no_active_session_display() {
        assert_eq!(
            ControllerError::NoActiveSession.to_string(),
            "an active debugging session is required"
        );
    }

    #[test]
    fn error_from_transaction_error() {
        let err: ControllerError = TransactionError::SessionClosed(SessionId::new(1)).into();
        assert_eq!(
            err.to_string(),
            "session sid-1 closed before the response arrived"
        );
    }

    #[test]
    fn handshake_wrong_language_display() {
        let err = HandshakeError::WrongLanguage {
            expected: "PHP".into(),
            actual: "Python".into(),
        };
        assert_eq!(err.to_string(), "language isn't PHP: Python");
    }

    #[test]
    fn handshake_wrong_idekey_display() {
        let err = HandshakeError::WrongIdeKey {
            offered: "netbeans".into(),
        };
        assert_eq!(err.to_string(), "IDE key doesn't match: netbeans");
    }

    #[test]
    fn parse_missing_argument_display() {
        let err = ParseError::MissingArgument {
            command: "break",
            argument: "<file>:<line>",
        };
        assert_eq!(err.to_string(), "`break` needs <file>:<line>");
    }
}
