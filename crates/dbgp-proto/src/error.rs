//! DBGP protocol error types.

use thiserror::Error;

use crate::ids::SessionId;

/// Errors raised while splitting the engine byte stream into packets.
///
/// A framing error discards the data buffered for the session; the
/// connection itself stays open.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// The length field is empty, not decimal, or too long.
    #[error("invalid length field: {0:?}")]
    InvalidLength(String),

    /// The announced length exceeds the configured packet limit.
    #[error("announced packet length {announced} exceeds the limit of {limit} bytes")]
    TooLarge {
        /// Length announced on the wire.
        announced: usize,
        /// Configured maximum.
        limit: usize,
    },

    /// The record terminator arrived before the announced length.
    #[error("announced packet length {announced} does not match actual data length {actual}")]
    LengthMismatch {
        /// Length announced on the wire.
        announced: usize,
        /// Bytes actually present before the terminator.
        actual: usize,
    },

    /// The byte following the announced data is not the NUL terminator.
    #[error("packet of announced length {announced} is not followed by a NUL terminator")]
    MissingTerminator {
        /// Length announced on the wire.
        announced: usize,
    },

    /// The payload is not valid UTF-8.
    #[error("packet is not valid UTF-8")]
    Encoding,

    /// The payload does not start with an XML declaration.
    #[error("packet is not an XML document")]
    NotXml,
}

/// Errors raised while decoding a packet's XML into typed form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(String),

    /// A required attribute is absent.
    #[error("<{element}> is missing attribute `{attribute}`")]
    MissingAttribute {
        /// Element name.
        element: String,
        /// Attribute name.
        attribute: &'static str,
    },

    /// An attribute value could not be interpreted.
    #[error("invalid value {value:?} for attribute `{attribute}`")]
    InvalidAttribute {
        /// Attribute name.
        attribute: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Reasons a pending transaction completes without a response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The owning session closed before the engine answered.
    #[error("session {0} closed before the response arrived")]
    SessionClosed(SessionId),

    /// The command could not be written to the engine.
    #[error("transport error: {0}")]
    Transport(String),

    /// Too many transactions are already waiting for responses.
    #[error("too many pending transactions (limit {0})")]
    RegistryFull(usize),

    /// The registry went away without completing the transaction.
    #[error("transaction dropped without a response")]
    Dropped,
}
