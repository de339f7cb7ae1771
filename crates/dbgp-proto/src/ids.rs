//! Session and transaction identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of one accepted engine connection.
///
/// Allocated by the transport from a monotonic counter; never reused
/// within a process. Displayed as `sid-<n>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw counter value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw counter value.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sid-{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = std::num::ParseIntError;

    /// Accepts both `sid-3` and a bare `3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().strip_prefix("sid-").unwrap_or(s.trim());
        digits.parse().map(Self)
    }
}

/// Token attached to every outbound command as `-i` and echoed back in
/// the response's `transaction_id` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    /// Wrap a transaction id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_display() {
        assert_eq!(SessionId::new(0).to_string(), "sid-0");
        assert_eq!(SessionId::new(42).to_string(), "sid-42");
    }

    #[test]
    fn session_id_parses_prefixed_and_bare() {
        assert_eq!("sid-7".parse::<SessionId>().unwrap(), SessionId::new(7));
        assert_eq!("7".parse::<SessionId>().unwrap(), SessionId::new(7));
        assert_eq!(" sid-2 ".parse::<SessionId>().unwrap(), SessionId::new(2));
        assert!("sid-x".parse::<SessionId>().is_err());
    }

    #[test]
    fn session_ids_order_by_counter() {
        assert!(SessionId::new(1) < SessionId::new(2));
    }

    #[test]
    fn transaction_id_from_str() {
        let id = TransactionId::from("t-3");
        assert_eq!(id.as_str(), "t-3");
        assert_eq!(id.to_string(), "t-3");
        assert_eq!(id, TransactionId::new("t-3"));
    }
}
