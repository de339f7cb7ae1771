//! Transaction registry.
//!
//! Hands out `t-N` ids, remembers which session and command each one
//! belongs to, and completes the waiting receiver when the engine echoes
//! the id back in a response.
use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::TransactionError;
use crate::ids::{SessionId, TransactionId};
use crate::packet::ResponsePacket;

/// Default cap on simultaneously pending transactions.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Outcome delivered to a waiting caller.
pub type TransactionResult = Result<ResponsePacket, TransactionError>;

/// Receiving half returned by [`TransactionRegistry::register`].
pub type PendingResponse = oneshot::Receiver<TransactionResult>;

#[derive(Debug)]
struct PendingTransaction {
    session: SessionId,
    command: String,
    sender: oneshot::Sender<TransactionResult>,
}

/// Pending transactions keyed by id.
#[derive(Debug)]
pub struct TransactionRegistry {
    next_id: u64,
    limit: usize,
    pending: HashMap<TransactionId, PendingTransaction>,
}

impl TransactionRegistry {
    /// Create a registry with [`DEFAULT_MAX_PENDING`].
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_PENDING)
    }

    /// Create a registry holding at most `limit` pending transactions.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            next_id: 0,
            limit,
            pending: HashMap::new(),
        }
    }

    /// Allocate the next id and register a pending entry for it.
    pub fn register(
        &mut self,
        session: SessionId,
        command: &str,
    ) -> Result<(TransactionId, PendingResponse), TransactionError> {
        if self.pending.len() >= self.limit {
            return Err(TransactionError::RegistryFull(self.limit));
        }

        let id = TransactionId::new(format!("t-{}", self.next_id));
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id.clone(),
            PendingTransaction {
                session,
                command: command.to_string(),
                sender: tx,
            },
        );
        Ok((id, rx))
    }

    /// Complete the transaction named by the response's `transaction_id`.
    ///
    /// Returns false when the response carries no id or an unknown one.
    pub fn resolve(&mut self, response: ResponsePacket) -> bool {
        let Some(id) = response.transaction_id.as_ref() else {
            tracing::debug!("response without transaction id dropped");
            return false;
        };
        let Some(entry) = self.pending.remove(id) else {
            tracing::debug!(transaction = %id, "response for unknown transaction dropped");
            return false;
        };
        if response.command.as_deref().is_some_and(|c| c != entry.command) {
            tracing::debug!(
                transaction = %id,
                expected = %entry.command,
                "response command does not match the registered command"
            );
        }
        // The caller may have stopped waiting.
        let _ = entry.sender.send(Ok(response));
        true
    }

    /// Complete a transaction with an error. Returns false if it is unknown.
    pub fn fail(&mut self, id: &TransactionId, error: TransactionError) -> bool {
        match self.pending.remove(id) {
            Some(entry) => {
                let _ = entry.sender.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Fail every transaction of `session` with `SessionClosed`.
    ///
    /// Returns how many were cancelled.
    pub fn cancel_session(&mut self, session: SessionId) -> usize {
        let ids: Vec<TransactionId> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.session == session)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            self.fail(id, TransactionError::SessionClosed(session));
        }
        ids.len()
    }

    /// Number of pending transactions.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
