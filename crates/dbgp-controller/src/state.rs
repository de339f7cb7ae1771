//! Which engine session the controller is talking to.

use std::collections::BTreeSet;

use dbgp_proto::{EngineStatus, SessionId};
use serde::{Deserialize, Serialize};

/// Lifecycle of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepted, waiting for `init`.
    Starting,
    /// Handshake done, script running.
    Connected,
    /// Paused.
    Break,
    /// Script finished, teardown requested.
    Stopping,
    /// Engine done.
    Stopped,
}

impl From<EngineStatus> for SessionStatus {
    fn from(status: EngineStatus) -> Self {
        match status {
            EngineStatus::Starting => Self::Starting,
            EngineStatus::Running => Self::Connected,
            EngineStatus::Break => Self::Break,
            EngineStatus::Stopping => Self::Stopping,
            EngineStatus::Stopped => Self::Stopped,
        }
    }
}

/// The session the controller drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveSession {
    /// Session id.
    pub id: SessionId,
    /// Last known status.
    pub status: SessionStatus,
}

/// Single-active-session bookkeeping.
///
/// Connections arriving while a session is active are remembered as
/// ignored so they can be listed and closed, but never driven.
#[derive(Debug, Clone, Default)]
pub struct ControllerState {
    active: Option<ActiveSession>,
    ignored: BTreeSet<SessionId>,
}

impl ControllerState {
    /// Create a state with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `id` the active session. Returns false if another one is active.
    pub fn activate(&mut self, id: SessionId) -> bool {
        match self.active {
            Some(active) if active.id != id => false,
            Some(_) => true,
            None => {
                self.active = Some(ActiveSession {
                    id,
                    status: SessionStatus::Starting,
                });
                true
            }
        }
    }

    /// Clear the active session if it is `id`.
    pub fn deactivate(&mut self, id: SessionId) -> bool {
        if self.is_active(id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    /// Update the status of the active session.
    pub fn set_status(&mut self, id: SessionId, status: SessionStatus) -> bool {
        match &mut self.active {
            Some(active) if active.id == id => {
                active.status = status;
                true
            }
            _ => false,
        }
    }

    /// The active session, if any.
    pub fn active(&self) -> Option<ActiveSession> {
        self.active
    }

    /// Whether `id` is the active session.
    pub fn is_active(&self, id: SessionId) -> bool {
        self.active.is_some_and(|a| a.id == id)
    }

    /// The active session if it can take run and inspection commands.
    pub fn connected(&self) -> Option<SessionId> {
        self.active
            .filter(|a| matches!(a.status, SessionStatus::Connected | SessionStatus::Break))
            .map(|a| a.id)
    }

    /// Remember a connection that is not driven.
    pub fn ignore(&mut self, id: SessionId) {
        self.ignored.insert(id);
    }

    /// Forget an ignored connection. Returns false if it was not ignored.
    pub fn forget_ignored(&mut self, id: SessionId) -> bool {
        self.ignored.remove(&id)
    }

    /// Ignored connections in id order.
    pub fn ignored(&self) -> Vec<SessionId> {
        self.ignored.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(n: u64) -> SessionId {
        SessionId::new(n)
    }

    #[test]
    fn state_starts_empty() {
        let state = ControllerState::new();
        assert!(state.active().is_none());
        assert!(state.connected().is_none());
        assert!(state.ignored().is_empty());
    }

    #[test]
    fn state_single_active_session() {
        let mut state = ControllerState::new();
        assert!(state.activate(sid(1)));
        assert!(!state.activate(sid(2)));
        assert!(state.activate(sid(1)));
        assert!(state.is_active(sid(1)));
        assert!(!state.is_active(sid(2)));
    }

    #[test]
    fn state_deactivate_only_matching() {
        let mut state = ControllerState::new();
        state.activate(sid(1));
        assert!(!state.deactivate(sid(2)));
        assert!(state.is_active(sid(1)));
        assert!(state.deactivate(sid(1)));
        assert!(state.active().is_none());
    }

    #[test]
    fn state_status_transitions() {
        let mut state = ControllerState::new();
        state.activate(sid(1));
        assert_eq!(state.active().unwrap().status, SessionStatus::Starting);
        assert!(state.connected().is_none());

        assert!(state.set_status(sid(1), SessionStatus::Connected));
        assert_eq!(state.connected(), Some(sid(1)));

        assert!(state.set_status(sid(1), SessionStatus::Break));
        assert_eq!(state.connected(), Some(sid(1)));

        assert!(state.set_status(sid(1), SessionStatus::Stopping));
        assert!(state.connected().is_none());

        assert!(!state.set_status(sid(9), SessionStatus::Break));
    }

    #[test]
    fn state_ignored_sessions() {
        let mut state = ControllerState::new();
        state.ignore(sid(3));
        state.ignore(sid(2));
        assert_eq!(state.ignored(), vec![sid(2), sid(3)]);
        assert!(state.forget_ignored(sid(3)));
        assert!(!state.forget_ignored(sid(3)));
        assert_eq!(state.ignored(), vec![sid(2)]);
    }

    #[test]
    fn status_from_engine_status() {
        assert_eq!(SessionStatus::from(EngineStatus::Running), SessionStatus::Connected);
        assert_eq!(SessionStatus::from(EngineStatus::Break), SessionStatus::Break);
        assert_eq!(SessionStatus::from(EngineStatus::Stopped), SessionStatus::Stopped);
    }
}
