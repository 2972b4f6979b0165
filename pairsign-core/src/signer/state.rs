//! Requester-side connection state

use serde::{Deserialize, Serialize};

use crate::protocol::Session;

/// Where the signer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session
    Disconnected,
    /// An open is in progress
    Pending,
    /// A session is active
    Connected,
}

/// Cached session snapshot and accounts
///
/// Lives behind a std mutex shared by the controller and its listener task.
#[derive(Debug, Default)]
pub(crate) struct SignerState {
    session: Option<Session>,
    /// None until a session has been applied
    accounts: Option<Vec<String>>,
    pending: bool,
}

impl SignerState {
    pub fn connection_state(&self) -> ConnectionState {
        if self.session.is_some() {
            ConnectionState::Connected
        } else if self.pending {
            ConnectionState::Pending
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn accounts(&self) -> Option<&[String]> {
        self.accounts.as_deref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub fn active_topic(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.topic.as_str())
    }

    /// Make `session` the active session
    pub fn apply(&mut self, session: Session) {
        self.accounts = Some(session.state.accounts.clone());
        self.session = Some(session);
        self.pending = false;
    }

    /// Refresh the snapshot if `session` is the active one
    pub fn refresh_if_active(&mut self, session: &Session) -> bool {
        if self.active_topic() != Some(session.topic.as_str()) {
            return false;
        }
        self.accounts = Some(session.state.accounts.clone());
        self.session = Some(session.clone());
        true
    }

    /// Drop the active session and everything derived from it
    pub fn take_session(&mut self) -> Option<Session> {
        let session = self.session.take()?;
        self.accounts = None;
        self.pending = false;
        Some(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Metadata, Permissions, SessionState};

    fn session(topic: &str, account: &str) -> Session {
        Session {
            topic: topic.to_string(),
            permissions: Permissions::default(),
            state: SessionState {
                accounts: vec![account.to_string()],
            },
            peer: Metadata::default(),
        }
    }

    // ==================== Transition Tests ====================

    #[test]
    fn starts_disconnected() {
        let state = SignerState::default();
        assert_eq!(state.connection_state(), ConnectionState::Disconnected);
        assert!(state.accounts().is_none());
    }

    #[test]
    fn pending_then_connected() {
        let mut state = SignerState::default();
        state.set_pending(true);
        assert_eq!(state.connection_state(), ConnectionState::Pending);

        state.apply(session("t1", "eip155:1:0xa"));
        assert_eq!(state.connection_state(), ConnectionState::Connected);
        assert!(!state.is_pending());
        assert_eq!(state.accounts().unwrap(), ["eip155:1:0xa".to_string()]);
    }

    #[test]
    fn take_session_clears_everything() {
        let mut state = SignerState::default();
        state.apply(session("t1", "eip155:1:0xa"));

        let taken = state.take_session().unwrap();
        assert_eq!(taken.topic, "t1");
        assert_eq!(state.connection_state(), ConnectionState::Disconnected);
        assert!(state.accounts().is_none());
        assert!(state.take_session().is_none());
    }

    // ==================== Refresh Tests ====================

    #[test]
    fn refresh_applies_to_active_topic() {
        let mut state = SignerState::default();
        state.apply(session("t1", "eip155:1:0xa"));

        assert!(state.refresh_if_active(&session("t1", "eip155:1:0xb")));
        assert_eq!(state.accounts().unwrap(), ["eip155:1:0xb".to_string()]);
    }

    #[test]
    fn refresh_ignores_foreign_topic() {
        let mut state = SignerState::default();
        state.apply(session("t1", "eip155:1:0xa"));

        assert!(!state.refresh_if_active(&session("t2", "eip155:1:0xb")));
        assert_eq!(state.accounts().unwrap(), ["eip155:1:0xa".to_string()]);
    }

    #[test]
    fn refresh_without_session_is_ignored() {
        let mut state = SignerState::default();
        assert!(!state.refresh_if_active(&session("t1", "eip155:1:0xa")));
        assert!(state.session().is_none());
    }
}
