use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::UserProfile;

/// A logged-in session: tokens, user identity, and the persistence choice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub user: Option<UserProfile>,
    /// When false the session lives only in memory and never reaches
    /// durable storage.
    pub remember_me: bool,
}

impl Session {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            user: None,
            remember_me: false,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_user(mut self, user: UserProfile) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_remember_me(mut self, remember_me: bool) -> Self {
        self.remember_me = remember_me;
        self
    }

    /// Apply a token rotation from a successful refresh exchange. The
    /// refresh token only changes when the exchange returned a new one.
    pub fn rotate_tokens(&mut self, access_token: String, refresh_token: Option<String>) {
        self.access_token = access_token;
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
    }
}

/// Session state machine: a process starts logged out and only becomes
/// logged in through login/signup, restore, or a refresh rotation.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    LoggedOut,
    LoggedIn(Session),
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, SessionState::LoggedIn(_))
    }

    pub fn access_token(&self) -> Option<&str> {
        match self {
            SessionState::LoggedIn(session) => Some(session.access_token.as_str()),
            SessionState::LoggedOut => None,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            SessionState::LoggedIn(session) => session.refresh_token.as_deref(),
            SessionState::LoggedOut => None,
        }
    }

    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            SessionState::LoggedIn(session) => session.user.as_ref(),
            SessionState::LoggedOut => None,
        }
    }
}

/// Observable in-memory session store.
///
/// Injected into the client at construction time so request building can
/// read the current token synchronously and the UI can subscribe to
/// login/logout transitions. Backed by a watch channel; clones share state.
#[derive(Debug, Clone)]
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::LoggedOut);
        Self { tx }
    }

    pub fn get(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn set(&self, state: SessionState) {
        if *self.tx.borrow() != state {
            self.tx.send_replace(state);
        }
    }

    /// Subscribe to session transitions (login, logout, token rotation).
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_keeps_refresh_token_when_absent() {
        let mut session = Session::new("abc").with_refresh_token("r1");
        session.rotate_tokens("abc2".to_string(), None);
        assert_eq!(session.access_token, "abc2");
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
    }

    #[test]
    fn rotation_replaces_refresh_token_when_present() {
        let mut session = Session::new("abc").with_refresh_token("r1");
        session.rotate_tokens("abc2".to_string(), Some("r2".to_string()));
        assert_eq!(session.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn store_starts_logged_out() {
        let store = SessionStore::new();
        assert_eq!(store.get(), SessionState::LoggedOut);
        assert!(store.get().access_token().is_none());
    }

    #[test]
    fn store_clones_share_state() {
        let store = SessionStore::new();
        let other = store.clone();
        store.set(SessionState::LoggedIn(Session::new("abc")));
        assert_eq!(other.get().access_token(), Some("abc"));
    }

    #[tokio::test]
    async fn subscribers_observe_transitions() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        store.set(SessionState::LoggedIn(Session::new("abc")));
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_logged_in());

        store.set(SessionState::LoggedOut);
        rx.changed().await.unwrap();
        assert!(!rx.borrow().is_logged_in());
    }
}
