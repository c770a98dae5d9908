use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    errors::Result,
    models::UserProfile,
    session::{Session, SessionState, SessionStore},
    storage::{keys, DurableStore},
};

/// Keeps the in-memory session store consistent with durable storage.
///
/// The in-memory copy is always updated; durable storage is written only
/// when the session was created with "remember me". The invariant is that
/// a non-remembered session never leaves any token or user record on disk.
#[derive(Debug, Clone)]
pub struct SessionBridge {
    store: SessionStore,
    durable: Arc<dyn DurableStore>,
}

impl SessionBridge {
    pub fn new(store: SessionStore, durable: Arc<dyn DurableStore>) -> Self {
        Self { store, durable }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Raw read from durable storage, for the client's refresh fallback.
    pub(crate) async fn durable_get(&self, key: &str) -> Result<Option<String>> {
        self.durable.get(key).await
    }

    /// Restore a persisted session at process start.
    ///
    /// Returns a populated session only when the remember-me flag is set and
    /// both the access token and the user record are present and valid.
    /// Stale or partial leftovers degrade to logged-out without failing.
    pub async fn restore(&self) -> Result<Option<Session>> {
        let remembered = self.durable.get(keys::REMEMBER_ME).await?;
        if remembered.as_deref() != Some("true") {
            self.store.set(SessionState::LoggedOut);
            return Ok(None);
        }

        let token = self.durable.get(keys::TOKEN).await?;
        let user_raw = self.durable.get(keys::USER_INFO).await?;

        let (token, user_raw) = match (token, user_raw) {
            (Some(token), Some(user_raw)) => (token, user_raw),
            _ => {
                warn!("remember-me flag set but session keys are incomplete, staying logged out");
                self.store.set(SessionState::LoggedOut);
                return Ok(None);
            }
        };

        let user: UserProfile = match serde_json::from_str(&user_raw) {
            Ok(user) => user,
            Err(e) => {
                warn!("stored user record is corrupt ({}), staying logged out", e);
                self.store.set(SessionState::LoggedOut);
                return Ok(None);
            }
        };

        let refresh_token = self.durable.get(keys::REFRESH_TOKEN).await?;
        let session = Session {
            access_token: token,
            refresh_token,
            user: Some(user),
            remember_me: true,
        };

        info!("restored persisted session for {}", session_owner(&session));
        self.store.set(SessionState::LoggedIn(session.clone()));
        Ok(Some(session))
    }

    /// Commit a freshly created session (login/signup).
    pub async fn commit(&self, session: Session) -> Result<()> {
        if session.remember_me {
            self.durable.set(keys::TOKEN, &session.access_token).await?;
            if let Some(refresh) = &session.refresh_token {
                self.durable.set(keys::REFRESH_TOKEN, refresh).await?;
            }
            if let Some(user) = &session.user {
                let raw = serde_json::to_string(user)?;
                self.durable.set(keys::USER_INFO, &raw).await?;
            }
            self.durable.set(keys::REMEMBER_ME, "true").await?;
        } else {
            self.durable.set(keys::REMEMBER_ME, "false").await?;
        }

        info!("session committed for {}", session_owner(&session));
        self.store.set(SessionState::LoggedIn(session));
        Ok(())
    }

    /// Apply a token rotation from a successful refresh exchange.
    ///
    /// The new access token always reaches the in-memory store. Durable
    /// storage is only touched for remembered sessions, and the stored
    /// refresh token is left alone unless the exchange rotated it too.
    pub async fn commit_refresh(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> Result<()> {
        let mut session = match self.store.get() {
            SessionState::LoggedIn(session) => session,
            SessionState::LoggedOut => {
                // A refresh can land after a restore that only found tokens
                // on disk; treat it as a login carrying just the credentials.
                let remembered = self.durable.get(keys::REMEMBER_ME).await?;
                Session::new("").with_remember_me(remembered.as_deref() == Some("true"))
            }
        };
        session.rotate_tokens(access_token, refresh_token.clone());

        if session.remember_me {
            self.durable.set(keys::TOKEN, &session.access_token).await?;
            if let Some(refresh) = &refresh_token {
                self.durable.set(keys::REFRESH_TOKEN, refresh).await?;
            }
        }

        debug!("session tokens rotated");
        self.store.set(SessionState::LoggedIn(session));
        Ok(())
    }

    /// Drop the session everywhere: logout or unrecoverable refresh failure.
    pub async fn clear(&self) -> Result<()> {
        for key in [
            keys::TOKEN,
            keys::REFRESH_TOKEN,
            keys::USER_INFO,
            keys::REMEMBER_ME,
        ] {
            self.durable.remove(key).await?;
        }
        info!("session cleared");
        self.store.set(SessionState::LoggedOut);
        Ok(())
    }
}

fn session_owner(session: &Session) -> String {
    session
        .user
        .as_ref()
        .map(|user| user.email.clone())
        .unwrap_or_else(|| "unknown user".to_string())
}
