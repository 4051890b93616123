//! Authenticated session state.
//!
//! The token and cached user live in the key/value store so a restart keeps
//! the session. Logging out wipes both and emits `AuthEvent::LoggedOut`, which
//! the workspace uses to release any open camera.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::api::ACCESS_TOKEN_KEY;
use crate::storage::{lock, SharedStore};

pub const USER_DATA_KEY: &str = "user_data";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthEvent {
    LoggedIn { username: String },
    LoggedOut,
}

pub struct AuthSession {
    store: SharedStore,
    token: Option<Zeroizing<String>>,
    user: Option<User>,
}

impl AuthSession {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            token: None,
            user: None,
        }
    }

    /// Reload a persisted session. An unreadable cached user is dropped.
    pub fn restore(store: SharedStore) -> Result<Self> {
        let mut session = Self::new(store);
        let guard = lock(&session.store)?;
        let token = guard.get(ACCESS_TOKEN_KEY)?;
        let user_blob = guard.get(USER_DATA_KEY)?;
        drop(guard);

        session.token = token.map(Zeroizing::new);
        if session.token.is_some() {
            session.user = match user_blob {
                Some(blob) => match serde_json::from_str(&blob) {
                    Ok(user) => Some(user),
                    Err(err) => {
                        log::warn!("ignoring unreadable cached user: {}", err);
                        None
                    }
                },
                None => None,
            };
        }
        Ok(session)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn login(&mut self, token: &str, user: User) -> Result<AuthEvent> {
        let user_blob = serde_json::to_string(&user).context("serialize user")?;
        {
            let mut guard = lock(&self.store)?;
            guard.set(ACCESS_TOKEN_KEY, token)?;
            guard.set(USER_DATA_KEY, &user_blob)?;
        }
        self.token = Some(Zeroizing::new(token.to_string()));
        log::info!("signed in as {}", user.username);
        let event = AuthEvent::LoggedIn {
            username: user.username.clone(),
        };
        self.user = Some(user);
        Ok(event)
    }

    pub fn logout(&mut self) -> Result<AuthEvent> {
        {
            let mut guard = lock(&self.store)?;
            guard.remove(ACCESS_TOKEN_KEY)?;
            guard.remove(USER_DATA_KEY)?;
        }
        // Zeroizing wipes the token on drop.
        self.token = None;
        if let Some(user) = self.user.take() {
            log::info!("signed out {}", user.username);
        }
        Ok(AuthEvent::LoggedOut)
    }

    /// Guard for operations that need a signed-in user.
    pub fn require_user(&self) -> Result<&User> {
        if !self.is_authenticated() {
            return Err(anyhow!("not signed in; run `perimeter_admin login` first"));
        }
        self.user
            .as_ref()
            .ok_or_else(|| anyhow!("session has no cached user; sign in again"))
    }
}
