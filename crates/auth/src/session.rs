use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::IdentityBackend;
use super::error::AuthResult;

/// Identity of the signed-in user as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            avatar_url: avatar_url.into(),
        }
    }
}

/// Local mirror of the identity provider's auth state.
///
/// Only the provider's answers move the state: a failed sign-in leaves the
/// user signed out, a failed sign-out leaves them signed in.
pub struct SessionProvider {
    backend: Arc<dyn IdentityBackend>,
    state: watch::Sender<Option<Session>>,
}

impl SessionProvider {
    pub fn new(backend: Arc<dyn IdentityBackend>) -> Self {
        let (state, _) = watch::channel(None);
        Self { backend, state }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.state.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Observer handle that wakes on every session change.
    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch {
            receiver: self.state.subscribe(),
        }
    }

    pub async fn restore(&self) -> AuthResult<Option<Session>> {
        let restored = self.backend.restore().await?;
        if let Some(session) = &restored {
            tracing::info!(
                provider_id = self.backend.provider_id(),
                user_id = %session.user_id,
                "restored session"
            );
            self.state.send_replace(Some(session.clone()));
        }
        Ok(restored)
    }

    pub async fn sign_in(&self) -> AuthResult<Session> {
        let provider_id = self.backend.provider_id();
        tracing::debug!(provider_id, "starting interactive sign-in");

        match self.backend.sign_in_interactive().await {
            Ok(session) => {
                tracing::info!(provider_id, user_id = %session.user_id, "signed in");
                self.state.send_replace(Some(session.clone()));
                Ok(session)
            }
            Err(error) => {
                tracing::warn!(provider_id, stage = error.stage(), %error, "sign-in failed");
                Err(error)
            }
        }
    }

    pub async fn sign_out(&self) -> AuthResult<()> {
        let provider_id = self.backend.provider_id();

        match self.backend.sign_out().await {
            Ok(()) => {
                tracing::info!(provider_id, "signed out");
                self.state.send_replace(None);
                Ok(())
            }
            Err(error) => {
                tracing::warn!(provider_id, stage = error.stage(), %error, "sign-out failed");
                Err(error)
            }
        }
    }
}

/// Registration on session changes; dropping it unregisters.
pub struct SessionWatch {
    receiver: watch::Receiver<Option<Session>>,
}

impl SessionWatch {
    /// Waits for the next change. `None` once the provider is gone.
    pub async fn changed(&mut self) -> Option<Option<Session>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }
}
