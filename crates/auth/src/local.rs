use super::error::{AuthResult, ProviderUnavailableSnafu};
use super::session::Session;
use super::{BoxFuture, IdentityBackend};

pub const LOCAL_PROVIDER_ID: &str = "local";

/// Identity backend that signs in as a profile taken from configuration.
///
/// Stands in for a hosted provider when running against a local store.
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    profile: Option<Session>,
    auto_sign_in: bool,
}

impl LocalIdentity {
    pub fn new(profile: Option<Session>) -> Self {
        Self {
            profile: profile.filter(|profile| !profile.user_id.trim().is_empty()),
            auto_sign_in: false,
        }
    }

    /// Treat the profile as a session kept from a previous run.
    pub fn with_auto_sign_in(mut self, auto_sign_in: bool) -> Self {
        self.auto_sign_in = auto_sign_in;
        self
    }
}

impl IdentityBackend for LocalIdentity {
    fn provider_id(&self) -> &str {
        LOCAL_PROVIDER_ID
    }

    fn sign_in_interactive(&self) -> BoxFuture<'_, AuthResult<Session>> {
        Box::pin(async move {
            match &self.profile {
                Some(profile) => Ok(profile.clone()),
                None => ProviderUnavailableSnafu {
                    stage: "local-sign-in",
                    provider_id: LOCAL_PROVIDER_ID,
                    details: "no local profile is configured",
                }
                .fail(),
            }
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn restore(&self) -> BoxFuture<'_, AuthResult<Option<Session>>> {
        Box::pin(async move {
            if self.auto_sign_in {
                Ok(self.profile.clone())
            } else {
                Ok(None)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorKind;

    #[tokio::test]
    async fn missing_profile_reports_unavailable_provider() {
        let identity = LocalIdentity::new(Some(Session::new("  ", "Nobody", "")));

        let error = identity.sign_in_interactive().await.unwrap_err();

        assert_eq!(error.kind(), AuthErrorKind::ProviderUnavailable);
        assert_eq!(error.stage(), "local-sign-in");
    }

    #[tokio::test]
    async fn restore_only_when_auto_sign_in_is_enabled() {
        let profile = Session::new("u1", "Ada", "");
        let identity = LocalIdentity::new(Some(profile.clone()));
        assert_eq!(identity.restore().await.unwrap(), None);

        let identity = identity.with_auto_sign_in(true);
        assert_eq!(identity.restore().await.unwrap(), Some(profile));
    }
}
