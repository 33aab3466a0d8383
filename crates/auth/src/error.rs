use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AuthError {
    #[snafu(display("sign-in with '{provider_id}' was cancelled"))]
    Cancelled {
        stage: &'static str,
        provider_id: String,
    },
    #[snafu(display("identity network failure on `{stage}`: {details}"))]
    Network {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("identity provider '{provider_id}' is unavailable: {details}"))]
    ProviderUnavailable {
        stage: &'static str,
        provider_id: String,
        details: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    Cancelled,
    Network,
    ProviderUnavailable,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::Cancelled { .. } => AuthErrorKind::Cancelled,
            Self::Network { .. } => AuthErrorKind::Network,
            Self::ProviderUnavailable { .. } => AuthErrorKind::ProviderUnavailable,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Cancelled { stage, .. }
            | Self::Network { stage, .. }
            | Self::ProviderUnavailable { stage, .. } => stage,
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
