use parlor_auth::{AuthError, AuthErrorKind};
use parlor_storage::{StoreError, StoreErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient, non-fatal message shown above the view until the next action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }

    pub fn send_failed(error: &StoreError) -> Self {
        let reason = match error.kind() {
            StoreErrorKind::PermissionDenied => "you are not allowed to post here",
            StoreErrorKind::Network => "the network is unreachable",
            StoreErrorKind::Quota => "the backend quota is exhausted",
            StoreErrorKind::Unavailable => "the message store is unavailable",
            StoreErrorKind::Internal => "the message store reported an internal error",
        };
        Self::error(format!(
            "Message not sent: {reason}. Your draft was kept; submit again to retry."
        ))
    }

    pub fn feed_interrupted(details: &str, retry_attempt: Option<u32>) -> Self {
        match retry_attempt {
            Some(attempt) => Self::error(format!(
                "Live feed interrupted ({details}). Reconnecting, attempt {attempt}."
            )),
            None => Self::error(format!(
                "Live feed lost ({details}). Use /reconnect to try again."
            )),
        }
    }

    pub fn auth_failed(action: &str, error: &AuthError) -> Self {
        match error.kind() {
            AuthErrorKind::Cancelled => Self::info(format!("{action} was cancelled.")),
            AuthErrorKind::Network => Self::error(format!(
                "{action} failed: the identity provider could not be reached."
            )),
            AuthErrorKind::ProviderUnavailable => Self::error(format!("{action} failed: {error}.")),
        }
    }
}
