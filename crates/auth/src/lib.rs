use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod local;
pub mod session;

pub use error::{AuthError, AuthErrorKind, AuthResult};
pub use local::{LOCAL_PROVIDER_ID, LocalIdentity};
pub use session::{Session, SessionProvider, SessionWatch};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Seam over an external identity service.
///
/// Implementations talk to the real provider; all session state they report is
/// mirrored locally by [`SessionProvider`].
pub trait IdentityBackend: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Runs the interactive sign-in flow (popup, browser hand-off, prompt).
    fn sign_in_interactive(&self) -> BoxFuture<'_, AuthResult<Session>>;

    fn sign_out(&self) -> BoxFuture<'_, AuthResult<()>>;

    /// Returns a session the provider kept from an earlier run, if any.
    fn restore(&self) -> BoxFuture<'_, AuthResult<Option<Session>>>;
}
