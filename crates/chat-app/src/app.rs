use std::future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parlor_auth::{AuthResult, Session, SessionProvider, SessionWatch};
use parlor_storage::{Message, MessageStore, StoreResult};

use crate::chat::{
    AppView, FeedController, FeedEvent, FeedStatus, Notice, RetryPolicy, SubmitOutcome, ViewInput,
    render_app,
};

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    SignIn,
    SignOut,
    EditDraft(String),
    Submit,
    Reconnect,
    ScrollUp(usize),
    ScrollDown(usize),
    DismissNotice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    SignIn,
    SignOut,
    Restore,
}

impl AuthAction {
    fn label(&self) -> &'static str {
        match self {
            Self::SignIn => "Sign-in",
            Self::SignOut => "Sign-out",
            Self::Restore => "Restoring the session",
        }
    }
}

#[derive(Debug)]
pub struct AuthOutcome {
    pub action: AuthAction,
    pub result: AuthResult<()>,
}

/// Something that happened outside the user's input.
#[derive(Debug)]
pub enum AppEvent {
    SessionChanged(Option<Session>),
    SessionClosed,
    Feed(FeedEvent),
    SendFinished(StoreResult<Message>),
    AuthFinished(AuthOutcome),
}

/// Wires the session provider to the feed controller and the view.
///
/// One instance is one client. Both collaborators are injected; nothing here
/// reaches for process-wide state.
pub struct ChatApp {
    sessions: Arc<SessionProvider>,
    session_watch: Option<SessionWatch>,
    session: Option<Session>,
    feed: FeedController,
    pending_send: Option<BoxFuture<'static, StoreResult<Message>>>,
    pending_auth: Option<BoxFuture<'static, AuthOutcome>>,
    notice: Option<Notice>,
}

impl ChatApp {
    pub fn new(
        sessions: Arc<SessionProvider>,
        store: Arc<dyn MessageStore>,
        retry: RetryPolicy,
    ) -> Self {
        let session_watch = sessions.subscribe();
        Self {
            sessions,
            session_watch: Some(session_watch),
            session: None,
            feed: FeedController::new(store, retry),
            pending_send: None,
            pending_auth: None,
            notice: None,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn feed(&self) -> &FeedController {
        &self.feed
    }

    pub fn feed_status(&self) -> FeedStatus {
        self.feed.status()
    }

    /// An auth call or a send is still running.
    pub fn has_pending_work(&self) -> bool {
        self.pending_send.is_some() || self.pending_auth.is_some()
    }

    /// Restores a kept session, if the provider has one, and mounts the feed.
    pub async fn start(&mut self) {
        if let Err(error) = self.sessions.restore().await {
            tracing::warn!(stage = error.stage(), %error, "session restore failed");
            self.notice = Some(Notice::auth_failed(AuthAction::Restore.label(), &error));
        }
        let current = self.sessions.current_session();
        self.apply_session(current);
    }

    /// Waits for the next outside event. Cancel-safe.
    pub async fn next_event(&mut self) -> AppEvent {
        tokio::select! {
            change = watch_session(&mut self.session_watch) => match change {
                Some(session) => AppEvent::SessionChanged(session),
                None => AppEvent::SessionClosed,
            },
            event = self.feed.next_event() => AppEvent::Feed(event),
            result = settle(&mut self.pending_send) => AppEvent::SendFinished(result),
            outcome = settle(&mut self.pending_auth) => AppEvent::AuthFinished(outcome),
        }
    }

    /// Returns whether the view needs a re-render.
    pub fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::SessionChanged(session) => self.apply_session(session),
            AppEvent::SessionClosed => {
                tracing::warn!("session provider closed, no further auth changes");
                self.session_watch = None;
                false
            }
            AppEvent::Feed(event) => self.feed.apply(event),
            AppEvent::SendFinished(result) => {
                if let SubmitOutcome::Failed(error) = self.feed.finish_submit(result) {
                    tracing::debug!(kind = ?error.kind(), "send failure shown to user");
                }
                true
            }
            AppEvent::AuthFinished(AuthOutcome { action, result }) => {
                if let Err(error) = result {
                    self.notice = Some(Notice::auth_failed(action.label(), &error));
                }
                // The watch may not have fired yet; input resumes after this.
                let current = self.sessions.current_session();
                self.apply_session(current);
                true
            }
        }
    }

    /// Returns whether the view needs a re-render.
    pub fn handle_intent(&mut self, intent: Intent) -> bool {
        match intent {
            Intent::SignIn => self.start_auth(AuthAction::SignIn),
            Intent::SignOut => self.start_auth(AuthAction::SignOut),
            Intent::EditDraft(text) => {
                self.clear_notices();
                self.feed.set_draft(text);
                true
            }
            Intent::Submit => self.submit(),
            Intent::Reconnect => {
                if self.session.is_none() {
                    return false;
                }
                self.clear_notices();
                self.feed.reconnect();
                true
            }
            Intent::ScrollUp(rows) => {
                self.feed.scroll_up(rows);
                true
            }
            Intent::ScrollDown(rows) => {
                self.feed.scroll_down(rows);
                true
            }
            Intent::DismissNotice => {
                self.clear_notices();
                true
            }
        }
    }

    pub fn render(&mut self) -> AppView {
        let scroll = self.feed.take_scroll_position();
        let notice = self.notice.as_ref().or(self.feed.notice());
        let input = ViewInput {
            session: self.session.as_ref(),
            messages: self.feed.messages(),
            draft: self.feed.draft(),
            notice,
            feed_status: self.feed.status(),
            scroll,
        };
        render_app(&input)
    }

    /// Releases the feed subscription.
    pub fn shutdown(&mut self) {
        if self.pending_send.take().is_some() {
            tracing::warn!("dropping a send that had not finished");
        }
        self.pending_auth = None;
        self.feed.unmount();
    }

    fn submit(&mut self) -> bool {
        if self.pending_send.is_some() {
            self.notice = Some(Notice::info("Still sending the previous message."));
            return true;
        }

        match self.feed.begin_submit(self.session.as_ref()) {
            Some(send) => {
                self.pending_send = Some(send);
                true
            }
            None => false,
        }
    }

    fn start_auth(&mut self, action: AuthAction) -> bool {
        if self.pending_auth.is_some() {
            self.notice = Some(Notice::info("Waiting for the identity provider."));
            return true;
        }

        let signed_in = self.session.is_some();
        let sessions = self.sessions.clone();
        let pending = match action {
            AuthAction::SignIn if !signed_in => async move {
                AuthOutcome {
                    action,
                    result: sessions.sign_in().await.map(|_| ()),
                }
            }
            .boxed(),
            AuthAction::SignOut if signed_in => async move {
                AuthOutcome {
                    action,
                    result: sessions.sign_out().await,
                }
            }
            .boxed(),
            _ => return false,
        };

        self.clear_notices();
        self.pending_auth = Some(pending);
        true
    }

    fn apply_session(&mut self, session: Option<Session>) -> bool {
        if session == self.session {
            return false;
        }

        let switched_user = matches!(
            (&self.session, &session),
            (Some(previous), Some(next)) if previous.user_id != next.user_id
        );
        self.session = session;

        match &self.session {
            Some(session) => {
                tracing::info!(user_id = %session.user_id, "session active");
                if switched_user {
                    self.feed.unmount();
                }
                self.feed.mount();
            }
            None => {
                tracing::info!("session cleared");
                self.feed.unmount();
            }
        }
        true
    }

    fn clear_notices(&mut self) {
        self.notice = None;
        self.feed.dismiss_notice();
    }
}

async fn watch_session(watch: &mut Option<SessionWatch>) -> Option<Option<Session>> {
    match watch.as_mut() {
        Some(watch) => watch.changed().await,
        None => future::pending().await,
    }
}

/// Drives an in-flight future stored in `slot`, emptying the slot once done.
async fn settle<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    let Some(pending) = slot.as_mut() else {
        return future::pending().await;
    };
    let output = pending.await;
    *slot = None;
    output
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parlor_auth::LocalIdentity;
    use parlor_storage::{MemoryStore, NewMessage, StoreErrorKind};

    use super::*;
    use crate::chat::{BodyView, MessageStyle, NoticeLevel};

    fn app_with(identity: LocalIdentity, store: &MemoryStore) -> ChatApp {
        let sessions = Arc::new(SessionProvider::new(Arc::new(identity)));
        ChatApp::new(sessions, Arc::new(store.clone()), RetryPolicy::default())
    }

    fn ada() -> Session {
        Session::new("u1", "Ada", "https://avatars/u1.png")
    }

    async fn drive_until(app: &mut ChatApp, done: impl Fn(&ChatApp) -> bool) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !done(app) {
                let event = app.next_event().await;
                app.handle_event(event);
            }
        })
        .await
        .expect("app should reach the expected state");
    }

    #[tokio::test]
    async fn start_restores_kept_session_and_goes_live() {
        let store = MemoryStore::new("messages");
        let mut app = app_with(LocalIdentity::new(Some(ada())).with_auto_sign_in(true), &store);

        app.start().await;
        assert_eq!(app.session().map(|s| s.user_id.as_str()), Some("u1"));

        drive_until(&mut app, |app| app.feed_status() == FeedStatus::Live).await;
        assert!(matches!(app.render().body, BodyView::ChatRoom(_)));
    }

    #[tokio::test]
    async fn sign_in_then_send_shows_own_message() {
        let store = MemoryStore::new("messages");
        let mut app = app_with(LocalIdentity::new(Some(ada())), &store);
        app.start().await;
        assert!(matches!(app.render().body, BodyView::SignIn(_)));

        assert!(app.handle_intent(Intent::SignIn));
        drive_until(&mut app, |app| app.feed_status() == FeedStatus::Live).await;

        app.handle_intent(Intent::EditDraft("hello".to_string()));
        assert!(app.handle_intent(Intent::Submit));
        drive_until(&mut app, |app| app.feed().messages().len() == 1).await;

        assert!(app.feed().draft().is_empty());
        let BodyView::ChatRoom(room) = app.render().body else {
            panic!("expected chat room");
        };
        assert_eq!(room.messages[0].text, "hello");
        assert_eq!(room.messages[0].author_label, "Ada");
        assert_eq!(room.messages[0].style, MessageStyle::Own);
    }

    #[tokio::test]
    async fn submit_while_signed_out_changes_nothing() {
        let store = MemoryStore::new("messages");
        let mut app = app_with(LocalIdentity::new(Some(ada())), &store);
        app.start().await;
        app.handle_intent(Intent::EditDraft("nobody home".to_string()));

        assert!(!app.handle_intent(Intent::Submit));
        assert!(!app.has_pending_work());
        assert!(store.messages().await.is_empty());
    }

    #[tokio::test]
    async fn sign_out_releases_the_feed_subscription() {
        let store = MemoryStore::new("messages");
        let mut app = app_with(LocalIdentity::new(Some(ada())).with_auto_sign_in(true), &store);
        app.start().await;
        drive_until(&mut app, |app| app.feed_status() == FeedStatus::Live).await;
        app.handle_intent(Intent::EditDraft("unsent".to_string()));

        assert!(app.handle_intent(Intent::SignOut));
        drive_until(&mut app, |app| app.session().is_none()).await;

        assert_eq!(app.feed_status(), FeedStatus::Unsubscribed);
        assert!(app.feed().draft().is_empty());
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscription should be released");
    }

    #[tokio::test]
    async fn failed_sign_in_leaves_user_signed_out_with_notice() {
        let store = MemoryStore::new("messages");
        let mut app = app_with(LocalIdentity::new(None), &store);
        app.start().await;

        app.handle_intent(Intent::SignIn);
        drive_until(&mut app, |app| !app.has_pending_work()).await;

        let view = app.render();
        assert!(matches!(view.body, BodyView::SignIn(_)));
        assert_eq!(view.notice.map(|notice| notice.level), Some(NoticeLevel::Error));
    }

    #[tokio::test]
    async fn failed_send_keeps_draft_and_can_be_resubmitted() {
        let store = MemoryStore::new("messages");
        let mut app = app_with(LocalIdentity::new(Some(ada())).with_auto_sign_in(true), &store);
        app.start().await;
        store.fail_next_append(StoreErrorKind::Quota).await;

        app.handle_intent(Intent::EditDraft("try again".to_string()));
        app.handle_intent(Intent::Submit);
        drive_until(&mut app, |app| !app.has_pending_work()).await;
        assert_eq!(app.feed().draft().text(), "try again");
        assert_eq!(
            app.render().notice.map(|notice| notice.level),
            Some(NoticeLevel::Error)
        );

        app.handle_intent(Intent::Submit);
        drive_until(&mut app, |app| !app.has_pending_work()).await;
        assert!(app.feed().draft().is_empty());
        assert_eq!(store.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn other_clients_messages_render_as_other() {
        let store = MemoryStore::new("messages");
        let mut app = app_with(LocalIdentity::new(Some(ada())).with_auto_sign_in(true), &store);
        app.start().await;
        drive_until(&mut app, |app| app.feed_status() == FeedStatus::Live).await;

        store
            .append(NewMessage::new("hi from bob", "u2", "").with_author_name("Bob"))
            .await
            .unwrap();
        drive_until(&mut app, |app| app.feed().messages().len() == 1).await;

        let BodyView::ChatRoom(room) = app.render().body else {
            panic!("expected chat room");
        };
        assert_eq!(room.messages[0].style, MessageStyle::Other);
        assert!(room.scroll.snap_to_latest);
    }
}
