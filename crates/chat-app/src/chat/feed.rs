use std::future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parlor_auth::Session;
use parlor_storage::{
    FeedSnapshot, FeedSubscription, Message, MessageStore, NewMessage, OrderKey, StoreError,
    StoreResult,
};
use tokio::time::{Instant, sleep_until};

use super::compose::ComposeDraft;
use super::notice::Notice;
use super::retry::RetryPolicy;
use super::scroll_manager::{ScrollManager, ScrollPosition};

/// Lifecycle of the live feed as seen by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedStatus {
    Unsubscribed,
    /// Subscribed, waiting for the first snapshot.
    Connecting,
    Live,
    Reconnecting { attempt: u32 },
    /// Retries exhausted; only a manual reconnect restarts the feed.
    Failed,
}

/// Something the feed wants applied, tagged with the mount it belongs to.
#[derive(Debug)]
pub enum FeedEvent {
    Snapshot {
        generation: u64,
        /// `None` when the store ended the subscription.
        item: Option<StoreResult<FeedSnapshot>>,
    },
    RetryDue {
        generation: u64,
    },
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// No session: nothing was sent and nothing changed.
    SignedOut,
    Sent(Message),
    Failed(StoreError),
    /// Settled after an unmount; the draft and notices were left alone.
    Abandoned(StoreResult<Message>),
}

/// Owns the live subscription, the ordered message list and the compose flow.
///
/// States: unsubscribed, then subscribed from `mount` until `unmount`. Each
/// mount bumps the generation, and events from an older generation are
/// dropped, so nothing from a cancelled subscription reaches the view.
pub struct FeedController {
    store: Arc<dyn MessageStore>,
    retry: RetryPolicy,
    status: FeedStatus,
    subscription: Option<FeedSubscription>,
    retry_at: Option<Instant>,
    retry_attempt: u32,
    generation: u64,
    last_revision: Option<u64>,
    messages: Vec<Message>,
    draft: ComposeDraft,
    /// Bumped when the draft is dropped on unmount.
    draft_epoch: u64,
    send_epoch: Option<u64>,
    scroll: ScrollManager,
    notice: Option<Notice>,
}

impl FeedController {
    pub fn new(store: Arc<dyn MessageStore>, retry: RetryPolicy) -> Self {
        Self {
            store,
            retry,
            status: FeedStatus::Unsubscribed,
            subscription: None,
            retry_at: None,
            retry_attempt: 0,
            generation: 0,
            last_revision: None,
            messages: Vec::new(),
            draft: ComposeDraft::default(),
            draft_epoch: 0,
            send_epoch: None,
            scroll: ScrollManager::new(),
            notice: None,
        }
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub fn is_mounted(&self) -> bool {
        self.status != FeedStatus::Unsubscribed
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn draft(&self) -> &ComposeDraft {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft.set(text);
    }

    pub fn notice(&self) -> Option<&Notice> {
        self.notice.as_ref()
    }

    pub fn dismiss_notice(&mut self) {
        self.notice = None;
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.scroll.scroll_up(rows, self.messages.len());
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.scroll.scroll_down(rows);
    }

    pub fn take_scroll_position(&mut self) -> ScrollPosition {
        self.scroll.take_position()
    }

    /// Opens the live subscription. Returns `false` if already mounted.
    pub fn mount(&mut self) -> bool {
        if self.is_mounted() {
            return false;
        }

        self.generation += 1;
        self.messages.clear();
        self.last_revision = None;
        self.retry_attempt = 0;
        self.retry_at = None;
        self.scroll.reset();
        self.status = FeedStatus::Connecting;

        tracing::info!(
            generation = self.generation,
            collection = self.store.collection(),
            "mounting feed"
        );
        self.open_subscription();
        true
    }

    /// Cancels the subscription and drops all feed state.
    ///
    /// Returns `true` if a live subscription handle was cancelled.
    pub fn unmount(&mut self) -> bool {
        if !self.is_mounted() {
            return false;
        }

        let cancelled = match self.subscription.take() {
            Some(mut subscription) => {
                subscription.cancel();
                true
            }
            None => false,
        };

        self.generation += 1;
        self.status = FeedStatus::Unsubscribed;
        self.retry_at = None;
        self.retry_attempt = 0;
        self.last_revision = None;
        self.messages.clear();
        self.draft.clear();
        self.draft_epoch += 1;
        self.notice = None;

        tracing::info!(generation = self.generation, cancelled, "unmounted feed");
        cancelled
    }

    /// Replaces the subscription right away, keeping messages and draft.
    pub fn reconnect(&mut self) {
        if !self.is_mounted() {
            self.mount();
            return;
        }

        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.generation += 1;
        self.retry_attempt = 0;
        self.retry_at = None;
        self.status = FeedStatus::Connecting;
        self.notice = None;

        tracing::info!(generation = self.generation, "reconnecting feed on request");
        self.open_subscription();
    }

    /// Waits for the next subscription item or retry deadline.
    ///
    /// Cancel-safe: dropping the future loses nothing, so it can sit in a
    /// `select!` next to user input.
    pub async fn next_event(&mut self) -> FeedEvent {
        let generation = self.generation;

        if let Some(subscription) = self.subscription.as_mut() {
            let item = subscription.recv().await;
            return FeedEvent::Snapshot { generation, item };
        }

        if let Some(retry_at) = self.retry_at {
            sleep_until(retry_at).await;
            return FeedEvent::RetryDue { generation };
        }

        future::pending().await
    }

    /// Applies one event. Returns whether the view needs a re-render.
    pub fn apply(&mut self, event: FeedEvent) -> bool {
        match event {
            FeedEvent::Snapshot { generation, .. } | FeedEvent::RetryDue { generation }
                if generation != self.generation || !self.is_mounted() =>
            {
                tracing::debug!(
                    generation,
                    current_generation = self.generation,
                    "discarding feed event from a previous mount"
                );
                false
            }
            FeedEvent::Snapshot {
                item: Some(Ok(snapshot)),
                ..
            } => self.apply_snapshot(snapshot),
            FeedEvent::Snapshot {
                item: Some(Err(error)),
                ..
            } => {
                self.handle_broken_subscription(error.to_string());
                true
            }
            FeedEvent::Snapshot { item: None, .. } => {
                self.handle_broken_subscription("the store closed the subscription".to_string());
                true
            }
            FeedEvent::RetryDue { .. } => {
                self.retry_at = None;
                tracing::info!(attempt = self.retry_attempt, "resubscribing to feed");
                self.open_subscription();
                true
            }
        }
    }

    /// Starts a send of the current draft.
    ///
    /// Without a session nothing happens and `None` comes back. The returned
    /// future performs the append; hand its result to [`Self::finish_submit`].
    pub fn begin_submit(
        &mut self,
        session: Option<&Session>,
    ) -> Option<BoxFuture<'static, StoreResult<Message>>> {
        let Some(session) = session else {
            tracing::debug!("submit ignored while signed out");
            return None;
        };

        let input = NewMessage::new(self.draft.text(), &session.user_id, &session.avatar_url)
            .with_author_name(&session.display_name);
        let store = self.store.clone();
        self.send_epoch = Some(self.draft_epoch);
        tracing::debug!(author_id = %session.user_id, len = input.text.len(), "sending message");

        Some(async move { store.append(input).await }.boxed())
    }

    pub fn finish_submit(&mut self, result: StoreResult<Message>) -> SubmitOutcome {
        if self.send_epoch.take() != Some(self.draft_epoch) {
            tracing::debug!(
                sent = result.is_ok(),
                "send settled after the feed was unmounted, keeping current draft"
            );
            return SubmitOutcome::Abandoned(result);
        }

        match result {
            Ok(message) => {
                tracing::info!(message_id = %message.id, "message sent");
                self.draft.clear();
                self.scroll.request_scroll_to_latest();
                SubmitOutcome::Sent(message)
            }
            Err(error) => {
                tracing::warn!(stage = error.stage(), %error, "message send failed");
                self.notice = Some(Notice::send_failed(&error));
                SubmitOutcome::Failed(error)
            }
        }
    }

    /// Guard, append, then settle the draft in one step.
    pub async fn submit(&mut self, session: Option<&Session>) -> SubmitOutcome {
        match self.begin_submit(session) {
            Some(send) => {
                let result = send.await;
                self.finish_submit(result)
            }
            None => SubmitOutcome::SignedOut,
        }
    }

    fn open_subscription(&mut self) {
        match self.store.subscribe_ordered(OrderKey::CreatedAt) {
            Ok(subscription) => {
                self.subscription = Some(subscription);
            }
            Err(error) => {
                tracing::warn!(stage = error.stage(), %error, "failed to open feed subscription");
                self.handle_broken_subscription(error.to_string());
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: FeedSnapshot) -> bool {
        if let Some(last_revision) = self.last_revision
            && snapshot.revision < last_revision
        {
            tracing::debug!(
                revision = snapshot.revision,
                last_revision,
                "discarding out-of-date snapshot"
            );
            return false;
        }

        if self.retry_attempt > 0 {
            tracing::info!(attempts = self.retry_attempt, "feed subscription recovered");
            self.notice = Some(Notice::info("Live feed reconnected."));
        }

        let newest_id = self.messages.last().map(|message| message.id);
        let has_new_tail = snapshot
            .messages
            .last()
            .is_some_and(|newest| Some(newest.id) != newest_id);
        self.last_revision = Some(snapshot.revision);
        self.messages = snapshot.messages;
        self.retry_attempt = 0;
        self.status = FeedStatus::Live;

        if has_new_tail {
            self.scroll.request_scroll_to_latest_if_following();
        }

        tracing::trace!(
            revision = snapshot.revision,
            messages = self.messages.len(),
            "applied feed snapshot"
        );
        true
    }

    fn handle_broken_subscription(&mut self, details: String) {
        self.subscription = None;
        self.retry_attempt += 1;

        match self.retry.delay_for(self.retry_attempt) {
            Some(delay) => {
                tracing::warn!(
                    attempt = self.retry_attempt,
                    delay_ms = delay.as_millis() as u64,
                    %details,
                    "feed subscription broken, scheduling resubscribe"
                );
                self.status = FeedStatus::Reconnecting {
                    attempt: self.retry_attempt,
                };
                self.retry_at = Some(Instant::now() + delay);
                self.notice = Some(Notice::feed_interrupted(&details, Some(self.retry_attempt)));
            }
            None => {
                tracing::error!(
                    attempts = self.retry_attempt - 1,
                    %details,
                    "feed subscription failed, giving up"
                );
                self.status = FeedStatus::Failed;
                self.retry_at = None;
                self.notice = Some(Notice::feed_interrupted(&details, None));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parlor_storage::{BoxFuture as StoreFuture, MemoryStore, MessageId, StoreErrorKind};

    use super::*;
    use crate::chat::NoticeLevel;

    /// Memory store that records every call the controller makes.
    struct RecordingStore {
        inner: MemoryStore,
        appends: Mutex<Vec<NewMessage>>,
        subscribes: AtomicUsize,
    }

    impl RecordingStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryStore::new("messages"),
                appends: Mutex::new(Vec::new()),
                subscribes: AtomicUsize::new(0),
            })
        }

        fn appends(&self) -> Vec<NewMessage> {
            self.appends.lock().unwrap().clone()
        }
    }

    impl MessageStore for RecordingStore {
        fn collection(&self) -> &str {
            self.inner.collection()
        }

        fn subscribe_ordered(&self, order: OrderKey) -> StoreResult<FeedSubscription> {
            self.subscribes.fetch_add(1, Ordering::SeqCst);
            self.inner.subscribe_ordered(order)
        }

        fn append<'a>(&'a self, input: NewMessage) -> StoreFuture<'a, StoreResult<Message>> {
            self.appends.lock().unwrap().push(input.clone());
            self.inner.append(input)
        }
    }

    fn session(user_id: &str) -> Session {
        Session::new(user_id, format!("User {user_id}"), format!("https://avatars/{user_id}.png"))
    }

    fn controller(store: &Arc<RecordingStore>) -> FeedController {
        FeedController::new(store.clone(), RetryPolicy::default())
    }

    async fn pump(feed: &mut FeedController) -> bool {
        let event = tokio::time::timeout(Duration::from_secs(2), feed.next_event())
            .await
            .expect("feed event should arrive");
        feed.apply(event)
    }

    #[tokio::test]
    async fn submit_appends_draft_as_session_user_and_clears_it() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        feed.set_draft("hi");

        let outcome = feed.submit(Some(&session("u1"))).await;

        assert!(matches!(outcome, SubmitOutcome::Sent(ref message) if message.text == "hi"));
        let appends = store.appends();
        assert_eq!(appends.len(), 1);
        assert_eq!(appends[0].text, "hi");
        assert_eq!(appends[0].author_id, "u1");
        assert_eq!(appends[0].avatar_url, "https://avatars/u1.png");
        assert!(feed.draft().is_empty());
        assert!(feed.take_scroll_position().snap_to_latest);
    }

    #[tokio::test]
    async fn submit_without_session_is_a_no_op() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        feed.set_draft("hello?");

        let outcome = feed.submit(None).await;

        assert!(matches!(outcome, SubmitOutcome::SignedOut));
        assert!(store.appends().is_empty());
        assert_eq!(feed.draft().text(), "hello?");
        assert!(feed.notice().is_none());
        assert!(!feed.take_scroll_position().snap_to_latest);
    }

    #[tokio::test]
    async fn failed_submit_keeps_draft_and_surfaces_notice() {
        let store = RecordingStore::new();
        store.inner.fail_next_append(StoreErrorKind::Network).await;
        let mut feed = controller(&store);
        feed.set_draft("retry me");

        let outcome = feed.submit(Some(&session("u1"))).await;

        assert!(matches!(outcome, SubmitOutcome::Failed(ref error) if error.kind() == StoreErrorKind::Network));
        assert_eq!(feed.draft().text(), "retry me");
        assert_eq!(feed.notice().map(|notice| notice.level), Some(NoticeLevel::Error));

        // No automatic retry: exactly one append until the user submits again.
        assert_eq!(store.appends().len(), 1);
        assert!(matches!(
            feed.submit(Some(&session("u1"))).await,
            SubmitOutcome::Sent(_)
        ));
        assert_eq!(store.appends().len(), 2);
        assert!(feed.draft().is_empty());
    }

    #[tokio::test]
    async fn empty_draft_is_still_sent() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);

        let outcome = feed.submit(Some(&session("u1"))).await;

        assert!(matches!(outcome, SubmitOutcome::Sent(ref message) if message.text.is_empty()));
    }

    #[tokio::test]
    async fn mounted_feed_follows_store_snapshots() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        assert_eq!(feed.status(), FeedStatus::Unsubscribed);

        assert!(feed.mount());
        assert!(!feed.mount());
        assert_eq!(feed.status(), FeedStatus::Connecting);
        assert!(pump(&mut feed).await);
        assert_eq!(feed.status(), FeedStatus::Live);
        assert!(feed.messages().is_empty());

        store
            .inner
            .append(NewMessage::new("from elsewhere", "u2", ""))
            .await
            .unwrap();
        assert!(pump(&mut feed).await);

        assert_eq!(feed.messages().len(), 1);
        assert_eq!(feed.messages()[0].author_id, "u2");
        assert_eq!(store.subscribes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn own_send_arrives_through_the_subscription() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        feed.mount();
        pump(&mut feed).await;

        feed.set_draft("mine");
        feed.submit(Some(&session("u1"))).await;
        assert!(feed.messages().is_empty());

        pump(&mut feed).await;
        assert_eq!(feed.messages()[0].text, "mine");
    }

    #[tokio::test]
    async fn unmount_cancels_the_one_subscription_and_ignores_late_snapshots() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        feed.mount();
        pump(&mut feed).await;

        store
            .inner
            .append(NewMessage::new("late", "u2", ""))
            .await
            .unwrap();
        let late = tokio::time::timeout(Duration::from_secs(2), feed.next_event())
            .await
            .unwrap();

        assert!(feed.unmount());
        assert!(!feed.unmount());
        assert!(!feed.apply(late));
        assert!(feed.messages().is_empty());
        assert_eq!(feed.status(), FeedStatus::Unsubscribed);

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.inner.subscriber_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("subscription should be released");
    }

    #[tokio::test]
    async fn older_revision_is_not_applied() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        feed.mount();
        let message = Message {
            id: MessageId::new_v7(),
            text: "kept".to_string(),
            author_id: "u1".to_string(),
            author_name: None,
            avatar_url: String::new(),
            created_at_unix_millis: 10,
        };

        let generation = feed.generation();
        assert!(feed.apply(FeedEvent::Snapshot {
            generation,
            item: Some(Ok(FeedSnapshot::new(5, vec![message]))),
        }));
        assert!(!feed.apply(FeedEvent::Snapshot {
            generation,
            item: Some(Ok(FeedSnapshot::new(4, Vec::new()))),
        }));
        assert_eq!(feed.messages()[0].text, "kept");
    }

    #[tokio::test(start_paused = true)]
    async fn broken_subscription_resubscribes_with_backoff() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        feed.mount();
        pump(&mut feed).await;

        store.inner.break_subscriptions("backend restarted");
        assert!(pump(&mut feed).await);
        assert_eq!(feed.status(), FeedStatus::Reconnecting { attempt: 1 });
        assert_eq!(feed.notice().map(|notice| notice.level), Some(NoticeLevel::Error));

        // Retry timer fires, a new subscription opens, then its first snapshot lands.
        assert!(pump(&mut feed).await);
        assert_eq!(store.subscribes.load(Ordering::SeqCst), 2);
        assert!(pump(&mut feed).await);
        assert_eq!(feed.status(), FeedStatus::Live);
        assert_eq!(feed.notice().map(|notice| notice.level), Some(NoticeLevel::Info));
    }

    #[tokio::test]
    async fn exhausted_retries_leave_feed_failed_until_reconnect() {
        let store = RecordingStore::new();
        let mut feed = FeedController::new(store.clone(), RetryPolicy::disabled());
        feed.mount();
        pump(&mut feed).await;

        store.inner.break_subscriptions("gone");
        pump(&mut feed).await;
        assert_eq!(feed.status(), FeedStatus::Failed);

        feed.reconnect();
        assert_eq!(feed.status(), FeedStatus::Connecting);
        pump(&mut feed).await;
        assert_eq!(feed.status(), FeedStatus::Live);
    }

    #[tokio::test]
    async fn unmount_drops_draft_and_messages() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        feed.mount();
        feed.set_draft("half typed");

        feed.unmount();

        assert!(feed.draft().is_empty());
        assert!(feed.notice().is_none());
    }

    #[tokio::test]
    async fn send_settling_after_unmount_leaves_next_draft_alone() {
        let store = RecordingStore::new();
        let mut feed = controller(&store);
        feed.mount();
        feed.set_draft("from the first user");
        let send = feed.begin_submit(Some(&session("u1"))).unwrap();

        feed.unmount();
        feed.mount();
        feed.set_draft("from the second user");
        let outcome = feed.finish_submit(send.await);

        assert!(matches!(outcome, SubmitOutcome::Abandoned(Ok(_))));
        assert_eq!(feed.draft().text(), "from the second user");
        assert!(feed.notice().is_none());
        assert_eq!(store.appends().len(), 1);
    }

    #[tokio::test]
    async fn new_message_in_a_full_window_scrolls_to_latest() {
        let store = Arc::new(RecordingStore {
            inner: MemoryStore::with_snapshot_limit("messages", Some(2)),
            appends: Mutex::new(Vec::new()),
            subscribes: AtomicUsize::new(0),
        });
        for text in ["one", "two"] {
            store.inner.append(NewMessage::new(text, "u2", "")).await.unwrap();
        }
        let mut feed = controller(&store);
        feed.mount();
        pump(&mut feed).await;
        feed.take_scroll_position();

        store.inner.append(NewMessage::new("three", "u2", "")).await.unwrap();
        pump(&mut feed).await;

        assert_eq!(feed.messages().len(), 2);
        assert_eq!(feed.messages()[1].text, "three");
        assert!(feed.take_scroll_position().snap_to_latest);
    }
}
