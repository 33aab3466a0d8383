use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};

use super::error::{
    NetworkSnafu, PermissionDeniedSnafu, QuotaExceededSnafu, StoreError, StoreErrorKind,
    StoreResult,
};
use super::ids::MessageId;
use super::subscription::{
    FEED_SIGNAL_CAPACITY, FeedSignal, FeedSubscription, SnapshotSource, spawn_feed_forwarder,
};
use super::types::{
    FeedSnapshot, Message, NewMessage, OrderKey, keep_newest, next_created_at,
    unix_timestamp_millis,
};
use super::{BoxFuture, MessageStore};

/// In-process live collection.
///
/// Cloning shares the same collection, so several clients in one process see
/// each other's writes through their subscriptions.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    collection: String,
    snapshot_limit: Option<usize>,
    state: RwLock<MemoryState>,
    signals: broadcast::Sender<FeedSignal>,
}

#[derive(Default)]
struct MemoryState {
    messages: Vec<Message>,
    revision: u64,
    last_created_at: u64,
    pending_faults: VecDeque<StoreErrorKind>,
}

impl MemoryStore {
    pub fn new(collection: impl Into<String>) -> Self {
        Self::with_snapshot_limit(collection, None)
    }

    pub fn with_snapshot_limit(collection: impl Into<String>, snapshot_limit: Option<usize>) -> Self {
        let (signals, _) = broadcast::channel(FEED_SIGNAL_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                collection: collection.into(),
                snapshot_limit,
                state: RwLock::new(MemoryState::default()),
                signals,
            }),
        }
    }

    /// Number of live subscriptions still attached to this collection.
    pub fn subscriber_count(&self) -> usize {
        self.inner.signals.receiver_count()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.inner.state.read().await.messages.clone()
    }

    /// Makes the next append fail with `kind` instead of writing.
    pub async fn fail_next_append(&self, kind: StoreErrorKind) {
        self.inner.state.write().await.pending_faults.push_back(kind);
    }

    /// Breaks every open subscription, as a dropped backend channel would.
    pub fn break_subscriptions(&self, details: impl Into<String>) {
        let _ = self.inner.signals.send(FeedSignal::Disrupted {
            details: details.into(),
        });
    }
}

impl MessageStore for MemoryStore {
    fn collection(&self) -> &str {
        &self.inner.collection
    }

    fn subscribe_ordered(&self, order: OrderKey) -> StoreResult<FeedSubscription> {
        let signals = self.inner.signals.subscribe();
        spawn_feed_forwarder(self.inner.clone(), signals, order)
    }

    fn append<'a>(&'a self, input: NewMessage) -> BoxFuture<'a, StoreResult<Message>> {
        Box::pin(async move {
            let mut state = self.inner.state.write().await;
            if let Some(kind) = state.pending_faults.pop_front() {
                return Err(injected_fault(kind, &self.inner.collection));
            }

            let created_at = next_created_at(unix_timestamp_millis(), state.last_created_at);
            let message = Message {
                id: MessageId::new_v7(),
                text: input.text,
                author_id: input.author_id,
                author_name: input.author_name,
                avatar_url: input.avatar_url,
                created_at_unix_millis: created_at,
            };

            state.last_created_at = created_at;
            state.revision += 1;
            let revision = state.revision;
            let position = state
                .messages
                .partition_point(|existing| Message::feed_order(existing, &message).is_le());
            state.messages.insert(position, message.clone());
            drop(state);

            tracing::debug!(
                collection = %self.inner.collection,
                message_id = %message.id,
                revision,
                "appended message"
            );
            // Nobody listening is not an error; the next subscriber reads the full feed.
            let _ = self.inner.signals.send(FeedSignal::Appended { revision });

            Ok(message)
        })
    }
}

impl SnapshotSource for MemoryInner {
    fn load_snapshot(&self, _order: OrderKey) -> BoxFuture<'_, StoreResult<FeedSnapshot>> {
        Box::pin(async move {
            let state = self.state.read().await;
            let messages = keep_newest(state.messages.clone(), self.snapshot_limit);
            Ok(FeedSnapshot::new(state.revision, messages))
        })
    }
}

fn injected_fault(kind: StoreErrorKind, collection: &str) -> StoreError {
    match kind {
        StoreErrorKind::PermissionDenied => PermissionDeniedSnafu {
            stage: "memory-append-fault",
            collection: collection.to_string(),
        }
        .build(),
        StoreErrorKind::Quota => QuotaExceededSnafu {
            stage: "memory-append-fault",
            details: "injected quota fault".to_string(),
        }
        .build(),
        StoreErrorKind::Network | StoreErrorKind::Unavailable | StoreErrorKind::Internal => {
            NetworkSnafu {
                stage: "memory-append-fault",
                details: "injected network fault".to_string(),
            }
            .build()
        }
    }
}
