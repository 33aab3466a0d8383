use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

use super::ids::MessageId;

/// Collection used when the caller does not name one.
pub const DEFAULT_COLLECTION: &str = "messages";

/// Sort key for live feed queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderKey {
    #[default]
    CreatedAt,
}

impl OrderKey {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
        }
    }
}

/// One stored chat message. Immutable once the store hands it out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub avatar_url: String,
    /// Store-assigned, milliseconds since the Unix epoch.
    pub created_at_unix_millis: u64,
}

impl Message {
    /// Feed ordering: `created_at` ascending, id breaks ties.
    pub fn feed_order(left: &Message, right: &Message) -> Ordering {
        left.created_at_unix_millis
            .cmp(&right.created_at_unix_millis)
            .then_with(|| left.id.cmp(&right.id))
    }
}

/// Caller-supplied part of a message; id and timestamp come from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub text: String,
    pub author_id: String,
    pub author_name: Option<String>,
    pub avatar_url: String,
}

impl NewMessage {
    pub fn new(
        text: impl Into<String>,
        author_id: impl Into<String>,
        avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            author_id: author_id.into(),
            author_name: None,
            avatar_url: avatar_url.into(),
        }
    }

    pub fn with_author_name(mut self, author_name: impl Into<String>) -> Self {
        let author_name = author_name.into();
        self.author_name = if author_name.trim().is_empty() {
            None
        } else {
            Some(author_name)
        };
        self
    }
}

/// Ordered view of a collection at one store revision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedSnapshot {
    pub revision: u64,
    pub messages: Vec<Message>,
}

impl FeedSnapshot {
    pub fn new(revision: u64, mut messages: Vec<Message>) -> Self {
        messages.sort_by(Message::feed_order);
        Self { revision, messages }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Keeps only the newest `limit` messages of an already ordered list.
pub(crate) fn keep_newest(mut messages: Vec<Message>, limit: Option<usize>) -> Vec<Message> {
    if let Some(limit) = limit
        && messages.len() > limit
    {
        let excess = messages.len() - limit;
        messages.drain(..excess);
    }
    messages
}

/// Next store timestamp: wall clock, but never at or behind the previous write.
pub(crate) fn next_created_at(now_unix_millis: u64, last_assigned: u64) -> u64 {
    now_unix_millis.max(last_assigned.saturating_add(1))
}

pub(crate) fn unix_timestamp_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0_u64, |duration| duration.as_millis() as u64)
}
