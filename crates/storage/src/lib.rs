use std::future::Future;
use std::pin::Pin;

pub mod error;
pub mod ids;
pub mod memory;
pub mod sqlite;
pub mod subscription;
pub mod types;

pub use error::{StoreError, StoreErrorKind, StoreResult};
pub use ids::MessageId;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use subscription::FeedSubscription;
pub use types::{DEFAULT_COLLECTION, FeedSnapshot, Message, NewMessage, OrderKey};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Adapter over a real-time ordered document collection.
pub trait MessageStore: Send + Sync {
    fn collection(&self) -> &str;

    /// Opens a live query. The current contents arrive first, then one
    /// snapshot per change, until the returned handle is cancelled or dropped.
    fn subscribe_ordered(&self, order: OrderKey) -> StoreResult<FeedSubscription>;

    /// Writes one message. The store assigns `id` and `created_at`; the new
    /// message reaches subscribers asynchronously, including the caller's own.
    fn append<'a>(&'a self, input: NewMessage) -> BoxFuture<'a, StoreResult<Message>>;
}
