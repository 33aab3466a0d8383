use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use snafu::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{FromRow, SqlitePool};
use tokio::sync::broadcast;

use super::error::{
    CreateSqliteDirectorySnafu, SqliteConnectOptionsSnafu, SqliteConnectSnafu, SqliteMigrateSnafu,
    SqlitePragmaSnafu, SqliteQuerySnafu, StoreError, StoreResult,
};
use super::ids::MessageId;
use super::subscription::{
    FEED_SIGNAL_CAPACITY, FeedSignal, FeedSubscription, SnapshotSource, spawn_feed_forwarder,
};
use super::types::{
    FeedSnapshot, Message, NewMessage, OrderKey, next_created_at, unix_timestamp_millis,
};
use super::{BoxFuture, MessageStore};

/// Collection persisted in a local SQLite file.
///
/// Live updates fan out to subscribers of this handle (and its clones); writes
/// made by other processes show up on the next snapshot reload.
#[derive(Clone)]
pub struct SqliteStore {
    inner: Arc<SqliteInner>,
}

struct SqliteInner {
    pool: SqlitePool,
    database_url: String,
    collection: String,
    snapshot_limit: Option<usize>,
    revision: AtomicU64,
    signals: broadcast::Sender<FeedSignal>,
}

impl SqliteStore {
    pub async fn open(database_location: &str, collection: impl Into<String>) -> StoreResult<Self> {
        Self::open_with_snapshot_limit(database_location, collection, None).await
    }

    pub async fn open_with_snapshot_limit(
        database_location: &str,
        collection: impl Into<String>,
        snapshot_limit: Option<usize>,
    ) -> StoreResult<Self> {
        ensure_database_directory(database_location)?;

        let database_url = normalize_database_url(database_location);
        let in_memory = database_url.contains(":memory:");
        let mut connect_options = SqliteConnectOptions::from_str(&database_url)
            .context(SqliteConnectOptionsSnafu {
                stage: "sqlite-open-parse-url",
                database_url: database_url.clone(),
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_millis(5_000));
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // One long-lived connection: an in-memory database only exists while it stays open.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .context(SqliteConnectSnafu {
                stage: "sqlite-open-connect",
                database_url: database_url.clone(),
            })?;

        sqlx::query("PRAGMA busy_timeout = 5000;")
            .execute(&pool)
            .await
            .context(SqlitePragmaSnafu {
                stage: "sqlite-open-pragma-busy-timeout",
                pragma: "busy_timeout",
            })?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context(SqliteMigrateSnafu {
                stage: "sqlite-open-migrate",
            })?;

        let collection = collection.into();
        let existing = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE collection = ?",
        )
        .bind(&collection)
        .fetch_one(&pool)
        .await
        .context(SqliteQuerySnafu {
            stage: "sqlite-open-count-messages",
        })?;

        tracing::info!(%database_url, %collection, existing, "opened sqlite message store");

        let (signals, _) = broadcast::channel(FEED_SIGNAL_CAPACITY);
        Ok(Self {
            inner: Arc::new(SqliteInner {
                pool,
                database_url,
                collection,
                snapshot_limit,
                revision: AtomicU64::new(i64_to_u64(existing, "sqlite-open-revision")?),
                signals,
            }),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.inner.pool
    }

    pub fn database_url(&self) -> &str {
        &self.inner.database_url
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.signals.receiver_count()
    }
}

impl MessageStore for SqliteStore {
    fn collection(&self) -> &str {
        &self.inner.collection
    }

    fn subscribe_ordered(&self, order: OrderKey) -> StoreResult<FeedSubscription> {
        let signals = self.inner.signals.subscribe();
        spawn_feed_forwarder(self.inner.clone(), signals, order)
    }

    fn append<'a>(&'a self, input: NewMessage) -> BoxFuture<'a, StoreResult<Message>> {
        Box::pin(async move {
            let inner = &self.inner;
            let mut tx = inner.pool.begin().await.context(SqliteQuerySnafu {
                stage: "message-append-begin",
            })?;

            let last_created_at = sqlx::query_scalar::<_, i64>(
                "SELECT COALESCE(MAX(created_at), 0) FROM messages WHERE collection = ?",
            )
            .bind(&inner.collection)
            .fetch_one(&mut *tx)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-append-last-created-at",
            })?;

            let created_at = next_created_at(
                unix_timestamp_millis(),
                i64_to_u64(last_created_at, "message-append-last-created-at")?,
            );
            let message_id = MessageId::new_v7();

            sqlx::query(
                "INSERT INTO messages (id, collection, text, author_id, author_name, avatar_url, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(message_id.to_string())
            .bind(&inner.collection)
            .bind(&input.text)
            .bind(&input.author_id)
            .bind(input.author_name.as_deref())
            .bind(&input.avatar_url)
            .bind(u64_to_i64(created_at, "message-append-created-at")?)
            .execute(&mut *tx)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-append-insert",
            })?;

            tx.commit().await.context(SqliteQuerySnafu {
                stage: "message-append-commit",
            })?;

            let revision = inner.revision.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(
                collection = %inner.collection,
                message_id = %message_id,
                revision,
                "appended message"
            );
            let _ = inner.signals.send(FeedSignal::Appended { revision });

            Ok(Message {
                id: message_id,
                text: input.text,
                author_id: input.author_id,
                author_name: input.author_name,
                avatar_url: input.avatar_url,
                created_at_unix_millis: created_at,
            })
        })
    }
}

impl SnapshotSource for SqliteInner {
    fn load_snapshot(&self, _order: OrderKey) -> BoxFuture<'_, StoreResult<FeedSnapshot>> {
        Box::pin(async move {
            // Read the revision first so a concurrent append can only make the rows newer.
            let revision = self.revision.load(Ordering::SeqCst);
            let limit = match self.snapshot_limit {
                Some(limit) => u64_to_i64(limit as u64, "message-snapshot-limit")?,
                None => -1,
            };

            let rows = sqlx::query_as::<_, MessageRow>(
                "SELECT id, text, author_id, author_name, avatar_url, created_at FROM (SELECT id, text, author_id, author_name, avatar_url, created_at FROM messages WHERE collection = ? ORDER BY created_at DESC, id DESC LIMIT ?) ORDER BY created_at ASC, id ASC",
            )
            .bind(&self.collection)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .context(SqliteQuerySnafu {
                stage: "message-snapshot-query",
            })?;

            let messages = rows
                .into_iter()
                .map(message_row_to_record)
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(FeedSnapshot::new(revision, messages))
        })
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: String,
    text: String,
    author_id: String,
    author_name: Option<String>,
    avatar_url: String,
    created_at: i64,
}

fn message_row_to_record(row: MessageRow) -> StoreResult<Message> {
    Ok(Message {
        id: MessageId::parse(&row.id)?,
        text: row.text,
        author_id: row.author_id,
        author_name: row.author_name,
        avatar_url: row.avatar_url,
        created_at_unix_millis: i64_to_u64(row.created_at, "message-row-created-at")?,
    })
}

fn i64_to_u64(value: i64, stage: &'static str) -> StoreResult<u64> {
    value
        .try_into()
        .map_err(|_| StoreError::InvariantViolation {
            stage,
            details: format!("negative sqlite integer '{value}' cannot map to u64"),
        })
}

fn u64_to_i64(value: u64, stage: &'static str) -> StoreResult<i64> {
    value
        .try_into()
        .map_err(|_| StoreError::InvariantViolation {
            stage,
            details: format!("u64 '{value}' cannot map to sqlite i64"),
        })
}

fn ensure_database_directory(database_location: &str) -> StoreResult<()> {
    if database_location.starts_with("sqlite:") || database_location == ":memory:" {
        return Ok(());
    }

    let path = Path::new(database_location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context(CreateSqliteDirectorySnafu {
            stage: "sqlite-open-create-directory",
            path: parent.display().to_string(),
        })?;
    }

    Ok(())
}

fn normalize_database_url(database_location: &str) -> String {
    if database_location.starts_with("sqlite:") {
        return database_location.to_string();
    }

    if database_location == ":memory:" {
        return "sqlite::memory:".to_string();
    }

    format!("sqlite://{database_location}")
}
