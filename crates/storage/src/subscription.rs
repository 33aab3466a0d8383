use std::sync::Arc;

use snafu::ResultExt;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::error::{NoRuntimeSnafu, StoreResult, SubscriptionClosedSnafu};
use super::types::{FeedSnapshot, OrderKey};
use super::BoxFuture;

/// Capacity of the per-store change fan-out. Slow subscribers that fall
/// behind re-read the whole feed instead of replaying missed signals.
pub(crate) const FEED_SIGNAL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FeedSignal {
    Appended { revision: u64 },
    Disrupted { details: String },
}

pub(crate) trait SnapshotSource: Send + Sync + 'static {
    fn load_snapshot(&self, order: OrderKey) -> BoxFuture<'_, StoreResult<FeedSnapshot>>;
}

/// Live handle on an ordered feed query.
///
/// Items arrive in the order the store emits them. An `Err` item means the
/// subscription is broken and no further items follow; subscribe again to
/// restart. Dropping the handle cancels the underlying forwarder.
#[derive(Debug)]
pub struct FeedSubscription {
    snapshots: mpsc::UnboundedReceiver<StoreResult<FeedSnapshot>>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl FeedSubscription {
    pub(crate) fn new(
        snapshots: mpsc::UnboundedReceiver<StoreResult<FeedSnapshot>>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            snapshots,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<StoreResult<FeedSnapshot>> {
        self.snapshots.recv().await
    }

    /// Stops the forwarder. Returns `false` if it was already cancelled or gone.
    pub fn cancel(&mut self) -> bool {
        self.snapshots.close();
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Starts a forwarder that pushes a snapshot now and after every change signal.
pub(crate) fn spawn_feed_forwarder<S>(
    source: Arc<S>,
    signals: broadcast::Receiver<FeedSignal>,
    order: OrderKey,
) -> StoreResult<FeedSubscription>
where
    S: SnapshotSource,
{
    let runtime = Handle::try_current().context(NoRuntimeSnafu {
        stage: "feed-subscribe-runtime",
    })?;
    let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();

    runtime.spawn(forward_snapshots(source, signals, order, snapshot_tx, cancel_rx));

    Ok(FeedSubscription::new(snapshot_rx, cancel_tx))
}

async fn forward_snapshots<S>(
    source: Arc<S>,
    mut signals: broadcast::Receiver<FeedSignal>,
    order: OrderKey,
    snapshot_tx: mpsc::UnboundedSender<StoreResult<FeedSnapshot>>,
    mut cancel_rx: oneshot::Receiver<()>,
) where
    S: SnapshotSource,
{
    if !deliver_snapshot(source.as_ref(), order, &snapshot_tx).await {
        return;
    }

    loop {
        tokio::select! {
            biased;
            _ = &mut cancel_rx => {
                tracing::debug!(order = order.name(), "feed subscription cancelled");
                return;
            }
            signal = signals.recv() => {
                match signal {
                    Ok(FeedSignal::Appended { revision }) => {
                        tracing::trace!(revision, "feed changed, reloading snapshot");
                        if !deliver_snapshot(source.as_ref(), order, &snapshot_tx).await {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "feed subscriber lagged, reloading snapshot");
                        if !deliver_snapshot(source.as_ref(), order, &snapshot_tx).await {
                            return;
                        }
                    }
                    Ok(FeedSignal::Disrupted { details }) => {
                        tracing::warn!(%details, "feed subscription disrupted");
                        let _ = snapshot_tx.send(
                            SubscriptionClosedSnafu {
                                stage: "feed-forwarder-disrupted",
                                details,
                            }
                            .fail(),
                        );
                        return;
                    }
                    Err(RecvError::Closed) => {
                        let _ = snapshot_tx.send(
                            SubscriptionClosedSnafu {
                                stage: "feed-forwarder-closed",
                                details: "store change channel closed".to_string(),
                            }
                            .fail(),
                        );
                        return;
                    }
                }
            }
        }
    }
}

/// Returns `false` once the subscription can no longer make progress.
async fn deliver_snapshot<S>(
    source: &S,
    order: OrderKey,
    snapshot_tx: &mpsc::UnboundedSender<StoreResult<FeedSnapshot>>,
) -> bool
where
    S: SnapshotSource,
{
    match source.load_snapshot(order).await {
        Ok(snapshot) => snapshot_tx.send(Ok(snapshot)).is_ok(),
        Err(error) => {
            tracing::warn!(stage = error.stage(), %error, "failed to load feed snapshot");
            let _ = snapshot_tx.send(Err(error));
            false
        }
    }
}
