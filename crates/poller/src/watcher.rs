//! Follow a fixed set of generations until every one of them is terminal.

use std::sync::Arc;

use tokio::sync::watch;
use xyplot_core::types::{DbId, Timestamp};
use xyplot_db::models::generation::Generation;
use xyplot_db::GenerationStore;

use crate::coordinator::{PollControl, PollError, PollingCoordinator, SubscriptionId};

/// Latest view of the watched rows.
#[derive(Debug, Clone, Default)]
pub struct WatchSnapshot {
    /// Rows in the order their ids were given; deleted rows are absent.
    pub generations: Vec<Generation>,
    pub refreshed_at: Option<Timestamp>,
    /// Set once a refresh found no `pending` or `running` row.
    pub settled: bool,
}

impl WatchSnapshot {
    pub fn pending_count(&self) -> usize {
        self.generations.iter().filter(|g| !g.is_terminal()).count()
    }
}

/// Subscribes to a coordinator on behalf of a generation list and publishes
/// each refresh through a `watch` channel. The subscription removes itself
/// once everything has settled.
pub struct GenerationWatcher {
    subscription: SubscriptionId,
    receiver: watch::Receiver<WatchSnapshot>,
}

impl GenerationWatcher {
    pub async fn start(
        coordinator: &PollingCoordinator,
        store: Arc<dyn GenerationStore>,
        ids: Vec<DbId>,
    ) -> Self {
        let (sender, receiver) = watch::channel(WatchSnapshot::default());
        let sender = Arc::new(sender);
        let ids: Arc<[DbId]> = ids.into();

        let subscription = coordinator
            .subscribe(move || {
                let store = Arc::clone(&store);
                let ids = Arc::clone(&ids);
                let sender = Arc::clone(&sender);
                async move {
                    let generations = store.list_by_ids(&ids).await?;
                    let settled = generations.iter().all(Generation::is_terminal);
                    sender.send_replace(WatchSnapshot {
                        generations,
                        refreshed_at: Some(chrono::Utc::now()),
                        settled,
                    });
                    Ok::<_, PollError>(if settled {
                        PollControl::Unsubscribe
                    } else {
                        PollControl::Continue
                    })
                }
            })
            .await;

        tracing::debug!(subscription = %subscription, "Generation watcher started");
        Self {
            subscription,
            receiver,
        }
    }

    pub fn subscription(&self) -> SubscriptionId {
        self.subscription
    }

    /// The most recent snapshot.
    pub fn latest(&self) -> WatchSnapshot {
        self.receiver.borrow().clone()
    }

    /// A fresh receiver for the snapshot stream.
    pub fn receiver(&self) -> watch::Receiver<WatchSnapshot> {
        self.receiver.clone()
    }

    /// Wait for the snapshot in which every watched row is terminal.
    pub async fn settled(&mut self) -> Result<WatchSnapshot, PollError> {
        let snapshot = self
            .receiver
            .wait_for(|s| s.settled)
            .await
            .map_err(|_| PollError::WatcherClosed)?;
        Ok(snapshot.clone())
    }

    /// Stop watching before the rows have settled.
    pub async fn stop(self, coordinator: &PollingCoordinator) {
        coordinator.unsubscribe(self.subscription).await;
    }
}
