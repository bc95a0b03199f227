//! Single refresh loop shared by many subscribers.
//!
//! The loop starts when the first subscriber arrives and stops when the last
//! one leaves. Each tick spawns every callback, waits for all of them to
//! settle, then sleeps for the cadence, so a slow callback delays the next
//! tick for everyone and ticks never overlap. Refresh starts (ticks and
//! manual triggers alike) are spaced by a minimum interval; manual triggers
//! are debounced on the trailing edge.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use xyplot_core::types::Timestamp;
use xyplot_db::StoreError;

use crate::config::PollerConfig;
use crate::timing::{Debounce, Debouncer, MinIntervalGuard};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What a callback wants after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollControl {
    Continue,
    /// Remove this subscription; used when there is nothing left to watch.
    Unsubscribe,
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("Refresh failed: {0}")]
    Refresh(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Watcher stopped before its generations finished")]
    WatcherClosed,
}

/// Handle returned by [`PollingCoordinator::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Snapshot returned by [`PollingCoordinator::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoordinatorStatus {
    pub is_active: bool,
    pub subscriber_count: usize,
    pub last_refresh_at: Option<Timestamp>,
    pub refresh_count: u64,
}

type Callback = Arc<dyn Fn() -> BoxFuture<'static, Result<PollControl, PollError>> + Send + Sync>;

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Multiplexes subscribers onto one refresh loop. Cheap to clone; clones
/// share the same loop.
#[derive(Clone)]
pub struct PollingCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: PollerConfig,
    next_id: AtomicU64,
    state: Mutex<State>,
    /// Held for the duration of a refresh; a refresh that cannot take it is
    /// skipped.
    in_flight: Mutex<()>,
}

struct State {
    subscribers: BTreeMap<SubscriptionId, Callback>,
    loop_cancel: Option<CancellationToken>,
    guard: MinIntervalGuard,
    debouncer: Debouncer,
    debounce_timer_armed: bool,
    last_refresh_at: Option<Timestamp>,
    refresh_count: u64,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Tick,
    Manual,
}

impl PollingCoordinator {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                next_id: AtomicU64::new(1),
                state: Mutex::new(State {
                    subscribers: BTreeMap::new(),
                    loop_cancel: None,
                    guard: MinIntervalGuard::new(config.min_interval),
                    debouncer: Debouncer::new(config.debounce),
                    debounce_timer_armed: false,
                    last_refresh_at: None,
                    refresh_count: 0,
                }),
                in_flight: Mutex::new(()),
            }),
        }
    }

    /// Register a callback. Starts the loop if this is the first subscriber;
    /// the first refresh then runs immediately.
    pub async fn subscribe<F, Fut>(&self, refresh: F) -> SubscriptionId
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PollControl, PollError>> + Send + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let callback: Callback = Arc::new(move || refresh().boxed());

        let mut state = self.inner.state.lock().await;
        state.subscribers.insert(id, callback);

        if state.loop_cancel.is_none() {
            let cancel = CancellationToken::new();
            state.loop_cancel = Some(cancel.clone());
            tokio::spawn(Arc::clone(&self.inner).run_loop(cancel));
            tracing::debug!(subscription = %id, "Polling loop started");
        }
        id
    }

    /// Remove a subscription. Stops the loop when it was the last one.
    /// Returns `false` for an unknown handle.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.unsubscribe(id).await
    }

    /// Request an out-of-band refresh, debounced and subject to the minimum
    /// interval.
    pub async fn trigger_manual_refresh(&self) {
        let mut state = self.inner.state.lock().await;
        state.debouncer.trigger(Instant::now());
        if state.debounce_timer_armed {
            return;
        }
        state.debounce_timer_armed = true;
        tokio::spawn(Arc::clone(&self.inner).run_debounce_timer());
    }

    pub async fn status(&self) -> CoordinatorStatus {
        let state = self.inner.state.lock().await;
        CoordinatorStatus {
            is_active: state.loop_cancel.is_some(),
            subscriber_count: state.subscribers.len(),
            last_refresh_at: state.last_refresh_at,
            refresh_count: state.refresh_count,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.inner.config
    }
}

impl Default for PollingCoordinator {
    fn default() -> Self {
        Self::new(PollerConfig::default())
    }
}

impl Inner {
    async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            self.refresh(Source::Tick).await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        tracing::debug!("Polling loop stopped");
    }

    async fn run_debounce_timer(self: Arc<Self>) {
        loop {
            let decision = self.state.lock().await.debouncer.check(Instant::now());
            match decision {
                Debounce::Wait(deadline) => tokio::time::sleep_until(deadline).await,
                Debounce::Fire => {
                    self.state.lock().await.debounce_timer_armed = false;
                    self.refresh(Source::Manual).await;
                    break;
                }
                Debounce::Idle => {
                    self.state.lock().await.debounce_timer_armed = false;
                    break;
                }
            }
        }
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.state.lock().await;
        if state.subscribers.remove(&id).is_none() {
            return false;
        }
        if state.subscribers.is_empty() {
            if let Some(cancel) = state.loop_cancel.take() {
                cancel.cancel();
            }
        }
        true
    }

    /// Run every callback once. Returns `false` when the refresh was
    /// skipped.
    async fn refresh(&self, source: Source) -> bool {
        let Ok(_flight) = self.in_flight.try_lock() else {
            tracing::debug!(?source, "Refresh skipped: another refresh is in flight");
            return false;
        };

        let callbacks: Vec<(SubscriptionId, Callback)> = {
            let mut state = self.state.lock().await;
            if state.subscribers.is_empty() {
                return false;
            }
            if !state.guard.try_start(Instant::now()) {
                tracing::debug!(?source, "Refresh skipped: minimum interval not elapsed");
                return false;
            }
            state
                .subscribers
                .iter()
                .map(|(id, cb)| (*id, Arc::clone(cb)))
                .collect()
        };

        // Spawned so that a panicking callback is contained to its own task.
        let handles = callbacks
            .iter()
            .map(|(_, cb)| {
                let cb = Arc::clone(cb);
                tokio::spawn(async move { cb().await })
            })
            .collect::<Vec<_>>();
        let results = join_all(handles).await;

        let mut finished = Vec::new();
        for ((id, _), result) in callbacks.iter().zip(results) {
            match result {
                Ok(Ok(PollControl::Continue)) => {}
                Ok(Ok(PollControl::Unsubscribe)) => finished.push(*id),
                Ok(Err(e)) => {
                    tracing::warn!(subscription = %id, error = %e, "Poll callback failed");
                }
                Err(e) => {
                    tracing::error!(subscription = %id, error = %e, "Poll callback panicked");
                }
            }
        }

        {
            let mut state = self.state.lock().await;
            state.last_refresh_at = Some(chrono::Utc::now());
            state.refresh_count += 1;
        }
        for id in finished {
            self.unsubscribe(id).await;
        }
        true
    }
}
