//! Bounded-concurrency task queue with an inter-batch delay.
//!
//! A single dispatcher task owns the pending list. It takes up to
//! `concurrency` tasks in FIFO order, runs them together, waits for all of
//! them to settle, and pauses for `batch_delay` before the next batch when
//! more work is waiting. A task's failure or panic never stops the queue.
//!
//! Enqueueing never spawns a second dispatcher: tasks added while a batch is
//! running are appended to the same pending list.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::{join_all, BoxFuture};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::QueueConfig;
use crate::error::PipelineError;

/// A unit of work. Its outcome is the task's own business.
pub type Task = BoxFuture<'static, ()>;

/// Snapshot of the queue counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    /// `true` from the moment work arrives until the pending list is empty.
    pub draining: bool,
    pub queued: usize,
    pub in_flight: usize,
    pub completed: u64,
}

#[derive(Default)]
struct Counters {
    draining: AtomicBool,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    completed: AtomicU64,
}

/// Handle for submitting tasks. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<Vec<Task>>,
    counters: Arc<Counters>,
}

impl TaskQueue {
    /// Start the dispatcher and return a handle to it.
    ///
    /// The dispatcher stops when `cancel` fires or every handle is dropped.
    /// Tasks already started finish; tasks still pending are dropped.
    pub fn spawn(config: QueueConfig, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let config = config.normalized();
        let (sender, receiver) = mpsc::channel(config.capacity);
        let counters = Arc::new(Counters::default());

        let dispatcher = Dispatcher {
            receiver,
            pending: VecDeque::new(),
            counters: Arc::clone(&counters),
            config,
        };
        let handle = tokio::spawn(dispatcher.run(cancel));

        (Self { sender, counters }, handle)
    }

    /// Append tasks to the back of the queue, preserving their order.
    pub async fn enqueue(&self, tasks: Vec<Task>) -> Result<(), PipelineError> {
        if tasks.is_empty() {
            return Ok(());
        }
        let count = tasks.len();
        self.counters.queued.fetch_add(count, Ordering::SeqCst);
        self.counters.draining.store(true, Ordering::SeqCst);

        if self.sender.send(tasks).await.is_err() {
            self.counters.queued.fetch_sub(count, Ordering::SeqCst);
            return Err(PipelineError::QueueClosed);
        }
        tracing::debug!(count, "Tasks enqueued");
        Ok(())
    }

    pub async fn enqueue_one(&self, task: Task) -> Result<(), PipelineError> {
        self.enqueue(vec![task]).await
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            draining: self.counters.draining.load(Ordering::SeqCst),
            queued: self.counters.queued.load(Ordering::SeqCst),
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

struct Dispatcher {
    receiver: mpsc::Receiver<Vec<Task>>,
    pending: VecDeque<Task>,
    counters: Arc<Counters>,
    config: QueueConfig,
}

impl Dispatcher {
    async fn run(mut self, cancel: CancellationToken) {
        tracing::info!(
            concurrency = self.config.concurrency,
            batch_delay_ms = self.config.batch_delay.as_millis() as u64,
            "Task queue started",
        );

        loop {
            if self.pending.is_empty() {
                self.counters.draining.store(false, Ordering::SeqCst);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = self.receiver.recv() => match received {
                        Some(tasks) => self.pending.extend(tasks),
                        None => break,
                    },
                }
                if self.pending.is_empty() {
                    continue;
                }
                self.counters.draining.store(true, Ordering::SeqCst);
            }

            self.collect_waiting();
            let take = self.pending.len().min(self.config.concurrency);
            let batch: Vec<Task> = self.pending.drain(..take).collect();
            self.run_batch(batch).await;

            self.collect_waiting();
            if !self.pending.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.config.batch_delay) => {}
                }
            }
        }

        let dropped = self.pending.len();
        self.counters.queued.store(0, Ordering::SeqCst);
        self.counters.draining.store(false, Ordering::SeqCst);
        tracing::info!(dropped, "Task queue shutting down");
    }

    /// Move everything already sitting in the channel onto the pending list.
    fn collect_waiting(&mut self) {
        while let Ok(tasks) = self.receiver.try_recv() {
            self.pending.extend(tasks);
        }
    }

    async fn run_batch(&mut self, batch: Vec<Task>) {
        let size = batch.len();
        self.counters.queued.fetch_sub(size, Ordering::SeqCst);
        self.counters.in_flight.fetch_add(size, Ordering::SeqCst);
        tracing::debug!(size, "Running task batch");

        let handles: Vec<JoinHandle<()>> = batch.into_iter().map(tokio::spawn).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Queued task panicked");
            }
        }

        self.counters.in_flight.fetch_sub(size, Ordering::SeqCst);
        self.counters.completed.fetch_add(size as u64, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
