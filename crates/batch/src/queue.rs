//! Bounded-concurrency job queue
//!
//! Jobs are dequeued in FIFO order and at most `concurrency` of them run at
//! once. Each completion triggers the next dequeue. The limit can be changed
//! while jobs are running and the queue can be stopped and restarted; neither
//! operation cancels jobs that are already running.

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Error delivered through a [`JobHandle`] when a job produced no output
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The job panicked while running
    #[error("Job panicked: {0}")]
    Panicked(String),

    /// The job was discarded before it could run to completion
    #[error("Job was dropped before completion")]
    Dropped,
}

type QueuedJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct QueueState {
    concurrency_limit: usize,
    running: usize,
    pending: VecDeque<QueuedJob>,
    paused: bool,
}

/// FIFO job queue with a runtime-adjustable concurrency limit
///
/// Cloning yields another handle to the same queue. Jobs are spawned onto the
/// ambient tokio runtime, so `push`, `start` and `set_concurrency` must be
/// called from within one.
#[derive(Clone)]
pub struct JobQueue {
    state: Arc<Mutex<QueueState>>,
}

impl JobQueue {
    /// Create a running queue; `concurrency` is clamped to at least 1
    pub fn new(concurrency: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                concurrency_limit: concurrency.max(1),
                running: 0,
                pending: VecDeque::new(),
                paused: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // State stays consistent even if a holder panicked; no user code runs under the lock
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue a job and return a handle to its output
    ///
    /// Enqueuing never fails and never waits; only execution is bounded.
    pub fn push<F, Fut, T>(&self, job: F) -> JobHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let queued: QueuedJob = Box::new(move || {
            async move {
                let outcome = AssertUnwindSafe(async move { job().await })
                    .catch_unwind()
                    .await
                    .map_err(|payload| {
                        let message = panic_message(payload.as_ref());
                        warn!(%message, "queued job panicked");
                        QueueError::Panicked(message)
                    });
                // Receiver may have been dropped; the job still counts as settled
                let _ = tx.send(outcome);
            }
            .boxed()
        });

        self.lock().pending.push_back(queued);
        self.drain();
        JobHandle { rx }
    }

    /// Change the concurrency limit (clamped to at least 1)
    ///
    /// Raising the limit starts queued jobs right away. Lowering it only
    /// affects future dequeues; running jobs are left to finish.
    pub fn set_concurrency(&self, concurrency: usize) {
        let limit = concurrency.max(1);
        {
            let mut state = self.lock();
            debug!(from = state.concurrency_limit, to = limit, "queue concurrency changed");
            state.concurrency_limit = limit;
        }
        self.drain();
    }

    /// Stop dequeuing; running jobs continue to completion
    pub fn stop(&self) {
        self.lock().paused = true;
        debug!("queue stopped");
    }

    /// Resume dequeuing and start as many queued jobs as the limit allows
    pub fn start(&self) {
        self.lock().paused = false;
        debug!("queue started");
        self.drain();
    }

    pub fn concurrency(&self) -> usize {
        self.lock().concurrency_limit
    }

    /// Number of jobs currently executing
    pub fn running_count(&self) -> usize {
        self.lock().running
    }

    /// Number of jobs waiting to be dequeued
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_running(&self) -> bool {
        !self.lock().paused
    }

    fn drain(&self) {
        let ready: Vec<QueuedJob> = {
            let mut state = self.lock();
            let mut ready = Vec::new();
            while !state.paused && state.running < state.concurrency_limit {
                let Some(job) = state.pending.pop_front() else {
                    break;
                };
                state.running += 1;
                ready.push(job);
            }
            if !ready.is_empty() {
                debug!(
                    started = ready.len(),
                    running = state.running,
                    pending = state.pending.len(),
                    limit = state.concurrency_limit,
                    "dequeued jobs"
                );
            }
            ready
        };

        for job in ready {
            let queue = self.clone();
            tokio::spawn(async move {
                job().await;
                queue.settle();
            });
        }
    }

    fn settle(&self) {
        {
            let mut state = self.lock();
            state.running = state.running.saturating_sub(1);
        }
        self.drain();
    }
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("JobQueue")
            .field("concurrency_limit", &state.concurrency_limit)
            .field("running", &state.running)
            .field("pending", &state.pending.len())
            .field("paused", &state.paused)
            .finish()
    }
}

/// Handle to the output of a queued job
///
/// Resolves once the job has run. Dropping the handle does not cancel the job.
#[derive(Debug)]
pub struct JobHandle<T> {
    rx: oneshot::Receiver<Result<T, QueueError>>,
}

impl<T> Future for JobHandle<T> {
    type Output = Result<T, QueueError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(QueueError::Dropped)))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
