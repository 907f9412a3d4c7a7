//! Batch execution with retry
//!
//! Every task is pushed into a [`JobQueue`], which bounds how many run at
//! once. Each task moves through `pending -> running -> success | failed`,
//! retrying failed attempts according to a [`RetryPolicy`], and reports its
//! outcome as events and into the batch aggregate.

use crate::engine::EngineError;
use crate::events::{BatchEvent, EventSink, TaskLog};
use crate::queue::JobQueue;
use crate::task::{TaskDescriptor, TaskStatus};
use futures_util::future::join_all;
use mediabatch_config::RetryConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Error type for a single execution attempt
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The engine could not be spawned or exited unsuccessfully
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The task cannot be turned into an engine invocation
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    /// Preparing the output location failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs one task against the external engine
///
/// Implementations stream diagnostic text through `log` as it is produced
/// and return the path of the produced output.
pub trait TaskExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        task: &TaskDescriptor,
        log: &TaskLog,
    ) -> impl Future<Output = Result<PathBuf, ExecuteError>> + Send;
}

/// How often and how quickly failed attempts are retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the first failure
    pub max_retries: u32,
    /// Pause before each retry
    pub delay: Duration,
}

impl Default for RetryPolicy {
    /// One immediate retry
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_retries: cfg.max_retries,
            delay: Duration::from_millis(cfg.retry_delay_ms),
        }
    }

    /// Total attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Done/failed/total counters for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAggregate {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
}

impl BatchAggregate {
    /// Every task has reached a terminal state
    pub fn is_settled(&self) -> bool {
        self.done + self.failed == self.total
    }
}

/// Result of [`BatchRunner::run_batch`]
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub aggregate: BatchAggregate,
    /// Tasks in submission order, each in a terminal status
    pub tasks: Vec<TaskDescriptor>,
}

type SharedAggregate = Arc<Mutex<BatchAggregate>>;

/// Record a terminal outcome and return the counters as of that moment
fn record(aggregate: &SharedAggregate, success: bool) -> BatchAggregate {
    let mut agg = aggregate.lock().unwrap_or_else(PoisonError::into_inner);
    if success {
        agg.done += 1;
    } else {
        agg.failed += 1;
    }
    *agg
}

/// Executes batches of tasks through a shared [`JobQueue`]
#[derive(Debug, Clone)]
pub struct BatchRunner {
    queue: JobQueue,
    retry: RetryPolicy,
    events: EventSink,
}

impl BatchRunner {
    pub fn new(queue: JobQueue, retry: RetryPolicy, events: EventSink) -> Self {
        Self {
            queue,
            retry,
            events,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Run every task to a terminal status
    ///
    /// A failing task never aborts its siblings. Emits `batch-start` first and
    /// `batch-finish` once all tasks have settled, then returns the aggregate
    /// together with the updated tasks.
    pub async fn run_batch<E: TaskExecutor>(
        &self,
        tasks: Vec<TaskDescriptor>,
        executor: Arc<E>,
    ) -> BatchOutcome {
        let total = tasks.len();
        let concurrency = self.queue.concurrency();
        debug!(total, concurrency, "starting batch");
        self.events
            .emit(BatchEvent::BatchStart { total, concurrency })
            .await;

        let aggregate: SharedAggregate = Arc::new(Mutex::new(BatchAggregate {
            total,
            ..BatchAggregate::default()
        }));

        let pending: Vec<_> = tasks
            .into_iter()
            .enumerate()
            .map(|(index, task)| {
                let fallback = task.clone();
                let job = TaskJob {
                    index,
                    task,
                    executor: executor.clone(),
                    retry: self.retry.clone(),
                    events: self.events.clone(),
                    aggregate: aggregate.clone(),
                };
                let handle = self.queue.push(move || job.run());
                async move { (index, fallback, handle.await) }
            })
            .collect();

        let mut finished = Vec::with_capacity(total);
        for (index, mut fallback, settled) in join_all(pending).await {
            match settled {
                Ok(task) => finished.push(task),
                Err(err) => {
                    // The job never reported an outcome, so count it here
                    warn!(index, error = %err, "task aborted");
                    fallback.set_status(TaskStatus::Failed);
                    let snapshot = record(&aggregate, false);
                    self.events
                        .emit(BatchEvent::TaskFailed {
                            done: snapshot.done,
                            failed: snapshot.failed,
                            total,
                            index,
                            error: err.to_string(),
                        })
                        .await;
                    finished.push(fallback);
                }
            }
        }

        let aggregate = *aggregate.lock().unwrap_or_else(PoisonError::into_inner);
        debug!(
            done = aggregate.done,
            failed = aggregate.failed,
            total,
            "batch finished"
        );
        self.events
            .emit(BatchEvent::BatchFinish {
                done: aggregate.done,
                failed: aggregate.failed,
                total,
            })
            .await;

        BatchOutcome {
            aggregate,
            tasks: finished,
        }
    }
}

/// Everything one queued task needs, moved into the queue
struct TaskJob<E> {
    index: usize,
    task: TaskDescriptor,
    executor: Arc<E>,
    retry: RetryPolicy,
    events: EventSink,
    aggregate: SharedAggregate,
}

impl<E: TaskExecutor> TaskJob<E> {
    async fn run(self) -> TaskDescriptor {
        let TaskJob {
            index,
            mut task,
            executor,
            retry,
            events,
            aggregate,
        } = self;

        task.set_status(TaskStatus::Running);
        events.emit(BatchEvent::TaskStart { index }).await;

        let log = TaskLog::new(index, events.clone());
        let attempts = retry.max_attempts();
        let mut attempt = 1;
        let outcome = loop {
            match executor.execute(&task, &log).await {
                Ok(output) => break Ok(output),
                Err(err) if attempt < attempts => {
                    warn!(index, attempt, error = %err, "attempt failed, retrying");
                    log.line(format!(
                        "Attempt {}/{} failed: {}. Retrying...",
                        attempt, attempts, err
                    ))
                    .await;
                    if !retry.delay.is_zero() {
                        tokio::time::sleep(retry.delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => break Err(err),
            }
        };

        let total = aggregate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total;
        match outcome {
            Ok(output) => {
                task.set_status(TaskStatus::Success);
                let snapshot = record(&aggregate, true);
                events
                    .emit(BatchEvent::TaskProgress {
                        done: snapshot.done,
                        failed: snapshot.failed,
                        total,
                        index,
                        output: output.display().to_string(),
                    })
                    .await;
            }
            Err(err) => {
                task.set_status(TaskStatus::Failed);
                let snapshot = record(&aggregate, false);
                events
                    .emit(BatchEvent::TaskFailed {
                        done: snapshot.done,
                        failed: snapshot.failed,
                        total,
                        index,
                        error: err.to_string(),
                    })
                    .await;
            }
        }

        task
    }
}
