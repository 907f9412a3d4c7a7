//! Batch session
//!
//! Owns the pieces a batch needs for its whole lifetime: configuration, the
//! job queue, the event channel and the snapshot its consumer maintains.

use crate::concurrency::{derive_plan, ConcurrencyPlan};
use crate::config::{Config, ConfigError};
use crate::engine::FfmpegExecutor;
use crate::events::{spawn_event_consumer, EventSink};
use crate::metrics::{new_shared_snapshot, SharedSnapshot};
use crate::queue::JobQueue;
use crate::runner::{BatchOutcome, BatchRunner, RetryPolicy, TaskExecutor};
use crate::task::TaskDescriptor;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Error type for session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The event consumer stopped abnormally
    #[error("Event consumer failed: {0}")]
    Consumer(#[from] tokio::task::JoinError),
}

/// Runtime state shared by every batch run in one process
pub struct BatchSession {
    /// Configuration loaded from file and environment
    pub config: Config,
    /// Derived concurrency plan
    pub concurrency_plan: ConcurrencyPlan,
    queue: JobQueue,
    events: EventSink,
    snapshot: SharedSnapshot,
    consumer: JoinHandle<()>,
}

impl BatchSession {
    /// Build a session and start its event consumer
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: Config) -> Self {
        let concurrency_plan = derive_plan(&config);
        let queue = JobQueue::new(concurrency_plan.queue_limit());
        let (events, rx) = EventSink::channel(config.events.channel_capacity);
        let snapshot = new_shared_snapshot();
        let consumer = spawn_event_consumer(rx, snapshot.clone());

        info!(
            cores = concurrency_plan.total_cores,
            max_concurrent_jobs = concurrency_plan.max_concurrent_jobs,
            "session ready"
        );

        Self {
            config,
            concurrency_plan,
            queue,
            events,
            snapshot,
            consumer,
        }
    }

    /// Load config from `path` (defaults if missing), apply environment overrides
    /// and build a session
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self, SessionError> {
        let config = Config::load_or_default(path)?;
        Ok(Self::new(config))
    }

    /// Runner bound to this session's queue, retry policy and event channel
    pub fn runner(&self) -> BatchRunner {
        BatchRunner::new(
            self.queue.clone(),
            RetryPolicy::from_config(&self.config.retry),
            self.events.clone(),
        )
    }

    /// Executor for the configured engine
    pub fn ffmpeg_executor(&self) -> Arc<FfmpegExecutor> {
        Arc::new(FfmpegExecutor::new(&self.config.engine))
    }

    /// Run `tasks` to completion with `executor`
    pub async fn run<E: TaskExecutor>(
        &self,
        tasks: Vec<TaskDescriptor>,
        executor: Arc<E>,
    ) -> BatchOutcome {
        self.runner().run_batch(tasks, executor).await
    }

    /// Change how many tasks may run at once; running tasks are unaffected
    pub fn set_concurrency(&self, concurrency: usize) {
        self.queue.set_concurrency(concurrency);
    }

    pub fn concurrency(&self) -> usize {
        self.queue.concurrency()
    }

    pub fn snapshot(&self) -> SharedSnapshot {
        self.snapshot.clone()
    }

    /// Stop dequeuing, close the event channel and wait for the consumer to
    /// apply every event already sent
    pub async fn shutdown(self) -> Result<(), SessionError> {
        let BatchSession {
            queue,
            events,
            consumer,
            ..
        } = self;

        queue.stop();
        drop(events);
        consumer.await?;
        debug!("session shut down");
        Ok(())
    }
}

impl std::fmt::Debug for BatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSession")
            .field("config", &self.config)
            .field("concurrency_plan", &self.concurrency_plan)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
