//! Batch progress snapshot
//!
//! A serializable view of the running batch, built by folding batch events.
//! Shared between the event consumer and the metrics endpoint.

use crate::events::BatchEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

const STAGE_RUNNING: &str = "running";

/// Per-task progress as seen through events
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskMetrics {
    pub index: usize,
    /// One of `running`, `success`, `failed`
    pub stage: String,
    pub last_log: Option<String>,
    pub output: Option<String>,
    pub error: Option<String>,
}

/// Snapshot of the current (or last) batch
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchSnapshot {
    pub timestamp_unix_ms: i64,
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub running: usize,
    pub concurrency: usize,
    pub finished: bool,
    /// Tasks that have started, ordered by index
    pub tasks: Vec<TaskMetrics>,
}

/// Shared snapshot state for concurrent access
pub type SharedSnapshot = Arc<RwLock<BatchSnapshot>>;

/// Creates a new SharedSnapshot with default values
pub fn new_shared_snapshot() -> SharedSnapshot {
    Arc::new(RwLock::new(BatchSnapshot::default()))
}

impl BatchSnapshot {
    /// Fold one event into the snapshot
    pub fn apply(&mut self, event: &BatchEvent) {
        self.timestamp_unix_ms = current_timestamp_ms();

        match event {
            BatchEvent::BatchStart { total, concurrency } => {
                *self = BatchSnapshot {
                    timestamp_unix_ms: self.timestamp_unix_ms,
                    total: *total,
                    concurrency: *concurrency,
                    ..BatchSnapshot::default()
                };
            }
            BatchEvent::TaskStart { index } => {
                let task = self.task_mut(*index);
                if task.stage != STAGE_RUNNING {
                    task.stage = STAGE_RUNNING.to_string();
                    self.running += 1;
                }
            }
            BatchEvent::TaskLog { index, message } => {
                self.task_mut(*index).last_log = Some(message.clone());
            }
            BatchEvent::TaskProgress {
                done,
                failed,
                index,
                output,
                ..
            } => {
                let task = self.task_mut(*index);
                let was_running = task.stage == STAGE_RUNNING;
                task.stage = "success".to_string();
                task.output = Some(output.clone());
                self.done = *done;
                self.failed = *failed;
                if was_running {
                    self.running -= 1;
                }
            }
            BatchEvent::TaskFailed {
                done,
                failed,
                index,
                error,
                ..
            } => {
                let task = self.task_mut(*index);
                let was_running = task.stage == STAGE_RUNNING;
                task.stage = "failed".to_string();
                task.error = Some(error.clone());
                self.done = *done;
                self.failed = *failed;
                if was_running {
                    self.running -= 1;
                }
            }
            BatchEvent::BatchFinish {
                done,
                failed,
                total,
            } => {
                self.done = *done;
                self.failed = *failed;
                self.total = *total;
                self.running = 0;
                self.finished = true;
            }
        }
    }

    fn task_mut(&mut self, index: usize) -> &mut TaskMetrics {
        let pos = match self.tasks.binary_search_by_key(&index, |t| t.index) {
            Ok(pos) => pos,
            Err(pos) => {
                self.tasks.insert(
                    pos,
                    TaskMetrics {
                        index,
                        ..TaskMetrics::default()
                    },
                );
                pos
            }
        };
        &mut self.tasks[pos]
    }
}

fn current_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
