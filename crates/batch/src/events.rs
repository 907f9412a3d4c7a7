//! Batch event channel
//!
//! The runner writes typed [`BatchEvent`]s into a bounded channel; a consumer
//! task drains it, logs every event and folds it into the shared snapshot
//! served by the metrics endpoint.

use crate::metrics::SharedSnapshot;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Progress events emitted while a batch runs
///
/// Events of one task are always emitted in order: start, logs, then either
/// progress or failed. Events of different tasks interleave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BatchEvent {
    BatchStart {
        total: usize,
        concurrency: usize,
    },
    TaskStart {
        index: usize,
    },
    TaskLog {
        index: usize,
        message: String,
    },
    TaskProgress {
        done: usize,
        failed: usize,
        total: usize,
        index: usize,
        output: String,
    },
    TaskFailed {
        done: usize,
        failed: usize,
        total: usize,
        index: usize,
        error: String,
    },
    BatchFinish {
        done: usize,
        failed: usize,
        total: usize,
    },
}

/// Sending side of the event channel
///
/// Cheap to clone. A sink created with [`EventSink::disabled`] drops every
/// event, and a sink whose receiver is gone silently stops delivering.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::Sender<BatchEvent>>,
}

impl EventSink {
    /// Create a sink and the receiver that drains it
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BatchEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Send an event, waiting for room in the channel
    pub async fn emit(&self, event: BatchEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(event).await.is_err() {
            debug!("event receiver closed; dropping event");
        }
    }
}

/// Log sink handed to a task executor
///
/// Every line becomes a `task-log` event tagged with the task's index.
#[derive(Debug, Clone)]
pub struct TaskLog {
    index: usize,
    events: EventSink,
}

impl TaskLog {
    pub fn new(index: usize, events: EventSink) -> Self {
        Self { index, events }
    }

    /// Position of the task within its batch
    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn line(&self, message: impl Into<String>) {
        self.events
            .emit(BatchEvent::TaskLog {
                index: self.index,
                message: message.into(),
            })
            .await;
    }
}

/// Log an event through `tracing`
pub fn log_event(event: &BatchEvent) {
    match event {
        BatchEvent::BatchStart { total, concurrency } => {
            info!(total, concurrency, "batch started");
        }
        BatchEvent::TaskStart { index } => {
            debug!(index, "task started");
        }
        BatchEvent::TaskLog { index, message } => {
            debug!(index, %message, "engine");
        }
        BatchEvent::TaskProgress {
            done,
            failed,
            total,
            index,
            output,
        } => {
            info!(index, done, failed, total, %output, "task finished");
        }
        BatchEvent::TaskFailed {
            done,
            failed,
            total,
            index,
            error,
        } => {
            warn!(index, done, failed, total, %error, "task failed");
        }
        BatchEvent::BatchFinish {
            done,
            failed,
            total,
        } => {
            info!(done, failed, total, "batch finished");
        }
    }
}

/// Spawn a task that drains `rx`, logging each event and applying it to `snapshot`
///
/// The task ends once every [`EventSink`] attached to the channel is dropped.
pub fn spawn_event_consumer(
    mut rx: mpsc::Receiver<BatchEvent>,
    snapshot: SharedSnapshot,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            log_event(&event);
            snapshot.write().await.apply(&event);
        }
        debug!("event channel closed");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::new_shared_snapshot;

    #[test]
    fn test_event_json_uses_kebab_case_tags() {
        let event = BatchEvent::TaskProgress {
            done: 3,
            failed: 1,
            total: 10,
            index: 4,
            output: "/out/stitch_0004.mp4".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "task-progress");
        assert_eq!(value["done"], 3);
        assert_eq!(value["output"], "/out/stitch_0004.mp4");

        let start = serde_json::to_value(BatchEvent::BatchStart {
            total: 2,
            concurrency: 1,
        })
        .unwrap();
        assert_eq!(start["type"], "batch-start");
    }

    #[tokio::test]
    async fn test_task_log_tags_index() {
        let (sink, mut rx) = EventSink::channel(4);
        let log = TaskLog::new(7, sink);
        log.line("frame=  120 fps= 30").await;

        assert_eq!(
            rx.recv().await,
            Some(BatchEvent::TaskLog {
                index: 7,
                message: "frame=  120 fps= 30".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel(1);
        drop(rx);
        sink.emit(BatchEvent::TaskStart { index: 0 }).await;
        EventSink::disabled()
            .emit(BatchEvent::TaskStart { index: 0 })
            .await;
    }

    #[tokio::test]
    async fn test_consumer_applies_events_and_stops_when_senders_drop() {
        let (sink, rx) = EventSink::channel(8);
        let snapshot = new_shared_snapshot();
        let consumer = spawn_event_consumer(rx, snapshot.clone());

        sink.emit(BatchEvent::BatchStart {
            total: 1,
            concurrency: 1,
        })
        .await;
        sink.emit(BatchEvent::TaskStart { index: 0 }).await;
        sink.emit(BatchEvent::BatchFinish {
            done: 0,
            failed: 0,
            total: 1,
        })
        .await;
        drop(sink);

        consumer.await.unwrap();
        let snap = snapshot.read().await;
        assert_eq!(snap.total, 1);
        assert!(snap.finished);
    }
}
