//! mediabatch
//!
//! Batch transcoding core: picks input combinations from several source
//! lists, turns them into task descriptors and runs those tasks through an
//! external engine with bounded concurrency, retries and progress events.

pub mod combination;
pub mod concurrency;
pub mod engine;
pub mod events;
pub mod metrics;
pub mod metrics_server;
pub mod pairing;
pub mod queue;
pub mod runner;
pub mod scan;
pub mod session;
pub mod startup;
pub mod task;

pub use mediabatch_config as config;
pub use mediabatch_config::Config;
pub use combination::{
    cartesian_product, max_combinations, select_by_lengths, select_combinations,
    sort_combinations, CombinationTuple, SortDirection, SortSpec,
};
pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use engine::{
    build_engine_args, output_path_for, run_engine, EngineError, FfmpegExecutor,
    DIAGNOSTIC_TAIL_LINES,
};
pub use events::{log_event, spawn_event_consumer, BatchEvent, EventSink, TaskLog};
pub use metrics::{new_shared_snapshot, BatchSnapshot, SharedSnapshot, TaskMetrics};
pub use metrics_server::{create_metrics_router, run_metrics_server, ServerError};
pub use pairing::{build_pairs, Pair};
pub use queue::{JobHandle, JobQueue, QueueError};
pub use runner::{
    BatchAggregate, BatchOutcome, BatchRunner, ExecuteError, RetryPolicy, TaskExecutor,
};
pub use scan::{scan_sources, MediaKind};
pub use session::{BatchSession, SessionError};
pub use startup::{
    check_engine_available, check_engine_config, parse_engine_version, run_startup_checks,
    StartupError,
};
pub use task::{
    assign_output_indices, load_plan, save_plan, split_for_resume, tasks_from_combinations,
    tasks_from_pairs, Category, TaskConfig, TaskDescriptor, TaskFile, TaskStatus,
};
