//! Task descriptors for batch transcoding
//!
//! A task names the input files picked for one engine run, the per-category
//! settings for that run, and where its output goes. Plans (lists of tasks)
//! can be saved to and loaded from JSON.

use crate::combination::CombinationTuple;
use crate::pairing::Pair;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Status of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be executed.
    #[default]
    Pending,
    /// Task is currently running.
    Running,
    /// Task completed successfully.
    Success,
    /// Task failed after exhausting its retries.
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One input file of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFile {
    pub path: PathBuf,
    /// Index of the file within its source list.
    pub index: usize,
    /// Short category key, e.g. `a`, `b`, `cover`.
    pub category: String,
    /// Human readable category name, e.g. `A library`.
    pub category_name: String,
}

/// A source list category used when turning generator output into tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub key: String,
    pub name: String,
}

impl Category {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
        }
    }
}

/// Per-category engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskConfig {
    /// Concatenate every input in file order.
    Stitch {
        /// Output file name prefix.
        #[serde(default = "default_stitch_prefix")]
        prefix: String,
    },
    /// Scale the single input to a fixed frame size.
    Resize {
        width: u32,
        height: u32,
        /// Pad instead of stretching when the aspect ratio differs.
        #[serde(default)]
        keep_aspect: bool,
        #[serde(default = "default_resize_prefix")]
        prefix: String,
    },
    /// Overlay a cover image on the first input for the opening seconds.
    Material {
        cover_seconds: f32,
        #[serde(default = "default_material_prefix")]
        prefix: String,
    },
}

fn default_stitch_prefix() -> String {
    "stitch".to_string()
}

fn default_resize_prefix() -> String {
    "resize".to_string()
}

fn default_material_prefix() -> String {
    "material".to_string()
}

impl TaskConfig {
    /// Output file name prefix for this category.
    pub fn prefix(&self) -> &str {
        match self {
            TaskConfig::Stitch { prefix }
            | TaskConfig::Resize { prefix, .. }
            | TaskConfig::Material { prefix, .. } => prefix,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TaskConfig::Stitch { .. } => "stitch",
            TaskConfig::Resize { .. } => "resize",
            TaskConfig::Material { .. } => "material",
        }
    }
}

/// A single unit of engine work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    /// Unique task identifier (UUID).
    pub id: String,
    pub status: TaskStatus,
    pub files: Vec<TaskFile>,
    pub config: TaskConfig,
    pub output_dir: PathBuf,
    /// Concurrency the task was planned with.
    pub concurrency: u32,
    /// Position in the plan, used for output naming so resumed runs keep
    /// the file names of the original plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_index: Option<usize>,
}

impl TaskDescriptor {
    /// Creates a pending task with a fresh id.
    pub fn new(
        files: Vec<TaskFile>,
        config: TaskConfig,
        output_dir: impl Into<PathBuf>,
        concurrency: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: TaskStatus::Pending,
            files,
            config,
            output_dir: output_dir.into(),
            concurrency,
            output_index: None,
        }
    }

    pub fn with_output_index(mut self, index: usize) -> Self {
        self.output_index = Some(index);
        self
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
    }

    /// Check if the task is in a terminal state (success or failed).
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Success | TaskStatus::Failed)
    }

    /// Paths of all input files, in task order.
    pub fn input_paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }
}

/// Builds stitch-style tasks from A/B pairs.
///
/// `categories` names the A and B lists, in that order.
pub fn tasks_from_pairs(
    pairs: &[Pair<(usize, PathBuf), (usize, PathBuf)>],
    categories: [&Category; 2],
    config: &TaskConfig,
    output_dir: &Path,
    concurrency: u32,
) -> Vec<TaskDescriptor> {
    pairs
        .iter()
        .map(|pair| {
            let files = vec![
                task_file(&pair.a.1, pair.a.0, categories[0]),
                task_file(&pair.b.1, pair.b.0, categories[1]),
            ];
            TaskDescriptor::new(files, config.clone(), output_dir, concurrency)
                .with_output_index(pair.index)
        })
        .collect()
}

/// Builds tasks from combination tuples over `sources`.
///
/// `categories[i]` names `sources[i]`. Tuples with an index outside their
/// source list, or with a width different from `sources`, are skipped.
pub fn tasks_from_combinations(
    sources: &[Vec<PathBuf>],
    categories: &[Category],
    tuples: &[CombinationTuple],
    config: &TaskConfig,
    output_dir: &Path,
    concurrency: u32,
) -> Vec<TaskDescriptor> {
    if categories.len() != sources.len() {
        return Vec::new();
    }

    tuples
        .iter()
        .filter(|tuple| tuple.len() == sources.len())
        .filter_map(|tuple| {
            let files = tuple
                .iter()
                .enumerate()
                .map(|(pos, &idx)| {
                    sources[pos]
                        .get(idx)
                        .map(|path| task_file(path, idx, &categories[pos]))
                })
                .collect::<Option<Vec<_>>>()?;
            Some(TaskDescriptor::new(
                files,
                config.clone(),
                output_dir,
                concurrency,
            ))
        })
        .enumerate()
        .map(|(index, task)| task.with_output_index(index))
        .collect()
}

/// Gives every task without an output index its position in `tasks`.
///
/// Plans written before output indices existed get the names they would
/// have had on their first run.
pub fn assign_output_indices(tasks: &mut [TaskDescriptor]) {
    for (index, task) in tasks.iter_mut().enumerate() {
        if task.output_index.is_none() {
            task.output_index = Some(index);
        }
    }
}

fn task_file(path: &Path, index: usize, category: &Category) -> TaskFile {
    TaskFile {
        path: path.to_path_buf(),
        index,
        category: category.key.clone(),
        category_name: category.name.clone(),
    }
}

/// Splits a loaded plan into tasks that already succeeded and tasks to run.
///
/// Output indices are filled in first, so the remaining tasks keep their
/// original output names. Tasks to run are reset to pending.
pub fn split_for_resume(
    mut tasks: Vec<TaskDescriptor>,
) -> (Vec<TaskDescriptor>, Vec<TaskDescriptor>) {
    assign_output_indices(&mut tasks);
    let (finished, mut pending): (Vec<_>, Vec<_>) = tasks
        .into_iter()
        .partition(|task| task.status == TaskStatus::Success);
    for task in &mut pending {
        task.set_status(TaskStatus::Pending);
    }
    (finished, pending)
}

/// Saves a plan as pretty-printed JSON, creating parent directories.
pub fn save_plan(tasks: &[TaskDescriptor], path: &Path) -> Result<(), io::Error> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let json = serde_json::to_string_pretty(tasks)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    fs::write(path, json)
}

/// Loads a plan previously written by [`save_plan`].
pub fn load_plan(path: &Path) -> Result<Vec<TaskDescriptor>, io::Error> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
