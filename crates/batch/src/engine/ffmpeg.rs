//! ffmpeg invocations for batch tasks
//!
//! Builds the argument vector for each task category and runs it through
//! [`run_engine`], streaming diagnostics into the task's log.

use crate::engine::process::run_engine;
use crate::events::TaskLog;
use crate::runner::{ExecuteError, TaskExecutor};
use crate::task::{TaskConfig, TaskDescriptor};
use mediabatch_config::EngineConfig;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Output file for the task at `index`: `<output_dir>/<prefix>_<index:04>.<ext>`
///
/// Callers pass the task's `output_index` when it has one, so a task keeps
/// its file name across runs of the same plan.
pub fn output_path_for(task: &TaskDescriptor, index: usize, extension: &str) -> PathBuf {
    task.output_dir.join(format!(
        "{}_{:04}.{}",
        task.config.prefix(),
        index,
        extension.trim_start_matches('.')
    ))
}

/// Build the ffmpeg argument vector for `task`
///
/// Every invocation starts with `-hide_banner -y` and ends with
/// `extra_args` followed by the output path.
///
/// # Errors
/// Returns `ExecuteError::InvalidTask` if the task does not carry the inputs
/// or settings its category needs.
pub fn build_engine_args(
    task: &TaskDescriptor,
    output: &Path,
    extra_args: &[String],
) -> Result<Vec<OsString>, ExecuteError> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-y".into()];

    match &task.config {
        TaskConfig::Stitch { .. } => {
            if task.files.is_empty() {
                return Err(ExecuteError::InvalidTask(
                    "stitch needs at least one input".to_string(),
                ));
            }
            for path in task.input_paths() {
                args.push("-i".into());
                args.push(path.into());
            }
            let streams: String = (0..task.files.len())
                .map(|i| format!("[{}:v:0]", i))
                .collect();
            args.push("-filter_complex".into());
            args.push(
                format!(
                    "{}concat=n={}:v=1:a=0[v]",
                    streams,
                    task.files.len()
                )
                .into(),
            );
            args.push("-map".into());
            args.push("[v]".into());
        }
        TaskConfig::Resize {
            width,
            height,
            keep_aspect,
            ..
        } => {
            if *width == 0 || *height == 0 {
                return Err(ExecuteError::InvalidTask(format!(
                    "invalid target size {}x{}",
                    width, height
                )));
            }
            let input = task.files.first().ok_or_else(|| {
                ExecuteError::InvalidTask("resize needs an input".to_string())
            })?;
            args.push("-i".into());
            args.push(input.path.as_os_str().into());

            let filter = if *keep_aspect {
                format!(
                    "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2",
                    w = width,
                    h = height
                )
            } else {
                format!("scale={}:{}", width, height)
            };
            args.push("-vf".into());
            args.push(filter.into());
            args.push("-c:a".into());
            args.push("copy".into());
        }
        TaskConfig::Material { cover_seconds, .. } => {
            if task.files.len() < 2 {
                return Err(ExecuteError::InvalidTask(
                    "material needs a video and a cover image".to_string(),
                ));
            }
            if !cover_seconds.is_finite() || *cover_seconds <= 0.0 {
                return Err(ExecuteError::InvalidTask(format!(
                    "invalid cover duration {}",
                    cover_seconds
                )));
            }
            args.push("-i".into());
            args.push(task.files[0].path.as_os_str().into());
            args.push("-i".into());
            args.push(task.files[1].path.as_os_str().into());
            args.push("-filter_complex".into());
            args.push(
                format!(
                    "[1:v][0:v]scale2ref[cover][base];[base][cover]overlay=0:0:enable='lte(t,{})'[v]",
                    cover_seconds
                )
                .into(),
            );
            args.push("-map".into());
            args.push("[v]".into());
            args.push("-map".into());
            args.push("0:a?".into());
            args.push("-c:a".into());
            args.push("copy".into());
        }
    }

    args.extend(extra_args.iter().map(OsString::from));
    args.push(output.as_os_str().into());
    Ok(args)
}

/// [`TaskExecutor`] that runs each task through ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegExecutor {
    program: PathBuf,
    extra_args: Vec<String>,
    output_extension: String,
}

impl FfmpegExecutor {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            program: PathBuf::from(&cfg.program),
            extra_args: cfg.extra_args.clone(),
            output_extension: cfg.output_extension.clone(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl TaskExecutor for FfmpegExecutor {
    async fn execute(&self, task: &TaskDescriptor, log: &TaskLog) -> Result<PathBuf, ExecuteError> {
        let index = task.output_index.unwrap_or_else(|| log.index());
        let output = output_path_for(task, index, &self.output_extension);
        let args = build_engine_args(task, &output, &self.extra_args)?;
        tokio::fs::create_dir_all(&task.output_dir).await?;

        run_engine(self.program.as_os_str(), &args, |line| log.line(line)).await?;
        Ok(output)
    }
}
