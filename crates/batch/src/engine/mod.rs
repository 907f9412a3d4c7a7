//! External transcoding engine
//!
//! Spawning and supervising the engine process, and translating tasks into
//! ffmpeg invocations.

pub mod ffmpeg;
pub mod process;

pub use ffmpeg::{build_engine_args, output_path_for, FfmpegExecutor};
pub use process::{run_engine, EngineError, DIAGNOSTIC_TAIL_LINES};
