//! Engine process supervision
//!
//! Spawns one engine process, forwards its diagnostic output line by line as
//! it is produced, and maps the exit status to a result.

use std::collections::VecDeque;
use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Number of trailing diagnostic lines kept for error reports
pub const DIAGNOSTIC_TAIL_LINES: usize = 40;

/// Error type for engine runs
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be started
    #[error("Engine '{program}' unavailable: {source}")]
    Unavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The engine exited with a non-zero status
    #[error("Engine failed with exit code {code}: {diagnostics}")]
    Failed { code: i32, diagnostics: String },

    /// The engine was terminated by a signal
    #[error("Engine was terminated by signal: {diagnostics}")]
    Terminated { diagnostics: String },

    /// IO error while reading engine output or waiting for exit
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Run `program` with `args` and wait for it to exit
///
/// Diagnostic output (stderr) is split on `\n` and `\r`, so carriage-return
/// progress updates arrive as separate lines. Each non-empty line is passed to
/// `on_line` as soon as it is read. On failure the error carries the last
/// [`DIAGNOSTIC_TAIL_LINES`] lines.
pub async fn run_engine<F, Fut>(
    program: &OsStr,
    args: &[OsString],
    mut on_line: F,
) -> Result<(), EngineError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    debug!(program = %program.to_string_lossy(), args = args.len(), "spawning engine");

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| EngineError::Unavailable {
            program: program.to_string_lossy().into_owned(),
            source,
        })?;

    let mut tail: VecDeque<String> = VecDeque::with_capacity(DIAGNOSTIC_TAIL_LINES);

    if let Some(stderr) = child.stderr.take() {
        let mut reader = BufReader::new(stderr);
        let mut pending: Vec<u8> = Vec::new();

        loop {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }
            let (consumed, complete) = match available
                .iter()
                .position(|&b| b == b'\n' || b == b'\r')
            {
                Some(pos) => {
                    pending.extend_from_slice(&available[..pos]);
                    (pos + 1, true)
                }
                None => {
                    pending.extend_from_slice(available);
                    (available.len(), false)
                }
            };
            reader.consume(consumed);

            if complete {
                if let Some(line) = take_line(&mut pending) {
                    push_tail(&mut tail, &line);
                    on_line(line).await;
                }
            }
        }

        if let Some(line) = take_line(&mut pending) {
            push_tail(&mut tail, &line);
            on_line(line).await;
        }
    }

    let status = child.wait().await?;
    if status.success() {
        return Ok(());
    }

    let diagnostics = tail.into_iter().collect::<Vec<_>>().join("\n");
    match status.code() {
        Some(code) => Err(EngineError::Failed { code, diagnostics }),
        None => Err(EngineError::Terminated { diagnostics }),
    }
}

fn take_line(pending: &mut Vec<u8>) -> Option<String> {
    let line = String::from_utf8_lossy(pending).trim_end().to_string();
    pending.clear();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}

fn push_tail(tail: &mut VecDeque<String>, line: &str) {
    if tail.len() == DIAGNOSTIC_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line.to_string());
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn sh(script: &str) -> Vec<OsString> {
        vec![OsString::from("-c"), OsString::from(script)]
    }

    async fn run_collecting(
        program: &str,
        args: &[OsString],
    ) -> (Result<(), EngineError>, Vec<String>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let result = run_engine(OsStr::new(program), args, move |line| {
            sink.lock().unwrap().push(line);
            async {}
        })
        .await;
        let lines = lines.lock().unwrap().clone();
        (result, lines)
    }

    #[tokio::test]
    async fn test_success_streams_lines() {
        let (result, lines) =
            run_collecting("sh", &sh("echo 'Input #0' >&2; echo 'Output #0' >&2")).await;

        assert!(result.is_ok());
        assert_eq!(lines, vec!["Input #0", "Output #0"]);
    }

    #[tokio::test]
    async fn test_carriage_returns_split_progress() {
        let (result, lines) = run_collecting(
            "sh",
            &sh("printf 'frame=1\\rframe=2\\rframe=3\\n' >&2"),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(lines, vec!["frame=1", "frame=2", "frame=3"]);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_delivered() {
        let (_, lines) = run_collecting("sh", &sh("printf 'no newline' >&2")).await;
        assert_eq!(lines, vec!["no newline"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_carries_diagnostics() {
        let (result, _) =
            run_collecting("sh", &sh("echo 'Invalid data found' >&2; exit 3")).await;

        match result {
            Err(EngineError::Failed { code, diagnostics }) => {
                assert_eq!(code, 3);
                assert!(diagnostics.contains("Invalid data found"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_diagnostics_keep_only_tail() {
        let (result, lines) = run_collecting(
            "sh",
            &sh("i=0; while [ $i -lt 100 ]; do echo line$i >&2; i=$((i+1)); done; exit 1"),
        )
        .await;

        assert_eq!(lines.len(), 100);
        match result {
            Err(EngineError::Failed { diagnostics, .. }) => {
                let kept: Vec<&str> = diagnostics.lines().collect();
                assert_eq!(kept.len(), DIAGNOSTIC_TAIL_LINES);
                assert_eq!(kept.last(), Some(&"line99"));
                assert_eq!(kept.first(), Some(&"line60"));
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let (result, lines) = run_collecting("mediabatch-no-such-engine", &[]).await;

        assert!(lines.is_empty());
        match result {
            Err(EngineError::Unavailable { program, .. }) => {
                assert_eq!(program, "mediabatch-no-such-engine");
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }
}
