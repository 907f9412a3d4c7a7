//! CLI entry point for mediabatch
//!
//! Scans source directories, builds a batch plan for one task category and
//! runs it through the configured engine.

use clap::{Parser, Subcommand};
use mediabatch::{
    build_pairs, load_plan, run_metrics_server, run_startup_checks, save_plan, scan_sources,
    select_combinations, split_for_resume, tasks_from_combinations, tasks_from_pairs,
    BatchSession, Category, MediaKind, SortDirection, SortSpec, TaskConfig, TaskDescriptor,
};
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// mediabatch - batch transcoding over combinations of source libraries
#[derive(Parser, Debug)]
#[command(name = "mediabatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = "mediabatch.toml")]
    config: PathBuf,

    /// Override the number of tasks running at once
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Write the task plan (and, after the run, final statuses) to this file
    #[arg(long, global = true)]
    plan_out: Option<PathBuf>,

    /// Print the planned tasks as JSON and exit without running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Skip engine startup checks
    #[arg(long, global = true)]
    skip_checks: bool,

    /// Serve GET /metrics on this address while the batch runs
    #[arg(long, global = true)]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pair clips from two libraries and concatenate each pair
    Stitch {
        #[arg(long)]
        a: PathBuf,
        #[arg(long)]
        b: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Pick combinations across several libraries and concatenate each
    Combine {
        /// Source library, in concatenation order (repeatable)
        #[arg(long = "source", required = true)]
        sources: Vec<PathBuf>,
        #[arg(long)]
        count: usize,
        #[arg(long)]
        out: PathBuf,
        /// Source positions to order the result by, e.g. `0,1`
        #[arg(long, value_delimiter = ',')]
        priority: Vec<usize>,
        #[arg(long)]
        descending: bool,
    },
    /// Scale every clip in a library to a fixed frame size
    Resize {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// Pad instead of stretching
        #[arg(long)]
        keep_aspect: bool,
        #[arg(long)]
        out: PathBuf,
    },
    /// Overlay cover images on the opening seconds of clips
    Material {
        #[arg(long)]
        video: PathBuf,
        #[arg(long)]
        cover: PathBuf,
        #[arg(long)]
        count: usize,
        #[arg(long, default_value_t = 3.0)]
        cover_seconds: f32,
        #[arg(long)]
        out: PathBuf,
    },
    /// Execute a previously saved plan; tasks that already succeeded are skipped
    Run {
        #[arg(long)]
        plan: PathBuf,
    },
}

fn indexed(paths: Vec<PathBuf>) -> Vec<(usize, PathBuf)> {
    paths.into_iter().enumerate().collect()
}

fn plan_tasks(command: &Command, concurrency: u32) -> Result<Vec<TaskDescriptor>, Box<dyn Error>> {
    let tasks = match command {
        Command::Stitch { a, b, out } => {
            let list_a = indexed(scan_sources(a, MediaKind::Video)?);
            let list_b = indexed(scan_sources(b, MediaKind::Video)?);
            let pairs = build_pairs(&list_a, &list_b);
            tasks_from_pairs(
                &pairs,
                [&Category::new("a", "A library"), &Category::new("b", "B library")],
                &TaskConfig::Stitch {
                    prefix: "stitch".to_string(),
                },
                out,
                concurrency,
            )
        }
        Command::Combine {
            sources: dirs,
            count,
            out,
            priority,
            descending,
        } => {
            let sources = dirs
                .iter()
                .map(|dir| scan_sources(dir, MediaKind::Video))
                .collect::<Result<Vec<_>, _>>()?;
            let categories: Vec<Category> = (0..sources.len())
                .map(|i| Category::new(format!("s{}", i), format!("Source {}", i + 1)))
                .collect();
            let sort = (!priority.is_empty())
                .then(|| SortSpec::new(priority.clone(), SortDirection::All(!descending)));
            let tuples = select_combinations(&sources, *count, sort.as_ref());
            tasks_from_combinations(
                &sources,
                &categories,
                &tuples,
                &TaskConfig::Stitch {
                    prefix: "combine".to_string(),
                },
                out,
                concurrency,
            )
        }
        Command::Resize {
            input,
            width,
            height,
            keep_aspect,
            out,
        } => {
            let sources = vec![scan_sources(input, MediaKind::Video)?];
            let tuples: Vec<Vec<usize>> = (0..sources[0].len()).map(|i| vec![i]).collect();
            tasks_from_combinations(
                &sources,
                &[Category::new("input", "Input")],
                &tuples,
                &TaskConfig::Resize {
                    width: *width,
                    height: *height,
                    keep_aspect: *keep_aspect,
                    prefix: "resize".to_string(),
                },
                out,
                concurrency,
            )
        }
        Command::Material {
            video,
            cover,
            count,
            cover_seconds,
            out,
        } => {
            let sources = vec![
                scan_sources(video, MediaKind::Video)?,
                scan_sources(cover, MediaKind::Image)?,
            ];
            let tuples = select_combinations(&sources, *count, None);
            tasks_from_combinations(
                &sources,
                &[Category::new("video", "Video"), Category::new("cover", "Cover")],
                &tuples,
                &TaskConfig::Material {
                    cover_seconds: *cover_seconds,
                    prefix: "material".to_string(),
                },
                out,
                concurrency,
            )
        }
        Command::Run { plan } => load_plan(plan)?,
    };
    Ok(tasks)
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let session = BatchSession::from_config_file(&cli.config)?;
    if let Some(concurrency) = cli.concurrency {
        session.set_concurrency(concurrency);
    }

    let planned = plan_tasks(&cli.command, session.concurrency() as u32)?;
    let (finished, tasks) = split_for_resume(planned);
    if !finished.is_empty() {
        info!(skipped = finished.len(), "skipping tasks that already succeeded");
    }

    if let Some(path) = &cli.plan_out {
        let plan: Vec<TaskDescriptor> = finished.iter().chain(&tasks).cloned().collect();
        save_plan(&plan, path)?;
        info!(path = %path.display(), tasks = plan.len(), "plan written");
    }

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        session.shutdown().await?;
        return Ok(ExitCode::SUCCESS);
    }

    if tasks.is_empty() {
        warn!("nothing to do");
        session.shutdown().await?;
        return Ok(ExitCode::SUCCESS);
    }

    if cli.skip_checks {
        warn!("skipping startup checks (--skip-checks enabled)");
    } else {
        let version = run_startup_checks(&session.config)?;
        info!(program = %session.config.engine.program, %version, "engine available");
    }

    let metrics_server = cli.metrics_addr.map(|addr| {
        let snapshot = session.snapshot();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(snapshot, addr).await {
                error!(error = %e, "metrics server stopped");
            }
        })
    });

    let outcome = session.run(tasks, session.ffmpeg_executor()).await;

    if let Some(path) = &cli.plan_out {
        let mut all = finished;
        all.extend(outcome.tasks.iter().cloned());
        save_plan(&all, path)?;
    }

    session.shutdown().await?;
    if let Some(handle) = metrics_server {
        handle.abort();
    }

    println!(
        "{} succeeded, {} failed, {} total",
        outcome.aggregate.done, outcome.aggregate.failed, outcome.aggregate.total
    );
    Ok(if outcome.aggregate.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    info!(config = %cli.config.display(), "mediabatch {}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
