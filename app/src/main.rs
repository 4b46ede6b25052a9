use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use shelfcase::cancel::CancellationToken;
use shelfcase::config::Config;
use shelfcase::model::DownloadTask;
use shelfcase::output::FolderHandler;
use shelfcase::pipeline::{Pipeline, PipelineContext};
use shelfcase::router::Router;
use shelfcase::status::{ClosureSink, StatusKind};

/// Run the post-download import pipeline once for a single completed
/// download, the way a scheduler invokes it after a download finishes
/// (spec.md §6).
#[derive(Parser, Debug)]
#[command(name = "shelfcase", about = "Post-download import pipeline")]
struct Cli {
    /// JSON file describing the completed DownloadTask.
    #[arg(long)]
    task: PathBuf,

    /// Completed download: a file or a directory.
    #[arg(long)]
    input: PathBuf,

    /// TOML configuration file; built-in defaults apply if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Managed workspace root; defaults to the OS temp directory.
    #[arg(long)]
    tmp_root: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let task_json = fs::read_to_string(&cli.task)
        .with_context(|| format!("reading task file {}", cli.task.display()))?;
    let task: DownloadTask = serde_json::from_str(&task_json)
        .with_context(|| format!("parsing task file {}", cli.task.display()))?;

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let status = ClosureSink::new(|kind: StatusKind, message: &str| {
        println!("[{kind}] {message}");
    });

    let mut ctx = PipelineContext::new(&config, &status, CancellationToken::new());
    if let Some(tmp_root) = &cli.tmp_root {
        ctx = ctx.with_tmp_root(tmp_root.clone());
    }

    let router = Router::new(vec![Box::new(FolderHandler)]);
    let pipeline = Pipeline::new(router, ctx);

    let dest = pipeline.run(&task, &cli.input)?;
    println!("imported to {}", dest.display());
    Ok(())
}
