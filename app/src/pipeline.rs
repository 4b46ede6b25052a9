//! Top-level orchestration: context assembly and router dispatch
//! (spec.md §2 "Router", §4.8).

use std::path::{Path, PathBuf};

use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::model::DownloadTask;
use crate::router::Router;
use crate::status::StatusSink;
use crate::types::PlanStep;

/// Everything an `OutputHandler` needs that is not specific to one task:
/// the loaded configuration, the status sink, the cancellation signal, and
/// the process tmp root a managed workspace is created under.
pub struct PipelineContext<'a> {
    pub config: &'a Config,
    pub status: &'a dyn StatusSink,
    pub cancel: CancellationToken,
    pub tmp_root: PathBuf,
}

impl<'a> PipelineContext<'a> {
    pub fn new(config: &'a Config, status: &'a dyn StatusSink, cancel: CancellationToken) -> Self {
        PipelineContext {
            config,
            status,
            cancel,
            tmp_root: std::env::temp_dir(),
        }
    }

    pub fn with_tmp_root(mut self, tmp_root: PathBuf) -> Self {
        self.tmp_root = tmp_root;
        self
    }
}

/// Emit a debug trace of a plan's steps (spec.md §3 "A `PlanStep` log
/// captures human-readable step names for debug traces").
pub fn log_plan_steps(task_id: &str, steps: &[PlanStep]) {
    for step in steps {
        tracing::debug!(task_id, step = step.name.as_str(), details = ?step.details, "plan step");
    }
}

/// One post-download processing invocation: a router in front of the
/// pluggable output handlers (spec.md §2).
pub struct Pipeline<'a> {
    router: Router,
    context: PipelineContext<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(router: Router, context: PipelineContext<'a>) -> Self {
        Pipeline { router, context }
    }

    /// Resolve `task`/`input_path` through the router, returning the final
    /// location an output handler wrote to. Fails if cancelled up front or
    /// if every registered handler declines.
    pub fn run(&self, task: &DownloadTask, input_path: &Path) -> PipelineResult<PathBuf> {
        if self.context.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        log_plan_steps(
            &task.task_id,
            &[PlanStep::new("resolve").with_detail("input", input_path.display().to_string())],
        );

        match self.router.resolve(task, input_path, &self.context)? {
            Some(dest) => Ok(dest),
            None => Err(PipelineError::NoHandlerAccepted(input_path.to_path_buf())),
        }
    }
}
