//! Output handler registry & dispatch (spec.md §4.8).

use std::path::{Path, PathBuf};

use crate::error::PipelineResult;
use crate::model::DownloadTask;
use crate::pipeline::PipelineContext;

/// A pluggable output destination. The folder handler (default) is the
/// core described by spec.md §4.1–§4.7; alternative handlers (e.g. upload
/// to a remote library API) consume the same `DownloadTask` and input path
/// and must honor the same three rules: never mutate external sources,
/// always fully clean the managed workspace, and report only through the
/// status sink in `ctx`.
///
/// Returning `Ok(None)` declines — the router tries the next handler.
pub trait OutputHandler {
    fn name(&self) -> &'static str;

    fn handle(
        &self,
        task: &DownloadTask,
        input_path: &Path,
        ctx: &PipelineContext,
    ) -> PipelineResult<Option<PathBuf>>;
}

/// Maps task attributes to output handlers, trying each in order until one
/// accepts (returns `Some`) or a fatal error is raised.
pub struct Router {
    handlers: Vec<Box<dyn OutputHandler>>,
}

impl Router {
    pub fn new(handlers: Vec<Box<dyn OutputHandler>>) -> Self {
        Router { handlers }
    }

    pub fn resolve(
        &self,
        task: &DownloadTask,
        input_path: &Path,
        ctx: &PipelineContext,
    ) -> PipelineResult<Option<PathBuf>> {
        for handler in &self.handlers {
            tracing::debug!(handler = handler.name(), task_id = %task.task_id, "trying output handler");
            if let Some(dest) = handler.handle(task, input_path, ctx)? {
                return Ok(Some(dest));
            }
        }
        Ok(None)
    }
}
