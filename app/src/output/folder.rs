//! Default folder output handler: the core pipeline described by
//! spec.md §4.1–§4.7, wired up behind the `OutputHandler` trait (§4.8).

use std::io;
use std::path::{Path, PathBuf};

use crate::destination;
use crate::error::{PipelineError, PipelineResult};
use crate::model::DownloadTask;
use crate::pipeline::PipelineContext;
use crate::router::OutputHandler;
use crate::scan;
use crate::status::StatusKind;
use crate::transfer;
use crate::types::PlanStep;
use crate::workspace::{self, Workspace};

pub struct FolderHandler;

impl OutputHandler for FolderHandler {
    fn name(&self) -> &'static str {
        "folder"
    }

    /// Validate the destination, classify the source, scan/stage the
    /// input, transfer every prepared file, and clean up the workspace on
    /// every exit path. Declines (`Ok(None)`) only when destination
    /// validation fails (spec.md §4.6) so the router may try another
    /// handler; every other failure is fatal.
    fn handle(
        &self,
        task: &DownloadTask,
        input_path: &Path,
        ctx: &PipelineContext,
    ) -> PipelineResult<Option<PathBuf>> {
        let is_audiobook = task.content_type.is_audiobook();
        let dest_root = destination::get_final_destination(ctx.config, &task.content_type);

        if let Err(e) = destination::validate_destination(&dest_root) {
            tracing::debug!(handler = self.name(), destination = %dest_root.display(), error = %e, "destination validation failed, declining");
            ctx.status.report(StatusKind::Error, &e.to_string());
            return Ok(None);
        }

        if ctx.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let is_torrent = transfer::is_torrent_source(task, input_path, &ctx.tmp_root);
        let hardlink_enabled = ctx.config.hardlink_enabled_for(is_audiobook);
        let allow_extraction =
            !transfer::should_preserve_archive_opaquely(is_torrent, hardlink_enabled);

        crate::pipeline::log_plan_steps(
            &task.task_id,
            &[PlanStep::new("classify")
                .with_detail("is_torrent", is_torrent.to_string())
                .with_detail("allow_extraction", allow_extraction.to_string())],
        );

        ctx.status.report(StatusKind::Downloading, "preparing completed download");

        let workspace = Workspace::new_in(&ctx.tmp_root).map_err(PipelineError::Io)?;

        let supported = scan::get_supported_formats(
            &task.content_type,
            &ctx.config.supported_formats,
            &ctx.config.supported_audiobook_formats,
        );

        let prepared = scan::collect_staged_files(
            input_path,
            &supported,
            allow_extraction,
            &workspace,
            ctx.status,
        );

        if let Some(message) = &prepared.error {
            workspace::cleanup_output_staging(&prepared.workspace_cleanup, &ctx.tmp_root);
            ctx.status.report(StatusKind::Error, message);
            return Err(PipelineError::ScanFailed {
                root: input_path.to_path_buf(),
                source: io::Error::other(message.clone()),
            });
        }

        if prepared.is_empty() {
            workspace::cleanup_output_staging(&prepared.workspace_cleanup, &ctx.tmp_root);
            let message = format!("no supported files found in {}", input_path.display());
            ctx.status.report(StatusKind::Error, &message);
            return Err(PipelineError::NothingToImport(input_path.to_path_buf()));
        }

        if ctx.cancel.is_cancelled() {
            workspace::cleanup_output_staging(&prepared.workspace_cleanup, &ctx.tmp_root);
            return Err(PipelineError::Cancelled);
        }

        crate::pipeline::log_plan_steps(
            &task.task_id,
            &[PlanStep::new("scan")
                .with_detail("files", prepared.files.len().to_string())
                .with_detail("rejected", prepared.rejected.len().to_string())],
        );

        let strategy_dest = dest_root.clone();
        let strategy_for = move |source: &Path| {
            let same = transfer::same_fs(source, &strategy_dest);
            transfer::select_strategy(is_torrent, hardlink_enabled, same)
        };

        let cancel = ctx.cancel.clone();
        let result = transfer::transfer_book_files(
            task,
            &prepared.files,
            &dest_root,
            ctx.config,
            is_audiobook,
            strategy_for,
            ctx.status,
            move || cancel.is_cancelled(),
        );

        workspace::cleanup_output_staging(&prepared.workspace_cleanup, &ctx.tmp_root);

        let mut written = result.map_err(|e| {
            if !matches!(e, PipelineError::Cancelled) {
                ctx.status.report(StatusKind::Error, &e.to_string());
            }
            e
        })?;
        Ok(written.pop())
    }
}
