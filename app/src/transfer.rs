//! Transfer: the core decision table, template-driven naming, and the
//! per-file hardlink/copy/move dispatch (spec.md §4.4).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::fs_ops;
use crate::model::DownloadTask;
use crate::status::{StatusKind, StatusSink};
use crate::template::{self, TemplateMode};
use crate::types::TransferStrategy;
use crate::workspace;

/// External-owned iff `source` is the task's declared original download
/// path, or lies outside the managed tmp tree while the task's source
/// denotes an external client (spec.md §4.4 "Classification of S").
pub fn is_torrent_source(task: &DownloadTask, source: &Path, tmp_root: &Path) -> bool {
    if let Some(original) = &task.original_download_path {
        if original == source {
            return true;
        }
    }
    task.source.is_external_client() && !workspace::is_within_tmp_dir(source, tmp_root)
}

/// Explicit predicate for Design Note §9(b): an external source with
/// hardlinking enabled is always preserved opaquely (no archive
/// extraction), independent of filesystem identity — the archive itself is
/// part of the seeding set.
pub fn should_preserve_archive_opaquely(is_torrent: bool, hardlink_enabled: bool) -> bool {
    is_torrent && hardlink_enabled
}

/// Best-effort filesystem-identity check by comparing device ids,
/// falling back to `false` on any stat error (spec.md §4.4 `same_fs`).
pub fn same_fs(source: &Path, dest_dir: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let source_dev = fs::metadata(source).map(|m| m.dev());
        let dest_dev = fs::metadata(dest_dir).map(|m| m.dev());
        matches!((source_dev, dest_dev), (Ok(x), Ok(y)) if x == y)
    }
    #[cfg(not(unix))]
    {
        let _ = (source, dest_dir);
        false
    }
}

/// Strategy selection table (spec.md §4.4).
pub fn select_strategy(is_torrent: bool, hardlink_enabled: bool, same_fs: bool) -> TransferStrategy {
    if !is_torrent {
        return TransferStrategy::Move;
    }
    if hardlink_enabled && same_fs {
        TransferStrategy::Hardlink
    } else {
        TransferStrategy::Copy
    }
}

/// Resolve symlinks in `source` before attempting a hardlink; `link()` on a
/// symlink target can silently link the symlink itself rather than its
/// target on some platforms, so the hardlink path always hardlinks the
/// real file.
fn resolve_hardlink_source(source: &Path) -> PathBuf {
    fs::canonicalize(source).unwrap_or_else(|_| source.to_path_buf())
}

/// Build the token metadata map for one prepared file (spec.md §4.3).
/// `part_number` is `None` for single-file outputs (the `PartNumber` token
/// resolves empty and its conditional group is elided).
pub fn build_metadata_dict(task: &DownloadTask, part_number: Option<&str>) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert("Author".to_string(), task.author.clone());
    metadata.insert("Title".to_string(), task.title.clone());
    metadata.insert("Year".to_string(), task.year.clone().unwrap_or_default());
    metadata.insert("Series".to_string(), task.series.clone().unwrap_or_default());
    metadata.insert(
        "SeriesPosition".to_string(),
        task.series_position.clone().unwrap_or_default(),
    );
    metadata.insert("Subtitle".to_string(), task.subtitle.clone().unwrap_or_default());
    metadata.insert(
        "PartNumber".to_string(),
        part_number.map(str::to_string).unwrap_or_default(),
    );
    metadata
}

fn template_mode_and_string(config: &Config, is_audiobook: bool) -> Option<(TemplateMode, &str)> {
    use crate::config::FileOrganization;
    match config.file_organization_for(is_audiobook) {
        FileOrganization::None => None,
        FileOrganization::Rename => {
            Some((TemplateMode::Rename, config.template_rename_for(is_audiobook)))
        }
        FileOrganization::Organize => Some((
            TemplateMode::Organize,
            config.template_organize_for(is_audiobook),
        )),
    }
}

/// Transfer one prepared source file into `dest_root`, rendering its
/// destination from `template`/`mode` (or, when `template_mode` is `None`,
/// keeping the source's original filename — `FILE_ORGANIZATION: none`).
fn transfer_file_to_library(
    source: &Path,
    dest_root: &Path,
    template_mode: Option<(TemplateMode, &str)>,
    metadata: &BTreeMap<String, String>,
    strategy: TransferStrategy,
    status: &dyn StatusSink,
) -> PipelineResult<PathBuf> {
    let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();

    let desired = match template_mode {
        Some((mode, template)) => {
            let rendered = template::render_path(template, mode, metadata);
            template::with_extension(&rendered, extension)
        }
        None => PathBuf::from(source.file_name().unwrap_or_default()),
    };
    let desired_dest = dest_root.join(desired);

    if let Some(parent) = desired_dest.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::TransferFailed {
            src: source.to_path_buf(),
            dst: desired_dest.clone(),
            source: e,
        })?;
    }

    let result = match strategy {
        TransferStrategy::Hardlink => {
            status.report(StatusKind::Info, "hardlinking");
            let resolved = resolve_hardlink_source(source);
            fs_ops::atomic_hardlink(&resolved, &desired_dest)
        }
        TransferStrategy::Copy => {
            status.report(StatusKind::Copying, "copying");
            fs_ops::atomic_copy(source, &desired_dest)
        }
        TransferStrategy::Move => {
            status.report(StatusKind::Moving, "moving");
            fs_ops::atomic_move(source, &desired_dest)
        }
    };

    result.map_err(|e| match e {
        fs_ops::FsOpError::SizeMismatch {
            dest,
            expected,
            actual,
        } => PipelineError::SizeMismatch {
            dest,
            expected,
            actual,
        },
        fs_ops::FsOpError::CollisionExhausted { desired, attempts } => {
            PipelineError::CollisionExhausted { desired, attempts }
        }
        fs_ops::FsOpError::Io(io_source) => PipelineError::TransferFailed {
            src: source.to_path_buf(),
            dst: desired_dest.clone(),
            source: io_source,
        },
    })
}

/// Run a configured custom post-processing script (spec.md §4.4 "post
/// transfer hooks"). Failures are logged as a warning and never fail the
/// transfer.
fn run_custom_script(script: &Path, final_destination: &Path, status: &dyn StatusSink) {
    match Command::new(script).arg(final_destination).status() {
        Ok(exit) if exit.success() => {}
        Ok(exit) => {
            let message = format!("custom script exited with {exit}");
            tracing::warn!(script = %script.display(), "{message}");
            status.report(StatusKind::Info, &message);
        }
        Err(e) => {
            let message = format!("custom script failed to start: {e}");
            tracing::warn!(script = %script.display(), error = %e, "custom script failed to start");
            status.report(StatusKind::Info, &message);
        }
    }
}

/// Build the `OutputPlan` for one task's prepared files (spec.md §3
/// "OutputPlan / TransferPlan"): one `TransferPlan` per source, carrying the
/// metadata and strategy that will drive its transfer, plus a `PlanStep` log
/// entry per file for debug traces.
pub fn build_output_plan(
    task: &DownloadTask,
    files: &[PathBuf],
    config: &Config,
    is_audiobook: bool,
    strategy_for: &impl Fn(&Path) -> TransferStrategy,
) -> crate::types::OutputPlan {
    let template_mode = template_mode_and_string(config, is_audiobook);
    let template_string = template_mode.map(|(_, t)| t.to_string()).unwrap_or_default();
    let part_numbers = template::assign_part_numbers(files.len());

    let mut transfers = Vec::with_capacity(files.len());
    let mut steps = Vec::with_capacity(files.len());
    for (source, part_number) in files.iter().zip(part_numbers.iter()) {
        let metadata = build_metadata_dict(task, part_number.as_deref());
        let strategy = strategy_for(source);
        steps.push(
            crate::types::PlanStep::new("transfer")
                .with_detail("source", source.display().to_string())
                .with_detail("strategy", format!("{strategy:?}")),
        );
        transfers.push(crate::types::TransferPlan {
            source: source.clone(),
            destination_template: template_string.clone(),
            metadata,
            strategy,
        });
    }

    crate::types::OutputPlan { transfers, steps }
}

/// Transfer every prepared file for one task, assigning sequential
/// `PartNumber`s for multi-file sets, reporting status transitions, and
/// running the configured custom script once all transfers succeed.
pub fn transfer_book_files(
    task: &DownloadTask,
    files: &[PathBuf],
    dest_root: &Path,
    config: &Config,
    is_audiobook: bool,
    strategy_for: impl Fn(&Path) -> TransferStrategy,
    status: &dyn StatusSink,
    is_cancelled: impl Fn() -> bool,
) -> PipelineResult<Vec<PathBuf>> {
    let template_mode = template_mode_and_string(config, is_audiobook);
    let plan = build_output_plan(task, files, config, is_audiobook, &strategy_for);
    crate::pipeline::log_plan_steps(&task.task_id, &plan.steps);

    let mut written = Vec::with_capacity(plan.transfers.len());
    for transfer in &plan.transfers {
        if is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let dest = transfer_file_to_library(
            &transfer.source,
            dest_root,
            template_mode,
            &transfer.metadata,
            transfer.strategy,
            status,
        )?;
        written.push(dest);
    }

    if let (Some(script), Some(final_dest)) = (&config.custom_script, written.last()) {
        run_custom_script(script, final_dest, status);
    }

    status.report(StatusKind::Complete, "import complete");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentType, SearchMode, TaskSource};
    use crate::status::NullSink;
    use tempfile::tempdir;

    fn sample_task(source: TaskSource, original_download_path: Option<PathBuf>) -> DownloadTask {
        DownloadTask {
            task_id: "t1".to_string(),
            source,
            title: "The Way of Kings".to_string(),
            author: "Brandon Sanderson".to_string(),
            series: None,
            series_position: None,
            subtitle: None,
            year: None,
            part_number: None,
            format: "epub".to_string(),
            content_type: ContentType::Fiction,
            search_mode: Some(SearchMode::Direct),
            original_download_path,
        }
    }

    #[test]
    fn classifies_original_download_path_as_torrent_source() {
        let tmp = tempdir().unwrap();
        let input = PathBuf::from("/dl/Stormlight.epub");
        let task = sample_task(TaskSource::Prowlarr, Some(input.clone()));
        assert!(is_torrent_source(&task, &input, tmp.path()));
    }

    #[test]
    fn managed_source_inside_tmp_is_not_torrent() {
        let tmp = tempdir().unwrap();
        let staged = tmp.path().join("staging/book.epub");
        let task = sample_task(TaskSource::DirectDownload, None);
        assert!(!is_torrent_source(&task, &staged, tmp.path()));
    }

    #[test]
    fn strategy_table_matches_spec() {
        assert_eq!(
            select_strategy(true, true, true),
            TransferStrategy::Hardlink
        );
        assert_eq!(select_strategy(true, true, false), TransferStrategy::Copy);
        assert_eq!(select_strategy(true, false, true), TransferStrategy::Copy);
        assert_eq!(select_strategy(false, true, true), TransferStrategy::Move);
    }

    #[test]
    fn archive_preserved_opaquely_only_when_torrent_and_hardlink() {
        assert!(should_preserve_archive_opaquely(true, true));
        assert!(!should_preserve_archive_opaquely(true, false));
        assert!(!should_preserve_archive_opaquely(false, true));
    }

    #[test]
    fn direct_download_rename_scenario() {
        let dir = tempdir().unwrap();
        let dest_root = dir.path().join("ingest");
        fs::create_dir_all(&dest_root).unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let source = staging.join("book.epub");
        fs::write(&source, b"c").unwrap();

        let task = sample_task(TaskSource::DirectDownload, None);
        let mut config = Config::default();
        config.template_rename = "{Author} - {Title}".to_string();

        let written = transfer_book_files(
            &task,
            &[source.clone()],
            &dest_root,
            &config,
            false,
            |_| TransferStrategy::Move,
            &NullSink,
            || false,
        )
        .unwrap();

        assert_eq!(
            written,
            vec![dest_root.join("Brandon Sanderson - The Way of Kings.epub")]
        );
        assert!(!source.exists());
    }

    #[test]
    fn multi_file_audiobook_assigns_sequential_part_numbers() {
        let dir = tempdir().unwrap();
        let dest_root = dir.path().join("ingest");
        fs::create_dir_all(&dest_root).unwrap();
        let staging = dir.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        let part2 = staging.join("Part 2.mp3");
        let part10 = staging.join("Part 10.mp3");
        fs::write(&part2, b"a").unwrap();
        fs::write(&part10, b"b").unwrap();

        let mut task = sample_task(TaskSource::DirectDownload, None);
        task.title = "Archive Audio".to_string();
        task.author = "Tester".to_string();
        task.content_type = ContentType::Audiobook;

        let mut config = Config::default();
        config.template_audiobook_organize = "{Author}/{Title}{ - PartNumber}".to_string();
        config.file_organization_audiobook = crate::config::FileOrganization::Organize;

        let written = transfer_book_files(
            &task,
            &[part2, part10],
            &dest_root,
            &config,
            true,
            |_| TransferStrategy::Move,
            &NullSink,
            || false,
        )
        .unwrap();

        assert_eq!(
            written,
            vec![
                dest_root.join("Tester/Archive Audio - 01.mp3"),
                dest_root.join("Tester/Archive Audio - 02.mp3"),
            ]
        );
    }

    #[test]
    fn output_plan_carries_one_transfer_per_file_with_its_strategy() {
        let task = sample_task(TaskSource::DirectDownload, None);
        let config = Config::default();
        let files = vec![PathBuf::from("/staging/a.epub"), PathBuf::from("/staging/b.epub")];

        let plan = build_output_plan(&task, &files, &config, false, &|_| TransferStrategy::Move);

        assert_eq!(plan.transfers.len(), 2);
        assert_eq!(plan.steps.len(), 2);
        assert!(plan.transfers.iter().all(|t| t.strategy == TransferStrategy::Move));
        assert_eq!(plan.transfers[0].source, files[0]);
        assert_eq!(plan.transfers[1].source, files[1]);
    }
}
