//! spec.md §8, end-to-end scenario 4: multi-file audiobook sets get
//! sequential part numbers in natural scan order, regardless of original
//! filenames, after the containing archive is extracted into the managed
//! workspace.

use std::fs;
use std::io::Write;

use assert_fs::prelude::*;
use shelfcase::cancel::CancellationToken;
use shelfcase::config::{Config, FileOrganization};
use shelfcase::model::{ContentType, DownloadTask, SearchMode, TaskSource};
use shelfcase::output::FolderHandler;
use shelfcase::pipeline::{Pipeline, PipelineContext};
use shelfcase::router::Router;
use shelfcase::status::NullSink;

#[test]
fn archive_members_are_assigned_zero_padded_sequential_part_numbers() -> Result<(), Box<dyn std::error::Error>> {
    let root = assert_fs::TempDir::new()?;
    let staging = root.child("staging");
    staging.create_dir_all()?;
    let archive_path = staging.child("Archive Audio.zip");
    {
        let file = fs::File::create(archive_path.path())?;
        let mut writer = zip::ZipWriter::new(file);
        let options: zip::write::FileOptions<()> = zip::write::FileOptions::default();
        writer.start_file("Part 10.mp3", options)?;
        writer.write_all(b"ten")?;
        writer.start_file("Part 2.mp3", options)?;
        writer.write_all(b"two")?;
        writer.finish()?;
    }

    let ingest = root.child("ingest");
    let tmp_root = root.child("tmp");

    let mut config = Config::default();
    config.destination_audiobook = Some(ingest.path().to_path_buf());
    config.file_organization_audiobook = FileOrganization::Organize;
    config.template_audiobook_organize = "{Author}/{Title}{ - PartNumber}".to_string();
    config.supported_audiobook_formats = vec!["mp3".to_string()];

    let ctx = PipelineContext::new(&config, &NullSink, CancellationToken::new())
        .with_tmp_root(tmp_root.path().to_path_buf());
    let router = Router::new(vec![Box::new(FolderHandler)]);
    let pipeline = Pipeline::new(router, ctx);

    let task = DownloadTask {
        task_id: "task-4".to_string(),
        source: TaskSource::DirectDownload,
        title: "Archive Audio".to_string(),
        author: "Tester".to_string(),
        series: None,
        series_position: None,
        subtitle: None,
        year: None,
        part_number: None,
        format: "zip".to_string(),
        content_type: ContentType::Audiobook,
        search_mode: Some(SearchMode::Direct),
        original_download_path: None,
    };

    let dest = pipeline.run(&task, archive_path.path())?;

    // `Pipeline::run` returns only the last written file; assert on both
    // destinations directly.
    let first = ingest.path().join("Tester").join("Archive Audio - 01.mp3");
    let second = ingest.path().join("Tester").join("Archive Audio - 02.mp3");
    assert!(first.exists(), "{first:?} should exist");
    assert!(second.exists(), "{second:?} should exist");
    assert_eq!(dest, second);

    // Part 2 (content "two") sorts before Part 10 (content "ten") under
    // natural ordering, so part 01 must carry Part 2's content.
    assert_eq!(fs::read_to_string(&first)?, "two");
    assert_eq!(fs::read_to_string(&second)?, "ten");

    Ok(())
}
