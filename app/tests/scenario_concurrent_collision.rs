//! spec.md §8, end-to-end scenario 5: two concurrent invocations writing
//! the same desired destination name must both land, producing distinct,
//! untruncated files (spec.md §8 invariant 4).

use std::fs;
use std::thread;

use assert_fs::prelude::*;
use shelfcase::cancel::CancellationToken;
use shelfcase::config::{Config, FileOrganization};
use shelfcase::model::{ContentType, DownloadTask, SearchMode, TaskSource};
use shelfcase::output::FolderHandler;
use shelfcase::pipeline::{Pipeline, PipelineContext};
use shelfcase::router::Router;
use shelfcase::status::NullSink;

fn task(task_id: &str) -> DownloadTask {
    DownloadTask {
        task_id: task_id.to_string(),
        source: TaskSource::DirectDownload,
        title: "Book".to_string(),
        author: "Author".to_string(),
        series: None,
        series_position: None,
        subtitle: None,
        year: None,
        part_number: None,
        format: "epub".to_string(),
        content_type: ContentType::Fiction,
        search_mode: Some(SearchMode::Direct),
        original_download_path: None,
    }
}

#[test]
fn two_concurrent_imports_of_the_same_filename_both_land() -> Result<(), Box<dyn std::error::Error>> {
    let root = assert_fs::TempDir::new()?;
    let ingest = root.child("ingest");
    let ingest_path = ingest.path().to_path_buf();

    let mut inputs = Vec::new();
    for i in 0..2 {
        let staging = root.child(format!("staging-{i}"));
        staging.create_dir_all()?;
        let file = staging.child("book.epub");
        file.write_str(&format!("content-{i}"))?;
        inputs.push(file.path().to_path_buf());
    }

    let mut config = Config::default();
    config.destination = ingest_path.clone();
    config.file_organization = FileOrganization::None;

    let handles: Vec<_> = inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| {
            let config = config.clone();
            let tmp_root = root.child(format!("tmp-{i}")).path().to_path_buf();
            thread::spawn(move || -> std::path::PathBuf {
                let ctx = PipelineContext::new(&config, &NullSink, CancellationToken::new())
                    .with_tmp_root(tmp_root);
                let router = Router::new(vec![Box::new(FolderHandler)]);
                let pipeline = Pipeline::new(router, ctx);
                pipeline.run(&task(&format!("task-{i}")), &input).unwrap()
            })
        })
        .collect();

    let mut destinations: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    destinations.sort();

    assert_eq!(
        destinations,
        vec![
            ingest_path.join("book.epub"),
            ingest_path.join("book_1.epub"),
        ]
    );

    let contents: Vec<String> = destinations
        .iter()
        .map(|p| fs::read_to_string(p).unwrap())
        .collect();
    let mut expected = vec!["content-0".to_string(), "content-1".to_string()];
    expected.sort();
    assert_eq!(contents, expected);

    Ok(())
}
