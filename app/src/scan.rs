//! Directory scanning, format filtering and the natural-order sort
//! (spec.md §4.2).

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::archive;
use crate::model::ContentType;
use crate::status::{StatusKind, StatusSink};
use crate::types::PreparedFiles;
use crate::workspace::Workspace;

const ARCHIVE_FORMATS: &[&str] = &["zip", "rar"];

/// The content-type-dependent supported extension set (spec.md §4.2,
/// "audiobook uses the audiobook format list ... everything else uses the
/// book format list"). Extensions are lowercase, without a leading dot.
pub fn get_supported_formats(
    content_type: &ContentType,
    book_formats: &[String],
    audiobook_formats: &[String],
) -> HashSet<String> {
    let list = if content_type.is_audiobook() {
        audiobook_formats
    } else {
        book_formats
    };
    list.iter().map(|f| f.to_lowercase()).collect()
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn is_archive(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| ARCHIVE_FORMATS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Natural-order sort key: alternating runs of digits and non-digits, with
/// digit runs compared numerically so `"Part 2"` sorts before `"Part 10"`
/// (spec.md §4.2, §8 invariant 6).
pub fn natural_sort_key(s: &str) -> Vec<NaturalChunk> {
    let mut chunks = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            let mut num = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_ascii_digit() {
                    num.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            let value: u64 = num.parse().unwrap_or(u64::MAX);
            chunks.push(NaturalChunk::Number(value));
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if !c.is_ascii_digit() {
                    text.push(c.to_ascii_lowercase());
                    chars.next();
                } else {
                    break;
                }
            }
            chunks.push(NaturalChunk::Text(text));
        }
    }
    chunks
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum NaturalChunk {
    Text(String),
    Number(u64),
}

fn sort_natural(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| {
        let ka = natural_sort_key(&a.to_string_lossy());
        let kb = natural_sort_key(&b.to_string_lossy());
        ka.cmp(&kb)
    });
}

/// Walk `root`, tolerating `PermissionError` on subtrees (skipped with a
/// debug log); propagates only if the walk cannot start at all.
pub fn scan_directory_tree(root: &Path) -> io::Result<Vec<PathBuf>> {
    // Fail fast if the root itself is unreadable.
    fs::read_dir(root)?;

    let mut files = Vec::new();
    let walker = walkdir::WalkDir::new(root).into_iter();
    for entry in walker.filter_entry(|_| true) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(root = %root.display(), error = %e, "skipping unreadable subtree during scan");
            }
        }
    }
    Ok(files)
}

/// Partition a directory's files into supported/rejected by extension.
pub fn collect_directory_files(
    root: &Path,
    supported: &HashSet<String>,
) -> io::Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let all = scan_directory_tree(root)?;
    let mut files = Vec::new();
    let mut rejected = Vec::new();
    for path in all {
        match extension_of(&path) {
            Some(ext) if supported.contains(&ext) => files.push(path),
            _ => rejected.push(path),
        }
    }
    Ok((files, rejected))
}

/// Extract one archive into its own uniquely-named workspace subdirectory
/// and return that directory.
pub fn extract_archive_files(
    archive_path: &Path,
    workspace: &Workspace,
    status: &dyn StatusSink,
) -> Result<PathBuf, archive::ArchiveError> {
    status.report(
        StatusKind::Extracting,
        &format!("extracting {}", archive_path.display()),
    );
    let dest = workspace
        .unique_subdir("extract")
        .map_err(archive::ArchiveError::Io)?;
    archive::extract(archive_path, &dest)?;
    Ok(dest)
}

/// The scan entry point (spec.md §4.2): given the task's input path and its
/// supported-format set, produce a `PreparedFiles` plan. `allow_extraction`
/// is decided by the caller from the transfer classification (see
/// `transfer::should_preserve_archive_opaquely`) before scanning starts.
pub fn collect_staged_files(
    input_path: &Path,
    supported: &HashSet<String>,
    allow_extraction: bool,
    workspace: &Workspace,
    status: &dyn StatusSink,
) -> PreparedFiles {
    if input_path.is_file() {
        return collect_staged_file(input_path, supported, allow_extraction, workspace, status);
    }

    let (mut files, rejected) = match collect_directory_files(input_path, supported) {
        Ok(result) => result,
        Err(e) => {
            return PreparedFiles {
                error: Some(format!("scan failed at {}: {e}", input_path.display())),
                ..Default::default()
            };
        }
    };

    if !files.is_empty() {
        // Rule: "supported files present -> archives are release noise."
        sort_natural(&mut files);
        return PreparedFiles {
            files,
            rejected,
            ..Default::default()
        };
    }

    let archives: Vec<PathBuf> = rejected.iter().filter(|p| is_archive(p)).cloned().collect();
    let other_rejected: Vec<PathBuf> = rejected.into_iter().filter(|p| !is_archive(p)).collect();

    if archives.is_empty() || !allow_extraction {
        return PreparedFiles {
            rejected: other_rejected,
            ..Default::default()
        };
    }

    let mut extracted_files = Vec::new();
    let mut cleanup = Vec::new();
    for archive_path in &archives {
        match extract_archive_files(archive_path, workspace, status) {
            Ok(scratch_dir) => {
                cleanup.push(scratch_dir.clone());
                match collect_directory_files(&scratch_dir, supported) {
                    Ok((mut found, _)) => extracted_files.append(&mut found),
                    Err(e) => {
                        tracing::debug!(archive = %archive_path.display(), error = %e, "scanning extracted archive failed");
                    }
                }
            }
            Err(e) => {
                tracing::debug!(archive = %archive_path.display(), error = %e, "archive extraction failed");
            }
        }
    }

    sort_natural(&mut extracted_files);
    PreparedFiles {
        files: extracted_files,
        rejected: other_rejected,
        workspace_cleanup: cleanup,
        error: None,
    }
}

fn collect_staged_file(
    input_path: &Path,
    supported: &HashSet<String>,
    allow_extraction: bool,
    workspace: &Workspace,
    status: &dyn StatusSink,
) -> PreparedFiles {
    if let Some(ext) = extension_of(input_path) {
        if supported.contains(&ext) {
            return PreparedFiles {
                files: vec![input_path.to_path_buf()],
                ..Default::default()
            };
        }
    }

    if is_archive(input_path) && allow_extraction {
        return match extract_archive_files(input_path, workspace, status) {
            Ok(scratch_dir) => match collect_directory_files(&scratch_dir, supported) {
                Ok((mut files, rejected)) => {
                    sort_natural(&mut files);
                    PreparedFiles {
                        files,
                        rejected,
                        workspace_cleanup: vec![scratch_dir],
                        error: None,
                    }
                }
                Err(e) => PreparedFiles {
                    error: Some(format!("scanning extracted archive failed: {e}")),
                    workspace_cleanup: vec![scratch_dir],
                    ..Default::default()
                },
            },
            Err(e) => PreparedFiles {
                error: Some(format!("archive extraction failed: {e}")),
                ..Default::default()
            },
        };
    }

    PreparedFiles {
        rejected: vec![input_path.to_path_buf()],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_sort_orders_part_2_before_part_10() {
        let mut paths = vec![
            PathBuf::from("/x/Part 10.mp3"),
            PathBuf::from("/x/Part 2.mp3"),
            PathBuf::from("/x/Part 1.mp3"),
        ];
        sort_natural(&mut paths);
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/x/Part 1.mp3"),
                PathBuf::from("/x/Part 2.mp3"),
                PathBuf::from("/x/Part 10.mp3"),
            ]
        );
    }

    #[test]
    fn supported_formats_pick_audiobook_list() {
        let book = vec!["epub".to_string(), "mobi".to_string()];
        let audiobook = vec!["mp3".to_string(), "m4b".to_string()];
        let set = get_supported_formats(&ContentType::Audiobook, &book, &audiobook);
        assert!(set.contains("mp3"));
        assert!(!set.contains("epub"));

        let set = get_supported_formats(&ContentType::Fiction, &book, &audiobook);
        assert!(set.contains("epub"));
        assert!(!set.contains("mp3"));
    }

    #[test]
    fn single_supported_file_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new_in(dir.path()).unwrap();
        let file = dir.path().join("book.epub");
        fs::write(&file, b"c").unwrap();

        let supported: HashSet<String> = ["epub".to_string()].into_iter().collect();
        let prepared = collect_staged_files(&file, &supported, false, &ws, &crate::status::NullSink);
        assert_eq!(prepared.files, vec![file]);
        assert!(prepared.error.is_none());
    }

    #[test]
    fn directory_with_supported_files_ignores_sibling_archives() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new_in(dir.path()).unwrap();
        let input = dir.path().join("input");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("book.epub"), b"c").unwrap();
        fs::write(input.join("noise.zip"), b"z").unwrap();

        let supported: HashSet<String> = ["epub".to_string()].into_iter().collect();
        let prepared = collect_staged_files(&input, &supported, true, &ws, &crate::status::NullSink);
        assert_eq!(prepared.files, vec![input.join("book.epub")]);
        assert!(prepared.workspace_cleanup.is_empty());
    }
}
